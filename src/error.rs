//! Error types for alias-inbox.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Allowlist store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mailbox transport errors. Any of these aborts a retrieval call.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Login rejected for {user}")]
    LoginRejected { user: String },

    #[error("IMAP command {command} failed: {response}")]
    Command { command: String, response: String },

    #[error("Malformed IMAP response: {0}")]
    Protocol(String),

    #[error("Mailbox session already closed")]
    Closed,

    #[error("Mailbox task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-message decode failures. Never fatal to a retrieval call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("message {seq} has no header block")]
    MissingHeader { seq: u32 },

    #[error("message {seq} could not be parsed")]
    Unparseable { seq: u32 },
}

/// Why the access gate refused an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("this email is not authorized")]
    Unauthorized,

    #[error("wrong access password")]
    Forbidden,

    #[error("this email has been disabled")]
    Disabled,
}

/// Failure of a check-emails request.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Upstream mailbox failure: {0}")]
    Upstream(#[from] MailboxError),
}

/// Message shown to clients when the mailbox cannot be read.
pub const UPSTREAM_FAILURE_MESSAGE: &str = "failed to fetch emails, please try again later";

impl CheckError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::FORBIDDEN,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The text put in the `error` field of the response body.
    pub fn public_message(&self) -> String {
        match self {
            Self::Upstream(_) => UPSTREAM_FAILURE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for CheckError {
    fn into_response(self) -> Response {
        if let Self::Upstream(e) = &self {
            tracing::error!(error = %e, "Failed to fetch emails");
        }
        (
            self.status(),
            Json(serde_json::json!({ "error": self.public_message() })),
        )
            .into_response()
    }
}

/// Failure of an administrative request.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("invalid admin key")]
    InvalidKey,

    #[error("{0}")]
    Invalid(String),

    #[error("prefix or email not found: {0}")]
    NotFound(String),

    #[error("failed to save the allowlist")]
    Store(#[source] StoreError),

    #[error("{0}")]
    Upstream(#[from] MailboxError),
}

impl From<StoreError> for AdminError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => Self::NotFound(key),
            other => Self::Store(other),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidKey => StatusCode::FORBIDDEN,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(e) => {
                tracing::error!(error = %e, "Allowlist store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Upstream(e) => {
                tracing::error!(error = %e, "Failed to read mailbox");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            Self::Upstream(_) => "failed to fetch all emails, please try again later".to_string(),
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Polling client errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),

    /// Non-2xx response; carries the server's `error` text verbatim.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("connection error, please try again later")]
    Connection(String),
}
