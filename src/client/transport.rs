//! How the polling client reaches the server.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::ClientError;
use crate::pipeline::ResultMessage;

#[async_trait]
pub trait CheckTransport: Send + Sync {
    /// One check-emails call. `polling` marks a timer-driven request.
    async fn check(
        &self,
        email: &str,
        password: &str,
        polling: bool,
    ) -> Result<Vec<ResultMessage>, ClientError>;
}

#[derive(Debug, Deserialize)]
struct CheckBody {
    #[serde(default)]
    emails: Vec<ResultMessage>,
    #[serde(default)]
    cached: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// `CheckTransport` over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CheckTransport for HttpTransport {
    async fn check(
        &self,
        email: &str,
        password: &str,
        polling: bool,
    ) -> Result<Vec<ResultMessage>, ClientError> {
        let mut url = format!("{}/api/check-emails", self.base_url);
        if polling {
            url.push_str("?polling=true");
        }

        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| "failed to fetch emails".to_string());
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: CheckBody = resp
            .json()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        debug!(count = body.emails.len(), cached = body.cached, "Check response");
        Ok(body.emails)
    }
}
