//! Types flowing through the retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A parsed recipient header (`To` or `Cc`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientField {
    /// Bare addresses, when the parser produced a structured list.
    pub addresses: Vec<String>,
    /// Rendered text form (`Name <addr>, other@host`).
    pub text: String,
}

/// One mailbox message after parsing. Scoped to a single retrieval call.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    pub seq: u32,
    /// Rendered sender; `None` when the header was missing.
    pub from: Option<String>,
    /// Raw, unfolded `To` header values.
    pub to: Vec<String>,
    /// Raw, unfolded `Cc` header values.
    pub cc: Vec<String>,
    pub parsed_to: Option<RecipientField>,
    pub parsed_cc: Option<RecipientField>,
    pub subject: String,
    pub date: DateTime<Utc>,
    /// Parser's plain-text body.
    pub text: Option<String>,
    /// Parser's HTML body.
    pub html: Option<String>,
    pub raw_body: String,
}

/// A matched message as returned to clients and cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub from: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub text: String,
    pub html: Option<String>,
}

/// Unfiltered per-message summary used by mailbox diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct MessageSummary {
    pub seq: u32,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub date: DateTime<Utc>,
}

impl From<&NormalizedMessage> for MessageSummary {
    fn from(msg: &NormalizedMessage) -> Self {
        Self {
            seq: msg.seq,
            from: msg.from.clone(),
            to: msg.to.clone(),
            cc: msg.cc.clone(),
            subject: msg.subject.clone(),
            date: msg.date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_message_json_shape() {
        let msg = ResultMessage {
            from: "Alice <alice@example.com>".into(),
            subject: "Hi".into(),
            date: "2026-02-15T10:00:00Z".parse().unwrap(),
            text: "hello".into(),
            html: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["from"], "Alice <alice@example.com>");
        assert_eq!(json["date"], "2026-02-15T10:00:00Z");
        assert!(json["html"].is_null());
    }
}
