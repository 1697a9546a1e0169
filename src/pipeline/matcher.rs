//! Recipient matching: is this message addressed to the alias?
//!
//! Real-world senders encode recipients in many ways (display names, several
//! recipients per header, group syntax), so matching runs an ordered list of
//! tolerant strategies and stops at the first hit.

use super::types::{NormalizedMessage, RecipientField};

/// One way of deciding whether a message is addressed to an alias.
pub trait RecipientStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// `alias` is already lowercased.
    fn matches(&self, msg: &NormalizedMessage, alias: &str) -> bool;
}

/// Substring match against each raw `To` header value.
pub struct RawToHeader;

impl RecipientStrategy for RawToHeader {
    fn name(&self) -> &'static str {
        "raw-to"
    }

    fn matches(&self, msg: &NormalizedMessage, alias: &str) -> bool {
        msg.to.iter().any(|v| v.to_lowercase().contains(alias))
    }
}

/// Match against the parsed `To` field.
pub struct ParsedTo;

impl RecipientStrategy for ParsedTo {
    fn name(&self) -> &'static str {
        "parsed-to"
    }

    fn matches(&self, msg: &NormalizedMessage, alias: &str) -> bool {
        msg.parsed_to
            .as_ref()
            .is_some_and(|field| field_matches(field, alias))
    }
}

/// Match against the parsed `Cc` field.
pub struct ParsedCc;

impl RecipientStrategy for ParsedCc {
    fn name(&self) -> &'static str {
        "parsed-cc"
    }

    fn matches(&self, msg: &NormalizedMessage, alias: &str) -> bool {
        msg.parsed_cc
            .as_ref()
            .is_some_and(|field| field_matches(field, alias))
    }
}

/// Exact address match when a structured list exists, substring on the
/// rendered text otherwise.
fn field_matches(field: &RecipientField, alias: &str) -> bool {
    if field.addresses.is_empty() {
        field.text.to_lowercase().contains(alias)
    } else {
        field
            .addresses
            .iter()
            .any(|a| a.eq_ignore_ascii_case(alias))
    }
}

/// Ordered, short-circuit list of strategies.
pub struct RecipientMatcher {
    strategies: Vec<Box<dyn RecipientStrategy>>,
}

impl Default for RecipientMatcher {
    fn default() -> Self {
        Self::new(vec![
            Box::new(RawToHeader),
            Box::new(ParsedTo),
            Box::new(ParsedCc),
        ])
    }
}

impl RecipientMatcher {
    pub fn new(strategies: Vec<Box<dyn RecipientStrategy>>) -> Self {
        Self { strategies }
    }

    /// Name of the first strategy that accepts the message, if any.
    pub fn matched_by(&self, msg: &NormalizedMessage, alias: &str) -> Option<&'static str> {
        let alias = alias.to_lowercase();
        self.strategies
            .iter()
            .find(|s| s.matches(msg, &alias))
            .map(|s| s.name())
    }

    pub fn is_match(&self, msg: &NormalizedMessage, alias: &str) -> bool {
        self.matched_by(msg, alias).is_some()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn message() -> NormalizedMessage {
        NormalizedMessage {
            seq: 1,
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            parsed_to: None,
            parsed_cc: None,
            subject: String::new(),
            date: Utc::now(),
            text: None,
            html: None,
            raw_body: String::new(),
        }
    }

    fn field(addresses: &[&str], text: &str) -> Option<RecipientField> {
        Some(RecipientField {
            addresses: addresses.iter().map(|s| s.to_string()).collect(),
            text: text.to_string(),
        })
    }

    #[test]
    fn raw_to_substring_case_insensitive() {
        let mut msg = message();
        msg.to = vec!["\"Bob\" <Bob@Example.com>, carol@example.com".into()];
        assert!(RawToHeader.matches(&msg, "bob@example.com"));
        assert!(!RawToHeader.matches(&msg, "dave@example.com"));
    }

    #[test]
    fn parsed_to_prefers_exact_addresses() {
        let mut msg = message();
        msg.parsed_to = field(&["xbob@example.com"], "xbob@example.com");
        // Structured list present: substring of another address is not enough.
        assert!(!ParsedTo.matches(&msg, "bob@example.com"));

        msg.parsed_to = field(&["BOB@example.com"], "");
        assert!(ParsedTo.matches(&msg, "bob@example.com"));
    }

    #[test]
    fn parsed_to_falls_back_to_text() {
        let mut msg = message();
        msg.parsed_to = field(&[], "Undisclosed: bob@example.com;");
        assert!(ParsedTo.matches(&msg, "bob@example.com"));
    }

    #[test]
    fn parsed_cc_matches() {
        let mut msg = message();
        msg.parsed_cc = field(&["bob@example.com"], "bob@example.com");
        assert!(ParsedCc.matches(&msg, "bob@example.com"));
        assert!(!ParsedTo.matches(&msg, "bob@example.com"));
    }

    #[test]
    fn matcher_reports_first_strategy() {
        let matcher = RecipientMatcher::default();
        let mut msg = message();
        msg.to = vec!["bob@example.com".into()];
        msg.parsed_cc = field(&["bob@example.com"], "bob@example.com");
        assert_eq!(matcher.matched_by(&msg, "BOB@example.com"), Some("raw-to"));

        msg.to.clear();
        assert_eq!(matcher.matched_by(&msg, "bob@example.com"), Some("parsed-cc"));
    }

    #[test]
    fn no_match_is_excluded() {
        let matcher = RecipientMatcher::default();
        let mut msg = message();
        msg.to = vec!["alice@example.com".into()];
        msg.parsed_to = field(&["alice@example.com"], "alice@example.com");
        assert!(!matcher.is_match(&msg, "bob@example.com"));
    }
}
