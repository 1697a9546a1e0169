//! Matched message → displayable `ResultMessage`.

use super::sanitize::{recover_base64, strip_html, strip_transport_artifacts};
use super::types::{NormalizedMessage, ResultMessage};

pub const NO_CONTENT: &str = "(no content)";
pub const NO_SUBJECT: &str = "(no subject)";
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Build the client-facing view of a matched message.
pub fn extract(msg: &NormalizedMessage) -> ResultMessage {
    let html = msg.html.clone().filter(|h| !h.trim().is_empty());

    let mut text = match msg.text.as_deref().filter(|t| !t.is_empty()) {
        Some(t) => t.to_string(),
        None => html.as_deref().map(strip_html).unwrap_or_default(),
    };

    if let Some(recovered) = recover_base64(&text) {
        text = recovered;
    }
    let text = strip_transport_artifacts(&text);

    ResultMessage {
        from: msg
            .from
            .clone()
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
        subject: if msg.subject.is_empty() {
            NO_SUBJECT.to_string()
        } else {
            msg.subject.clone()
        },
        date: msg.date,
        text: if text.is_empty() {
            NO_CONTENT.to_string()
        } else {
            text
        },
        html,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn message(text: Option<&str>, html: Option<&str>) -> NormalizedMessage {
        NormalizedMessage {
            seq: 1,
            from: Some("alice@example.com".into()),
            to: vec!["bob@example.com".into()],
            cc: Vec::new(),
            parsed_to: None,
            parsed_cc: None,
            subject: "Hello".into(),
            date: Utc::now(),
            text: text.map(String::from),
            html: html.map(String::from),
            raw_body: String::new(),
        }
    }

    #[test]
    fn plain_text_passes_through() {
        let out = extract(&message(Some("Hi Bob\n"), None));
        assert_eq!(out.text, "Hi Bob");
        assert_eq!(out.subject, "Hello");
        assert_eq!(out.from, "alice@example.com");
        assert!(out.html.is_none());
    }

    #[test]
    fn html_kept_and_text_derived() {
        let out = extract(&message(None, Some("<p>Hi  <b>Bob</b></p>")));
        assert_eq!(out.html.as_deref(), Some("<p>Hi  <b>Bob</b></p>"));
        assert_eq!(out.text, "Hi Bob");
    }

    #[test]
    fn parser_text_preferred_over_html() {
        let out = extract(&message(Some("plain"), Some("<p>rich</p>")));
        assert_eq!(out.text, "plain");
        assert!(out.html.is_some());
    }

    #[test]
    fn base64_block_replaces_text() {
        let body = "--0123456789abcdef0123\nContent-Type: text/plain; charset=UTF-8\nContent-Transfer-Encoding: base64\n\naGVsbG8gYm9i\n--0123456789abcdef0123--";
        let out = extract(&message(Some(body), None));
        assert_eq!(out.text, "hello bob");
    }

    #[test]
    fn residual_mime_is_stripped() {
        let body = "--0123456789abcdef0123\nContent-Type: text/plain\n\nHello\n\n\n\nWorld\n--0123456789abcdef0123--";
        let out = extract(&message(Some(body), None));
        assert_eq!(out.text, "Hello\n\nWorld");
    }

    #[test]
    fn fallbacks_for_empty_fields() {
        let mut msg = message(Some(""), None);
        msg.subject.clear();
        msg.from = None;
        let out = extract(&msg);
        assert_eq!(out.text, NO_CONTENT);
        assert_eq!(out.subject, NO_SUBJECT);
        assert_eq!(out.from, UNKNOWN_SENDER);
    }
}
