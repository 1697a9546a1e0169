//! Raw header/body blocks → `NormalizedMessage`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mail_parser::{Address, MessageParser, PartType};

use super::types::{NormalizedMessage, RecipientField};
use crate::error::ParseError;
use crate::mailbox::RawMessage;

/// Parse one fetched message.
pub fn normalize(raw: &RawMessage) -> Result<NormalizedMessage, ParseError> {
    if raw.header.trim().is_empty() {
        return Err(ParseError::MissingHeader { seq: raw.seq });
    }

    let headers = header_values(&raw.header);

    let mut source = raw.header.clone();
    if !source.ends_with('\n') {
        source.push_str("\r\n\r\n");
    } else if !(source.ends_with("\r\n\r\n") || source.ends_with("\n\n")) {
        source.push_str("\r\n");
    }
    source.push_str(&raw.body);

    let parsed = MessageParser::default()
        .parse(source.as_bytes())
        .ok_or(ParseError::Unparseable { seq: raw.seq })?;

    let date = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    let text = parsed
        .text_body
        .first()
        .and_then(|id| parsed.part(*id))
        .and_then(|part| match &part.body {
            PartType::Text(t) => Some(t.to_string()),
            _ => None,
        });
    let html = parsed
        .html_body
        .first()
        .and_then(|id| parsed.part(*id))
        .and_then(|part| match &part.body {
            PartType::Html(h) => Some(h.to_string()),
            _ => None,
        });

    Ok(NormalizedMessage {
        seq: raw.seq,
        from: parsed.from().map(render_address).filter(|s| !s.is_empty()),
        to: headers.get("to").cloned().unwrap_or_default(),
        cc: headers.get("cc").cloned().unwrap_or_default(),
        parsed_to: parsed.to().map(recipient_field),
        parsed_cc: parsed.cc().map(recipient_field),
        subject: parsed.subject().unwrap_or_default().trim().to_string(),
        date,
        text,
        html,
        raw_body: raw.body.clone(),
    })
}

/// Split a header block into lowercased field names and unfolded values.
///
/// Stops at the first blank line. Repeated fields keep every value.
pub fn header_values(block: &str) -> HashMap<String, Vec<String>> {
    let mut fields: HashMap<String, Vec<String>> = HashMap::new();
    let mut current: Option<(String, String)> = None;

    for line in block.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }

        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim_start());
            }
            continue;
        }

        if let Some((name, value)) = current.take() {
            fields.entry(name).or_default().push(value);
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }

    if let Some((name, value)) = current {
        fields.entry(name).or_default().push(value);
    }
    fields
}

fn recipient_field(addr: &Address) -> RecipientField {
    let addresses = match addr {
        Address::List(list) => list
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    };
    RecipientField {
        addresses,
        text: render_address(addr),
    }
}

/// Render an address header the way a mail client displays it.
pub fn render_address(addr: &Address) -> String {
    fn one(name: Option<&str>, address: Option<&str>) -> String {
        match (name, address) {
            (Some(n), Some(a)) if !n.is_empty() => format!("{n} <{a}>"),
            (_, Some(a)) => a.to_string(),
            (Some(n), None) => n.to_string(),
            (None, None) => String::new(),
        }
    }

    match addr {
        Address::List(list) => list
            .iter()
            .map(|a| one(a.name.as_deref(), a.address.as_deref()))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Address::Group(groups) => groups
            .iter()
            .map(|g| {
                let members = g
                    .addresses
                    .iter()
                    .map(|a| one(a.name.as_deref(), a.address.as_deref()))
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                match g.name.as_deref() {
                    Some(name) => format!("{name}: {members};"),
                    None => members,
                }
            })
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(header: &str, body: &str) -> RawMessage {
        RawMessage {
            seq: 1,
            header: header.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn header_values_unfold_and_repeat() {
        let block = "To: a@example.com,\r\n b@example.com\r\nCc: c@example.com\r\nTo: d@example.com\r\n\r\nignored: yes\r\n";
        let fields = header_values(block);
        assert_eq!(
            fields["to"],
            vec!["a@example.com, b@example.com", "d@example.com"]
        );
        assert_eq!(fields["cc"], vec!["c@example.com"]);
        assert!(!fields.contains_key("ignored"));
    }

    #[test]
    fn normalize_plain_message() {
        let msg = normalize(&raw(
            "From: Alice <alice@example.com>\r\nTo: \"Bob\" <bob@example.com>\r\nSubject: Hello\r\nDate: Sun, 15 Feb 2026 10:00:00 +0000\r\n\r\n",
            "Hi Bob\r\n",
        ))
        .unwrap();

        assert_eq!(msg.from.as_deref(), Some("Alice <alice@example.com>"));
        assert_eq!(msg.to, vec!["\"Bob\" <bob@example.com>"]);
        assert!(msg.cc.is_empty());
        let to = msg.parsed_to.unwrap();
        assert_eq!(to.addresses, vec!["bob@example.com"]);
        assert_eq!(msg.subject, "Hello");
        assert_eq!(msg.date.to_rfc3339(), "2026-02-15T10:00:00+00:00");
        assert_eq!(msg.text.as_deref().map(str::trim), Some("Hi Bob"));
        assert!(msg.html.is_none());
        assert_eq!(msg.raw_body, "Hi Bob\r\n");
    }

    #[test]
    fn normalize_html_message() {
        let msg = normalize(&raw(
            "From: a@example.com\r\nTo: b@example.com\r\nContent-Type: text/html; charset=utf-8\r\n\r\n",
            "<p>Hello <b>there</b></p>",
        ))
        .unwrap();
        assert!(msg.text.is_none());
        assert!(msg.html.unwrap().contains("<b>there</b>"));
    }

    #[test]
    fn missing_header_is_reported() {
        let err = normalize(&raw("", "body")).unwrap_err();
        assert!(matches!(err, ParseError::MissingHeader { seq: 1 }));
    }

    #[test]
    fn header_without_trailing_newline_keeps_body_separate() {
        let msg = normalize(&raw(
            "From: a@example.org\r\nTo: bob@example.com\r\nSubject: Hi",
            "Body-Line: hello\r\n",
        ))
        .unwrap();
        assert_eq!(msg.subject, "Hi");
        assert_eq!(msg.to, vec!["bob@example.com"]);
        assert!(msg.text.unwrap().contains("Body-Line: hello"));
    }

    #[test]
    fn missing_date_falls_back_to_now() {
        let before = Utc::now();
        let msg = normalize(&raw("To: b@example.com\r\n", "x")).unwrap();
        assert!(msg.date >= before);
        assert!(msg.subject.is_empty());
        assert!(msg.from.is_none());
    }
}
