//! Text clean-up stages applied to extracted message bodies.
//!
//! Bodies that reach us with their MIME structure intact (multipart text that
//! the parser saw as plain text) still carry transfer-encoding headers,
//! boundary lines and base64 payloads. These stages recover the readable part.

use std::sync::LazyLock;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use regex::Regex;
use tracing::debug;

static BASE64_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Content-Transfer-Encoding:\s*base64").unwrap());
static BOUNDARY_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^--[a-f0-9]{16,}").unwrap());
static CONTENT_HEADER_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Content-[^\r\n]+[\r\n]*").unwrap());
static BOUNDARY_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^--[a-f0-9]{16,}[^\r\n]*[\r\n]*").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\r?\n){2,}").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[A-Za-z!][^<>]*>").unwrap());

/// Accepts missing padding and trailing bits, like most mail clients do.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Strip HTML tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    // Only complete tags go; a stray `<` in text is kept.
    HTML_TAG
        .replace_all(html, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Base64 blocks announced by a transfer-encoding marker.
///
/// A block is the run of base64-alphabet lines after the marker, ended by a
/// MIME boundary line or the end of input.
pub fn base64_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut in_block = false;
    let mut current = String::new();

    for line in text.lines() {
        if BASE64_MARKER.is_match(line) {
            in_block = true;
            current.clear();
            continue;
        }

        if BOUNDARY_LINE.is_match(line) {
            if in_block && !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            in_block = false;
            continue;
        }

        if in_block && is_base64_line(line) {
            current.push_str(line.trim());
        }
    }

    if in_block && !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn is_base64_line(line: &str) -> bool {
    !line.trim().is_empty()
        && line
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
}

/// If `text` carries a base64 block that decodes to non-blank UTF-8, return
/// the first such decoding, trimmed.
pub fn recover_base64(text: &str) -> Option<String> {
    for block in base64_blocks(text) {
        let bytes = match LENIENT.decode(block.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "Base64 block failed to decode");
                continue;
            }
        };
        match String::from_utf8(bytes) {
            Ok(decoded) if !decoded.trim().is_empty() => return Some(decoded.trim().to_string()),
            Ok(_) => {}
            Err(_) => debug!("Base64 block is not UTF-8 text"),
        }
    }
    None
}

/// Remove residual `Content-*` lines and boundary lines, then collapse runs
/// of blank lines to a single blank line.
pub fn strip_transport_artifacts(text: &str) -> String {
    let text = CONTENT_HEADER_LINES.replace_all(text, "");
    let text = BOUNDARY_LINES.replace_all(&text, "");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}
