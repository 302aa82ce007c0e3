//! SIP message parsing (§4.1)
//!
//! Deliberately tolerant and shallow: this is not a general SIP parser, it
//! extracts exactly the header lines the call-control core consumes, as raw
//! text (field name included), and fails only when the start line itself
//! does not conform. Grounded on the teacher's line-scanning approach in
//! `header_utils::extract_header_value`, trimmed to the long-form header
//! names this system actually matches (`spec.md` §6 only ever matches
//! `"Name: "`, never RFC 3261 compact forms).

use crate::error::{SipError, SipResult};
use crate::types::{MessageKind, Method};
use std::str::FromStr;

const CONTENT_TYPE_SDP: &str = "Content-Type: application/sdp";

/// A parsed view over one raw UDP payload.
///
/// Header fields hold the raw line text, including the field name,
/// excluding the trailing CRLF — exactly as `spec.md` §4.1 specifies, so
/// that the Header Builder can splice them back into outbound messages
/// verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub kind: MessageKind,
    /// Reason phrase from a status line; empty for requests.
    pub reason_phrase: String,
    pub via: String,
    pub from: String,
    pub to: String,
    pub call_id: String,
    pub cseq: String,
    pub contact: String,
    pub max_forwards: String,
    pub content_type: String,
    pub has_sdp: bool,
    pub cseq_number: u32,
    pub cseq_method: String,
    pub body: Option<String>,
}

impl ParsedMessage {
    /// The Call-ID value (without the `Call-ID: ` prefix).
    pub fn call_id_value(&self) -> &str {
        strip_header_prefix(&self.call_id, "Call-ID:")
    }

    /// The Max-Forwards value, or the RFC default of 70 when absent.
    pub fn max_forwards_value(&self) -> u32 {
        let raw = strip_header_prefix(&self.max_forwards, "Max-Forwards:");
        raw.trim().parse::<u32>().unwrap_or(70)
    }
}

/// Parse a raw UDP payload into headers the core cares about.
///
/// Returns `Err(SipError::MalformedStartLine)` only if the first line is
/// missing its CRLF or does not match a request-line / status-line shape.
/// Missing non-essential headers are tolerated and surface as empty
/// strings; the parser never fails on a malformed or absent body.
pub fn parse(raw: &str) -> SipResult<ParsedMessage> {
    let first_line_end = raw
        .find("\r\n")
        .ok_or_else(|| SipError::malformed_start_line("no CRLF after start line"))?;
    let start_line = &raw[..first_line_end];
    if start_line.is_empty() {
        return Err(SipError::malformed_start_line("empty start line"));
    }

    let kind = parse_start_line(start_line)?;
    let reason_phrase = reason_phrase_of(start_line);

    let via = find_header_line(raw, "Via:");
    let from = find_header_line(raw, "From:");
    let to = find_header_line(raw, "To:");
    let call_id = find_header_line(raw, "Call-ID:");
    let cseq = find_header_line(raw, "CSeq:");
    let contact = find_header_line(raw, "Contact:");
    let max_forwards = find_header_line(raw, "Max-Forwards:");
    let content_type = find_header_line(raw, "Content-Type:");

    let has_sdp = raw.contains(CONTENT_TYPE_SDP);
    let (cseq_number, cseq_method) = parse_cseq(&cseq);
    let body = body_of(raw);

    Ok(ParsedMessage {
        kind,
        reason_phrase,
        via,
        from,
        to,
        call_id,
        cseq,
        contact,
        max_forwards,
        content_type,
        has_sdp,
        cseq_number,
        cseq_method,
        body,
    })
}

fn parse_start_line(line: &str) -> SipResult<MessageKind> {
    if let Some(rest) = line.strip_prefix("SIP/2.0 ") {
        let code_token = rest.split_whitespace().next().unwrap_or("");
        let code: u16 = code_token
            .parse()
            .map_err(|_| SipError::malformed_start_line(format!("bad status code '{}'", code_token)))?;
        return Ok(MessageKind::Response { code });
    }

    let mut parts = line.splitn(3, ' ');
    let method_token = parts.next().unwrap_or("");
    let _uri = parts
        .next()
        .ok_or_else(|| SipError::malformed_start_line("missing request-URI"))?;
    let version = parts
        .next()
        .ok_or_else(|| SipError::malformed_start_line("missing SIP version"))?;
    if version != "SIP/2.0" || method_token.is_empty() {
        return Err(SipError::malformed_start_line(format!(
            "not a request/status line: '{}'",
            line
        )));
    }

    let method = Method::from_str(method_token).unwrap_or(Method::Unknown(method_token.to_string()));
    Ok(MessageKind::Request { method })
}

/// Scan line-by-line for the first line starting with `prefix` (a literal
/// `"Name:"`, trailing colon required, per `spec.md` §6). Returns the full
/// line including the field name, or an empty string if absent.
fn find_header_line(raw: &str, prefix: &str) -> String {
    for line in headers_section(raw).lines() {
        if line.starts_with(prefix) {
            return line.to_string();
        }
    }
    String::new()
}

fn reason_phrase_of(start_line: &str) -> String {
    if let Some(rest) = start_line.strip_prefix("SIP/2.0 ") {
        rest.splitn(2, ' ').nth(1).unwrap_or("").to_string()
    } else {
        String::new()
    }
}

fn headers_section(raw: &str) -> &str {
    match raw.find("\r\n\r\n") {
        Some(end) => &raw[..end],
        None => raw,
    }
}

fn body_of(raw: &str) -> Option<String> {
    raw.find("\r\n\r\n").map(|offset| raw[offset + 4..].to_string())
}

fn strip_header_prefix<'a>(line: &'a str, prefix: &str) -> &'a str {
    line.strip_prefix(prefix).unwrap_or(line).trim()
}

/// Skip leading non-digits, then consume digits — exactly the algorithm
/// `spec.md` §4.1 specifies for `cseq_number`.
fn parse_cseq(cseq_line: &str) -> (u32, String) {
    let digits_start = cseq_line.find(|c: char| c.is_ascii_digit());
    let Some(start) = digits_start else {
        return (0, String::new());
    };
    let digits_end = cseq_line[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|o| start + o)
        .unwrap_or(cseq_line.len());
    let number: u32 = cseq_line[start..digits_end].parse().unwrap_or(0);
    let method = cseq_line[digits_end..].trim().to_string();
    (number, method)
}
