//! Header Builder (§4.4): assembles outbound SIP payloads from cached
//! header lines plus freshly generated Via/CSeq/Contact.
//!
//! Mirrors the original C server's `snprintf`-template approach byte for
//! byte: same header order, same trailing `Content-Length` + body. Grounded
//! on `examples/original_source/sip_server.c`'s response/forward builders.

use crate::call::LegHeaders;
use std::time::{SystemTime, UNIX_EPOCH};

pub const USER_AGENT: &str = "User-Agent: TinySIP";

/// Build a response toward one leg from its cached Via/From/To and the
/// shared Call-ID, with optional extra header lines and an optional body.
pub fn response(
    code: u16,
    reason: &str,
    leg: &LegHeaders,
    call_id: &str,
    extra_headers: &[String],
    body: Option<&str>,
) -> String {
    let mut out = format!("SIP/2.0 {} {}\r\n", code, reason);
    push_line(&mut out, &leg.via);
    push_line(&mut out, &leg.from);
    push_line(&mut out, &leg.to);
    out.push_str(&format!("Call-ID: {}\r\n", call_id));
    push_line(&mut out, &leg.cseq);
    for extra in extra_headers {
        push_line(&mut out, extra);
    }
    finish_with_body(out, body)
}

/// Build a request forwarded onto a leg, reusing the caller-supplied
/// From/To/Via (either copied from the other leg or freshly rewritten).
#[allow(clippy::too_many_arguments)]
pub fn forwarded_request(
    method: &str,
    request_uri: &str,
    via: &str,
    from: &str,
    to: &str,
    call_id: &str,
    cseq_new: u32,
    max_forwards: u32,
    contact: &str,
    body: Option<&str>,
) -> String {
    request_message(method, request_uri, via, from, to, call_id, cseq_new, method, max_forwards, contact, body)
}

/// Build a request the B2BUA originates itself (BYE/CANCEL/ACK toward a
/// leg). Distinguished from `forwarded_request` only for call-site clarity
/// — both assemble the same wire shape.
#[allow(clippy::too_many_arguments)]
pub fn generated_request(
    method: &str,
    request_uri: &str,
    via: &str,
    from: &str,
    to: &str,
    call_id: &str,
    cseq_number: u32,
    cseq_method: &str,
    max_forwards: u32,
    contact: &str,
    body: Option<&str>,
) -> String {
    request_message(
        method,
        request_uri,
        via,
        from,
        to,
        call_id,
        cseq_number,
        cseq_method,
        max_forwards,
        contact,
        body,
    )
}

#[allow(clippy::too_many_arguments)]
fn request_message(
    method: &str,
    request_uri: &str,
    via: &str,
    from: &str,
    to: &str,
    call_id: &str,
    cseq_number: u32,
    cseq_method: &str,
    max_forwards: u32,
    contact: &str,
    body: Option<&str>,
) -> String {
    let mut out = format!("{} {} SIP/2.0\r\n", method, request_uri);
    push_line(&mut out, via);
    push_line(&mut out, from);
    push_line(&mut out, to);
    out.push_str(&format!("Call-ID: {}\r\n", call_id));
    out.push_str(&format!("CSeq: {} {}\r\n", cseq_number, cseq_method));
    out.push_str(&format!("Max-Forwards: {}\r\n", max_forwards));
    out.push_str(&format!("Contact: {}\r\n", contact));
    out.push_str(&format!("{}\r\n", USER_AGENT));
    finish_with_body(out, body)
}

fn push_line(out: &mut String, line: &str) {
    if !line.is_empty() {
        out.push_str(line);
        out.push_str("\r\n");
    }
}

fn finish_with_body(mut out: String, body: Option<&str>) -> String {
    let body = body.unwrap_or("");
    out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    out.push_str(body);
    out
}

/// Rewrite an inbound Via for NAT traversal, per `spec.md` §4.4: append
/// `;rport=<port>;received=<ip>` if the Via already carries a bare `;rport`,
/// else just append `;received=<ip>`.
pub fn rewrite_via(via_line: &str, received_ip: &str, received_port: u16) -> String {
    if via_line.contains(";rport") {
        format!("{};rport={};received={}", via_line, received_port, received_ip)
    } else {
        format!("{};received={}", via_line, received_ip)
    }
}

/// Generate a fresh topmost Via for a self-originated request on a leg.
pub fn new_via(server_ip: &str, server_port: u16) -> String {
    format!("Via: SIP/2.0/UDP {}:{};branch=z9hG4bK{}", server_ip, server_port, new_branch())
}

/// A unique `z9hG4bK`-prefixed branch token derived from wall-clock time,
/// matching the original's `time(NULL)` formatted as lowercase hex.
pub fn new_branch() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{:x}", secs)
}

/// The B2BUA's own Contact URI, used on every forwarded/generated message.
pub fn b2bua_contact(server_ip: &str, server_port: u16) -> String {
    format!("<sip:TinySIP@{}:{}>", server_ip, server_port)
}

/// Strip angle brackets from a Contact header's URI, keeping just the URI.
pub fn strip_angle_brackets(contact_line: &str) -> String {
    let value = contact_line.splitn(2, ':').nth(1).unwrap_or(contact_line).trim();
    value.trim_start_matches('<').trim_end_matches('>').to_string()
}
