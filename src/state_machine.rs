//! Call State Machine (§4.6): the per-call finite-state automaton that
//! bridges an A-leg dialog to a B-leg dialog.
//!
//! `Core::handle_datagram` is the single entry point a worker thread calls
//! for every inbound datagram. It never touches a socket itself — it
//! returns the `Outbound` messages the caller (the transport layer) must
//! send, which is what makes the transition table here testable without a
//! real UDP socket. Grounded on `examples/original_source/sip_server.c`'s
//! `handle_state_machine`/`process_sip_messages`.

use crate::call::{derive_b_leg_uuid, Call, CallHandle, CallTable, LegHeaders};
use crate::config::TinySipConfig;
use crate::error::SipResult;
use crate::headers;
use crate::location::LocationDirectory;
use crate::parser::{self, ParsedMessage};
use crate::types::{CallState, LegSide, MessageKind, Method};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU32, Ordering};

/// A message the caller must send out over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub ip: String,
    pub port: u16,
    pub payload: String,
}

impl Outbound {
    fn new(ip: impl Into<String>, port: u16, payload: String) -> Self {
        Outbound { ip: ip.into(), port, payload }
    }
}

/// The call-control core: location directory, call table, and the
/// process-wide CSeq counter, bound to one B2BUA identity.
pub struct Core {
    pub calls: CallTable,
    pub directory: LocationDirectory,
    global_cseq: AtomicU32,
    config: TinySipConfig,
}

impl Core {
    pub fn new(config: TinySipConfig) -> Self {
        Core {
            calls: CallTable::new(),
            directory: LocationDirectory::seeded(),
            global_cseq: AtomicU32::new(0),
            config,
        }
    }

    fn next_cseq(&self) -> u32 {
        self.global_cseq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn contact(&self) -> String {
        headers::b2bua_contact(&self.config.server_ip, self.config.server_port)
    }

    /// Parse `raw` and process it to completion, returning every message
    /// that must be sent out. A parser error drops the datagram silently,
    /// per `spec.md` §7.
    pub fn handle_datagram(&self, raw: &str, source_ip: &str, source_port: u16) -> SipResult<Vec<Outbound>> {
        let msg = parser::parse(raw)?;

        if let MessageKind::Request { method: Method::REGISTER } = &msg.kind {
            let payload = crate::register::handle_register(&msg, source_ip, source_port, &self.directory);
            return Ok(vec![Outbound::new(source_ip, source_port, payload)]);
        }

        Ok(self.dispatch(&msg, source_ip, source_port))
    }

    fn dispatch(&self, msg: &ParsedMessage, source_ip: &str, source_port: u16) -> Vec<Outbound> {
        let dialog_id = msg.call_id_value().to_string();

        match self.calls.find_by_dialog_id(&dialog_id) {
            None => {
                if let MessageKind::Request { method: Method::INVITE } = &msg.kind {
                    self.handle_new_invite(msg, source_ip, source_port)
                } else {
                    debug!("no call for dialog '{}', dropping datagram", dialog_id);
                    Vec::new()
                }
            }
            Some((handle, leg)) => self.handle_existing(handle, leg, msg, source_ip, source_port),
        }
    }

    /// Action A1: allocate a call, resolve the callee, and kick off the
    /// B-leg INVITE.
    fn handle_new_invite(&self, msg: &ParsedMessage, source_ip: &str, source_port: u16) -> Vec<Outbound> {
        let ad_hoc_leg = LegHeaders {
            via: msg.via.clone(),
            from: msg.from.clone(),
            to: msg.to.clone(),
            cseq: msg.cseq.clone(),
        };
        let call_id = msg.call_id_value().to_string();

        let handle = match self.calls.allocate() {
            Ok(h) => h,
            Err(_) => {
                warn!("call table full, rejecting INVITE for '{}'", call_id);
                return vec![response_to(source_ip, source_port, 500, "Server Internal Error", &ad_hoc_leg, &call_id, None)];
            }
        };

        let caller = extract_user(&msg.from);
        let callee = extract_user(&msg.to);

        let Some(callee_id) = callee.clone() else {
            self.calls.release(handle);
            return vec![response_to(source_ip, source_port, 404, "Not Found", &ad_hoc_leg, &call_id, None)];
        };

        let Some(entry) = self.directory.find_by_user_id(&callee_id) else {
            self.calls.release(handle);
            return vec![response_to(source_ip, source_port, 404, "Not Found", &ad_hoc_leg, &call_id, None)];
        };

        let a_leg_uuid = call_id.clone();
        let b_leg_uuid = derive_b_leg_uuid(&a_leg_uuid);
        let rewritten_via = headers::rewrite_via(&msg.via, source_ip, source_port);
        let a_leg_headers = LegHeaders {
            via: rewritten_via,
            from: msg.from.clone(),
            to: msg.to.clone(),
            cseq: msg.cseq.clone(),
        };
        let a_leg_contact = headers::strip_angle_brackets(&msg.contact);

        let b_cseq_number = self.next_cseq();
        let b_via = self.fresh_via();
        let b_from = msg.from.clone();
        let b_to = format!("To: <sip:{}@{}:{};ob>", callee_id, entry.ip, entry.port);
        let b_leg_headers = LegHeaders {
            via: b_via.clone(),
            from: b_from.clone(),
            to: b_to.clone(),
            cseq: format!("CSeq: {} INVITE", b_cseq_number),
        };

        let max_forwards = decremented_max_forwards(msg.max_forwards_value());
        let request_uri = format!("sip:{}@{}:{}", callee_id, entry.ip, entry.port);
        let invite_to_b = headers::forwarded_request(
            "INVITE",
            &request_uri,
            &b_via,
            &b_from,
            &b_to,
            &b_leg_uuid,
            b_cseq_number,
            max_forwards,
            &self.contact(),
            msg.body.as_deref(),
        );
        let trying_to_a = headers::response(100, "Trying", &a_leg_headers, &a_leg_uuid, &[], None);

        self.calls.with_call(handle, |c| {
            c.a_leg_uuid = a_leg_uuid.clone();
            c.b_leg_uuid = b_leg_uuid.clone();
            c.a_leg_ip = source_ip.to_string();
            c.a_leg_port = source_port;
            c.b_leg_ip = entry.ip.clone();
            c.b_leg_port = entry.port;
            c.a_leg_headers = a_leg_headers.clone();
            c.b_leg_headers = b_leg_headers.clone();
            c.a_leg_contact = a_leg_contact.clone();
            c.caller = caller.clone().unwrap_or_default();
            c.callee = callee_id.clone();
            c.state = CallState::Routing;
        });

        info!("new call {} -> {} routed to {}:{}", a_leg_uuid, callee_id, entry.ip, entry.port);

        vec![
            Outbound::new(source_ip, source_port, trying_to_a),
            Outbound::new(entry.ip.clone(), entry.port, invite_to_b),
        ]
    }

    fn handle_existing(
        &self,
        handle: CallHandle,
        leg: LegSide,
        msg: &ParsedMessage,
        source_ip: &str,
        source_port: u16,
    ) -> Vec<Outbound> {
        let Some(call) = self.calls.with_call(handle, |c| c.clone()) else {
            return Vec::new();
        };

        match (&msg.kind, call.state, leg) {
            (MessageKind::Response { code: 180 }, CallState::Routing, LegSide::BLeg) => {
                self.calls.with_call(handle, |c| {
                    c.state = CallState::Ringing;
                    apply_media_flags(c, msg.has_sdp, LegSide::BLeg);
                });
                vec![ringing_to_a(&call, msg, 180, "Ringing")]
            }
            (MessageKind::Response { code: 183 }, CallState::Routing | CallState::Ringing, LegSide::BLeg) => {
                self.calls.with_call(handle, |c| apply_media_flags(c, msg.has_sdp, LegSide::BLeg));
                vec![ringing_to_a(&call, msg, 183, "Session Progress")]
            }
            (MessageKind::Response { code }, CallState::Routing | CallState::Ringing, LegSide::BLeg)
                if (200..300).contains(code) && msg.cseq_method == "INVITE" =>
            {
                let b_contact = headers::strip_angle_brackets(&msg.contact);
                self.calls.with_call(handle, |c| {
                    c.b_leg_contact = b_contact.clone();
                    c.state = CallState::Answered;
                    apply_media_flags(c, msg.has_sdp, LegSide::BLeg);
                });
                vec![response_to(
                    &call.a_leg_ip,
                    call.a_leg_port,
                    *code,
                    reason(msg, "OK"),
                    &call.a_leg_headers,
                    &call.a_leg_uuid,
                    msg.body.as_deref(),
                )]
            }
            (MessageKind::Response { code }, CallState::Routing | CallState::Ringing, LegSide::BLeg)
                if *code >= 400 && msg.cseq_method == "INVITE" =>
            {
                let ack = self.ack_to_b(&call, msg.cseq_number);
                let forward = response_to(
                    &call.a_leg_ip,
                    call.a_leg_port,
                    *code,
                    reason(msg, "Failure"),
                    &call.a_leg_headers,
                    &call.a_leg_uuid,
                    None,
                );
                self.calls.release(handle);
                info!("call {} released after {} from B", call.a_leg_uuid, code);
                vec![Outbound::new(&call.b_leg_ip, call.b_leg_port, ack), forward]
            }
            (MessageKind::Response { code }, CallState::Routing | CallState::Ringing, LegSide::BLeg)
                if (100..200).contains(code) =>
            {
                Vec::new()
            }
            (MessageKind::Request { method: Method::CANCEL }, CallState::Routing | CallState::Ringing, LegSide::ALeg) => {
                let ad_hoc_leg = LegHeaders {
                    via: msg.via.clone(),
                    from: msg.from.clone(),
                    to: msg.to.clone(),
                    cseq: msg.cseq.clone(),
                };
                let ok_of_cancel = headers::response(200, "OK", &ad_hoc_leg, &call.a_leg_uuid, &[], None);
                let terminated = headers::response(487, "Request Terminated", &call.a_leg_headers, &call.a_leg_uuid, &[], None);
                let cancel_to_b = self.cancel_to_b(&call);
                self.calls.with_call(handle, |c| c.state = CallState::Disconnecting);
                vec![
                    Outbound::new(source_ip, source_port, ok_of_cancel),
                    Outbound::new(source_ip, source_port, terminated),
                    Outbound::new(&call.b_leg_ip, call.b_leg_port, cancel_to_b),
                ]
            }
            (MessageKind::Request { method: Method::ACK }, CallState::Answered, LegSide::ALeg) => {
                let ack_to_b = self.ack_to_b(&call, cseq_number_of(&call.b_leg_headers.cseq));
                self.calls.with_call(handle, |c| c.state = CallState::Connected);
                vec![Outbound::new(&call.b_leg_ip, call.b_leg_port, ack_to_b)]
            }
            (MessageKind::Request { method: Method::BYE }, CallState::Connected, LegSide::ALeg) => {
                let ad_hoc_leg = LegHeaders {
                    via: msg.via.clone(),
                    from: msg.from.clone(),
                    to: msg.to.clone(),
                    cseq: msg.cseq.clone(),
                };
                let ok = headers::response(200, "OK", &ad_hoc_leg, &call.a_leg_uuid, &[], None);
                let bye_to_b = self.bye_to_b(&call);
                self.calls.with_call(handle, |c| c.state = CallState::Disconnecting);
                vec![Outbound::new(source_ip, source_port, ok), Outbound::new(&call.b_leg_ip, call.b_leg_port, bye_to_b)]
            }
            (MessageKind::Request { method: Method::BYE }, CallState::Connected, LegSide::BLeg) => {
                let ad_hoc_leg = LegHeaders {
                    via: msg.via.clone(),
                    from: msg.from.clone(),
                    to: msg.to.clone(),
                    cseq: msg.cseq.clone(),
                };
                let ok = headers::response(200, "OK", &ad_hoc_leg, &call.b_leg_uuid, &[], None);
                let bye_to_a = self.bye_to_a(&call);
                self.calls.with_call(handle, |c| c.state = CallState::Disconnecting);
                vec![Outbound::new(source_ip, source_port, ok), Outbound::new(&call.a_leg_ip, call.a_leg_port, bye_to_a)]
            }
            (MessageKind::Response { code }, CallState::Disconnecting, _)
                if (200..300).contains(code) && matches!(msg.cseq_method.as_str(), "BYE" | "CANCEL") =>
            {
                self.calls.release(handle);
                info!("call {} released after disconnecting", call.a_leg_uuid);
                Vec::new()
            }
            (kind, state, _) => {
                // TODO: Release both legs properly. Preserved from the original
                // design: a CANCEL racing a 200 OK, or a BYE racing an ACK, is
                // logged and left for the endpoints to resolve by retransmission.
                warn!("unexpected event {:?} in state {:?} for call {}", kind, state, call.a_leg_uuid);
                Vec::new()
            }
        }
    }

    fn fresh_via(&self) -> String {
        headers::new_via(&self.config.server_ip, self.config.server_port)
    }

    fn ack_to_b(&self, call: &Call, cseq_number: u32) -> String {
        let request_uri = b_leg_request_uri(call);
        headers::generated_request(
            "ACK",
            &request_uri,
            &self.fresh_via(),
            &call.b_leg_headers.from,
            &call.b_leg_headers.to,
            &call.b_leg_uuid,
            cseq_number,
            "ACK",
            70,
            &self.contact(),
            None,
        )
    }

    fn cancel_to_b(&self, call: &Call) -> String {
        let request_uri = b_leg_request_uri(call);
        headers::generated_request(
            "CANCEL",
            &request_uri,
            &self.fresh_via(),
            &call.b_leg_headers.from,
            &call.b_leg_headers.to,
            &call.b_leg_uuid,
            cseq_number_of(&call.b_leg_headers.cseq),
            "CANCEL",
            70,
            &self.contact(),
            None,
        )
    }

    fn bye_to_b(&self, call: &Call) -> String {
        let request_uri = b_leg_request_uri(call);
        headers::generated_request(
            "BYE",
            &request_uri,
            &self.fresh_via(),
            &call.b_leg_headers.from,
            &call.b_leg_headers.to,
            &call.b_leg_uuid,
            self.next_cseq(),
            "BYE",
            70,
            &self.contact(),
            None,
        )
    }

    fn bye_to_a(&self, call: &Call) -> String {
        let request_uri = call.a_leg_contact.clone();
        headers::generated_request(
            "BYE",
            &request_uri,
            &self.fresh_via(),
            &call.a_leg_headers.to,
            &call.a_leg_headers.from,
            &call.a_leg_uuid,
            self.next_cseq(),
            "BYE",
            70,
            &self.contact(),
            None,
        )
    }
}

fn b_leg_request_uri(call: &Call) -> String {
    if call.b_leg_contact.is_empty() {
        format!("sip:{}@{}:{}", call.callee, call.b_leg_ip, call.b_leg_port)
    } else {
        call.b_leg_contact.clone()
    }
}

fn ringing_to_a(call: &Call, msg: &ParsedMessage, code: u16, default_reason: &str) -> Outbound {
    response_to(
        &call.a_leg_ip,
        call.a_leg_port,
        code,
        reason(msg, default_reason),
        &call.a_leg_headers,
        &call.a_leg_uuid,
        msg.body.as_deref(),
    )
}

fn reason<'a>(msg: &'a ParsedMessage, default_reason: &'a str) -> &'a str {
    if msg.reason_phrase.is_empty() {
        default_reason
    } else {
        &msg.reason_phrase
    }
}

fn response_to(ip: &str, port: u16, code: u16, reason: &str, leg: &LegHeaders, call_id: &str, body: Option<&str>) -> Outbound {
    let payload = headers::response(code, reason, leg, call_id, &[], body);
    Outbound::new(ip, port, payload)
}

fn apply_media_flags(call: &mut Call, has_sdp: bool, leg: LegSide) {
    if !has_sdp {
        return;
    }
    match leg {
        LegSide::BLeg => {
            call.a_leg_media.local_media = true;
            call.b_leg_media.remote_media = true;
        }
        LegSide::ALeg => {
            call.b_leg_media.local_media = true;
            call.a_leg_media.remote_media = true;
        }
    }
}

fn decremented_max_forwards(inbound: u32) -> u32 {
    inbound.saturating_sub(1)
}

fn extract_user(header_line: &str) -> Option<String> {
    let after_scheme = header_line.split_once("sip:")?.1;
    let user = after_scheme.split(['@', ';', '>']).next()?;
    if user.is_empty() {
        None
    } else {
        Some(user.to_string())
    }
}

fn cseq_number_of(cseq_line: &str) -> u32 {
    let digits_start = cseq_line.find(|c: char| c.is_ascii_digit());
    let Some(start) = digits_start else {
        return 0;
    };
    let digits_end = cseq_line[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|o| start + o)
        .unwrap_or(cseq_line.len());
    cseq_line[start..digits_end].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> Core {
        Core::new(TinySipConfig::default())
    }

    fn invite(call_id: &str, from_user: &str, to_user: &str, with_sdp: bool) -> String {
        let body = "v=0\r\ns=-\r\n";
        let content_type = if with_sdp { "Content-Type: application/sdp\r\n" } else { "" };
        let content_length = if with_sdp { body.len() } else { 0 };
        let body_section = if with_sdp { body } else { "" };
        format!(
            "INVITE sip:{to}@192.168.32.131 SIP/2.0\r\n\
Via: SIP/2.0/UDP 10.0.0.1:5060;rport;branch=z9hG4bKflow1\r\n\
From: <sip:{from}@example.com>;tag=aaa\r\n\
To: <sip:{to}@example.com>\r\n\
Call-ID: {call_id}\r\n\
CSeq: 1 INVITE\r\n\
Contact: <sip:{from}@10.0.0.1:5060>\r\n\
Max-Forwards: 70\r\n\
{content_type}Content-Length: {content_length}\r\n\r\n{body_section}",
            to = to_user,
            from = from_user,
            call_id = call_id,
            content_type = content_type,
            content_length = content_length,
            body_section = body_section,
        )
    }

    #[test]
    fn new_invite_to_known_user_routes_and_sends_trying() {
        let core = core();
        let out = core.handle_datagram(&invite("flow-001@example.com", "1001", "1002", true), "10.0.0.1", 5060).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].payload.starts_with("SIP/2.0 100 Trying"));
        assert!(out[1].payload.starts_with("INVITE sip:1002@"));
        assert!(out[1].payload.contains("Call-ID: b-leg001@example.com"));
        assert_eq!(out[1].ip, "192.168.192.1");
        assert_eq!(out[1].port, 5070);
        assert_eq!(core.calls.active_count(), 1);
    }

    #[test]
    fn new_invite_to_unknown_user_gets_404_and_releases_call() {
        let core = core();
        let out = core.handle_datagram(&invite("flow-404@example.com", "1001", "9999", false), "10.0.0.1", 5060).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].payload.starts_with("SIP/2.0 404 Not Found"));
        assert_eq!(core.calls.active_count(), 0);
    }

    #[test]
    fn capacity_exhaustion_returns_500() {
        let core = core();
        for i in 0..32 {
            let id = format!("flow-{}@example.com", i);
            core.handle_datagram(&invite(&id, "1001", "1002", false), "10.0.0.1", 5060).unwrap();
        }
        let out = core.handle_datagram(&invite("flow-over@example.com", "1001", "1002", false), "10.0.0.1", 5060).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].payload.starts_with("SIP/2.0 500"));
        assert_eq!(core.calls.active_count(), 32);
    }

    #[test]
    fn full_successful_call_flow_releases_on_bye() {
        let core = core();
        core.handle_datagram(&invite("flow-001@example.com", "1001", "1002", true), "10.0.0.1", 5060).unwrap();

        let ringing = "SIP/2.0 180 Ringing\r\nCall-ID: b-leg001@example.com\r\nCSeq: 1 INVITE\r\nContent-Length: 0\r\n\r\n";
        let out = core.handle_datagram(ringing, "192.168.192.1", 5070).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].payload.starts_with("SIP/2.0 180 Ringing"));

        let ok = "SIP/2.0 200 OK\r\nCall-ID: b-leg001@example.com\r\nCSeq: 1 INVITE\r\nContact: <sip:1002@192.168.192.1:5070>\r\nContent-Type: application/sdp\r\nContent-Length: 9\r\n\r\nv=0\r\ns=-\r\n";
        let out = core.handle_datagram(ok, "192.168.192.1", 5070).unwrap();
        assert!(out[0].payload.starts_with("SIP/2.0 200 OK"));

        let ack = "ACK sip:1001@10.0.0.1:5060 SIP/2.0\r\nCall-ID: flow-001@example.com\r\nCSeq: 1 ACK\r\n\r\n";
        let out = core.handle_datagram(ack, "10.0.0.1", 5060).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].payload.starts_with("ACK sip:"));

        let bye = "BYE sip:x SIP/2.0\r\nCall-ID: flow-001@example.com\r\nCSeq: 2 BYE\r\n\r\n";
        let out = core.handle_datagram(bye, "10.0.0.1", 5060).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].payload.starts_with("SIP/2.0 200 OK"));
        assert!(out[1].payload.starts_with("BYE sip:"));

        let bye_ok = "SIP/2.0 200 OK\r\nCall-ID: b-leg001@example.com\r\nCSeq: 2 BYE\r\nContent-Length: 0\r\n\r\n";
        let out = core.handle_datagram(bye_ok, "192.168.192.1", 5070).unwrap();
        assert!(out.is_empty());
        assert_eq!(core.calls.active_count(), 0);
    }

    #[test]
    fn busy_from_b_sends_ack_and_forwards_486() {
        let core = core();
        core.handle_datagram(&invite("flow-busy@example.com", "1001", "1002", false), "10.0.0.1", 5060).unwrap();
        let busy = "SIP/2.0 486 Busy Here\r\nCall-ID: b-legbusy@example.com\r\nCSeq: 1 INVITE\r\nContent-Length: 0\r\n\r\n";
        let out = core.handle_datagram(busy, "192.168.192.1", 5070).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].payload.starts_with("ACK sip:"));
        assert!(out[0].payload.contains("CSeq: 1 ACK"));
        assert!(out[1].payload.starts_with("SIP/2.0 486 Busy Here"));
        assert_eq!(core.calls.active_count(), 0);
    }

    #[test]
    fn cancel_during_ringing_tears_down_via_disconnecting() {
        let core = core();
        core.handle_datagram(&invite("flow-cancel@example.com", "1001", "1002", false), "10.0.0.1", 5060).unwrap();
        let ringing = "SIP/2.0 180 Ringing\r\nCall-ID: b-legcancel@example.com\r\nCSeq: 1 INVITE\r\nContent-Length: 0\r\n\r\n";
        core.handle_datagram(ringing, "192.168.192.1", 5070).unwrap();

        let cancel = "CANCEL sip:1002@192.168.32.131 SIP/2.0\r\nCall-ID: flow-cancel@example.com\r\nCSeq: 2 CANCEL\r\n\r\n";
        let out = core.handle_datagram(cancel, "10.0.0.1", 5060).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0].payload.starts_with("SIP/2.0 200 OK"));
        assert!(out[1].payload.starts_with("SIP/2.0 487 Request Terminated"));
        assert!(out[2].payload.starts_with("CANCEL sip:"));
        assert!(out[2].payload.contains("CSeq: 1 CANCEL"));

        let cancel_ok = "SIP/2.0 200 OK\r\nCall-ID: b-legcancel@example.com\r\nCSeq: 1 CANCEL\r\nContent-Length: 0\r\n\r\n";
        core.handle_datagram(cancel_ok, "192.168.192.1", 5070).unwrap();
        assert_eq!(core.calls.active_count(), 0);
    }

    #[test]
    fn unknown_dialog_non_invite_is_dropped_silently() {
        let core = core();
        let bye = "BYE sip:x SIP/2.0\r\nCall-ID: nonexistent@example.com\r\nCSeq: 1 BYE\r\n\r\n";
        let out = core.handle_datagram(bye, "10.0.0.1", 5060).unwrap();
        assert!(out.is_empty());
    }
}
