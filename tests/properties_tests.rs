//! Property tests drawn from the invariants list: leg disjointness, capacity
//! bound, and CSeq monotonicity across calls.

use tinysip::call::CallTable;
use tinysip::config::TinySipConfig;
use tinysip::state_machine::Core;

fn invite(call_id: &str) -> String {
    format!(
        "INVITE sip:1002@192.168.32.131 SIP/2.0\r\n\
Via: SIP/2.0/UDP 10.0.0.1:5060;rport;branch=z9hG4bKflow1\r\n\
From: <sip:1001@example.com>;tag=aaa\r\n\
To: <sip:1002@example.com>\r\n\
Call-ID: {call_id}\r\n\
CSeq: 1 INVITE\r\n\
Contact: <sip:1001@10.0.0.1:5060>\r\n\
Max-Forwards: 70\r\n\
Content-Length: 0\r\n\r\n",
        call_id = call_id,
    )
}

/// Invariant 1 — leg identifier disjointness across every active call.
#[test]
fn active_calls_have_disjoint_leg_identifier_pairs() {
    let core = Core::new(TinySipConfig::default());
    let ids: Vec<String> = (0..10).map(|i| format!("prop-{}@example.com", i)).collect();
    for id in &ids {
        core.handle_datagram(&invite(id), "10.0.0.1", 5060).unwrap();
    }

    let mut seen = std::collections::HashSet::new();
    for id in &ids {
        let (handle, _) = core.calls.find_by_dialog_id(id).unwrap();
        let (a, b) = core.calls.with_call(handle, |c| (c.a_leg_uuid.clone(), c.b_leg_uuid.clone())).unwrap();
        assert_ne!(a, b);
        assert!(seen.insert(a));
        assert!(seen.insert(b));
    }
}

/// Invariant 3 — once the table is full, the next INVITE gets 500 and the
/// active count does not change.
#[test]
fn capacity_bound_holds_across_many_invites() {
    let core = Core::new(TinySipConfig::default());
    for i in 0..32 {
        core.handle_datagram(&invite(&format!("cap-{}@example.com", i)), "10.0.0.1", 5060).unwrap();
    }
    let before = core.calls.active_count();

    let out = core.handle_datagram(&invite("cap-overflow@example.com"), "10.0.0.1", 5060).unwrap();

    assert!(out[0].payload.starts_with("SIP/2.0 500"));
    assert_eq!(core.calls.active_count(), before);
}

/// Invariant 4 — CSeq numbers the B2BUA originates strictly increase across
/// distinct calls sharing one core.
#[test]
fn cseq_numbers_strictly_increase_across_calls() {
    let core = Core::new(TinySipConfig::default());
    let mut cseqs = Vec::new();
    for i in 0..5 {
        let id = format!("cseq-{}@example.com", i);
        let out = core.handle_datagram(&invite(&id), "10.0.0.1", 5060).unwrap();
        let invite_to_b = &out[1].payload;
        let cseq_line = invite_to_b.lines().find(|l| l.starts_with("CSeq:")).unwrap();
        let number: u32 = cseq_line.split_whitespace().nth(1).unwrap().parse().unwrap();
        cseqs.push(number);
    }
    for window in cseqs.windows(2) {
        assert!(window[1] > window[0]);
    }
}

/// Invariant 2 — releasing a call clears activation and zeros its fields.
#[test]
fn release_clears_activation_and_header_state() {
    let table = CallTable::new();
    let handle = table.allocate().unwrap();
    table.with_call(handle, |c| {
        c.a_leg_uuid = "x".to_string();
        c.a_leg_headers.from = "From: <sip:1001@example.com>".to_string();
    });

    table.release(handle);

    assert_eq!(table.active_count(), 0);
    assert!(table.with_call(handle, |c| c.a_leg_uuid.clone()).is_none());
}
