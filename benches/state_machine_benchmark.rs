use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tinysip::config::TinySipConfig;
use tinysip::parser;
use tinysip::state_machine::Core;

const SAMPLE_INVITE: &str = "INVITE sip:1002@192.168.32.131 SIP/2.0\r\n\
Via: SIP/2.0/UDP 10.0.0.1:5060;rport;branch=z9hG4bKflow1\r\n\
From: <sip:1001@example.com>;tag=aaa\r\n\
To: <sip:1002@example.com>\r\n\
Call-ID: bench-001@example.com\r\n\
CSeq: 1 INVITE\r\n\
Contact: <sip:1001@10.0.0.1:5060>\r\n\
Max-Forwards: 70\r\n\
Content-Type: application/sdp\r\n\
Content-Length: 11\r\n\r\n\
v=0\r\ns=-\r\n";

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_invite", |b| {
        b.iter(|| parser::parse(black_box(SAMPLE_INVITE)).unwrap());
    });
}

fn bench_new_invite_dispatch(c: &mut Criterion) {
    c.bench_function("new_call_invite_dispatch", |b| {
        b.iter(|| {
            let core = Core::new(TinySipConfig::default());
            core.handle_datagram(black_box(SAMPLE_INVITE), "10.0.0.1", 5060).unwrap();
        });
    });
}

criterion_group!(benches, bench_parse, bench_new_invite_dispatch);
criterion_main!(benches);
