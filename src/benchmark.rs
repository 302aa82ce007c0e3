//! Throughput benchmarking harness.
//!
//! Grounded on the teacher's `benchmark.rs`: a manual-threads throughput
//! measurement scaled to the host's core count via `num_cpus`, reporting
//! messages/sec and MB/sec, rather than pulling in a fork-join pool crate
//! just for this diagnostic.

use crate::parser;
use crate::state_machine::Core;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

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

/// Result of a single throughput run.
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkResult {
    pub total_messages: usize,
    pub elapsed: Duration,
    pub messages_per_sec: f64,
    pub mb_per_sec: f64,
}

impl BenchmarkResult {
    fn from_run(total_messages: usize, bytes: usize, elapsed: Duration) -> Self {
        let seconds = elapsed.as_secs_f64().max(f64::EPSILON);
        BenchmarkResult {
            total_messages,
            elapsed,
            messages_per_sec: total_messages as f64 / seconds,
            mb_per_sec: (bytes as f64 / (1024.0 * 1024.0)) / seconds,
        }
    }
}

/// Single-threaded parser throughput over `iterations` copies of a sample
/// INVITE.
pub fn benchmark_parsing(iterations: usize) -> BenchmarkResult {
    let start = Instant::now();
    for _ in 0..iterations {
        parser::parse(SAMPLE_INVITE).expect("sample message must parse");
    }
    BenchmarkResult::from_run(iterations, iterations * SAMPLE_INVITE.len(), start.elapsed())
}

/// End-to-end state-machine throughput: one full new-call INVITE dispatch
/// per iteration (each against a fresh `Core`, since a real call occupies a
/// table slot until torn down).
pub fn benchmark_state_machine(iterations: usize) -> BenchmarkResult {
    let start = Instant::now();
    for i in 0..iterations {
        let core = Core::new(crate::config::TinySipConfig::default());
        let raw = SAMPLE_INVITE.replacen("bench-001", &format!("bench-{:06}", i), 1);
        core.handle_datagram(&raw, "10.0.0.1", 5060).expect("sample message must parse");
    }
    BenchmarkResult::from_run(iterations, iterations * SAMPLE_INVITE.len(), start.elapsed())
}

/// Spread `iterations_per_thread` parses across `thread_count` OS threads
/// and report aggregate throughput.
pub fn benchmark_manual_threads(thread_count: usize, iterations_per_thread: usize) -> BenchmarkResult {
    let completed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..thread_count)
        .map(|_| {
            let completed = Arc::clone(&completed);
            std::thread::spawn(move || {
                for _ in 0..iterations_per_thread {
                    parser::parse(SAMPLE_INVITE).expect("sample message must parse");
                }
                completed.fetch_add(iterations_per_thread, Ordering::Relaxed);
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("benchmark worker thread panicked");
    }

    let total = completed.load(Ordering::Relaxed);
    BenchmarkResult::from_run(total, total * SAMPLE_INVITE.len(), start.elapsed())
}

/// Run the manual-threads benchmark once per thread count from 1 up to the
/// host's available cores, printing a one-line summary per step.
pub fn run_comprehensive_benchmark(iterations_per_thread: usize) -> Vec<BenchmarkResult> {
    let available = num_cpus::get();
    (1..=available)
        .map(|threads| {
            let result = benchmark_manual_threads(threads, iterations_per_thread);
            println!(
                "{:2} threads: {:>10.0} msgs/sec, {:>7.2} MB/sec",
                threads, result.messages_per_sec, result.mb_per_sec
            );
            result
        })
        .collect()
}
