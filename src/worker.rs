//! Worker Pool (C8): `MAX_THREADS` dialog-sticky workers, each with its own
//! bounded FIFO.
//!
//! Grounded on the original's `message_queue_t`/`worker_thread_t` pair
//! (`examples/original_source/sip_server.h`: `MAX_THREADS`, `QUEUE_CAPACITY`):
//! a fixed set of long-lived threads rather than a fork-join pool, because
//! `spec.md` §5 requires strict per-dialog ordering, which only a sticky
//! assignment can give for free. `mpsc::sync_channel` is the channel's bound
//! — sending blocks the receive loop when a worker's queue is full, the
//! same backpressure the original's condvar-guarded ring buffer gives.

use crate::state_machine::Core;
use crate::transport::Transport;
use log::{error, warn};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

struct Job {
    raw: String,
    source_ip: String,
    source_port: u16,
}

/// A fixed pool of dialog-sticky worker threads.
pub struct WorkerPool {
    senders: Vec<SyncSender<Job>>,
    handles: Vec<JoinHandle<()>>,
    round_robin: AtomicUsize,
}

impl WorkerPool {
    /// Spawn `worker_count` threads, each backed by a bounded queue of
    /// `queue_capacity`, processing datagrams against `core` and sending
    /// results out through `transport`.
    pub fn spawn(worker_count: usize, queue_capacity: usize, core: Arc<Core>, transport: Arc<Transport>) -> Self {
        let mut senders = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let (tx, rx) = sync_channel::<Job>(queue_capacity);
            let core = Arc::clone(&core);
            let transport = Arc::clone(&transport);
            let handle = std::thread::Builder::new()
                .name(format!("tinysip-worker-{}", worker_id))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        match core.handle_datagram(&job.raw, &job.source_ip, job.source_port) {
                            Ok(outbound) => {
                                for message in outbound {
                                    if let Err(e) = transport.send(&message) {
                                        warn!("worker {} dropped a send: {}", worker_id, e);
                                    }
                                }
                            }
                            Err(e) => warn!("worker {} dropped malformed datagram: {}", worker_id, e),
                        }
                    }
                })
                .expect("failed to spawn tinysip worker thread");
            senders.push(tx);
            handles.push(handle);
        }

        WorkerPool { senders, handles, round_robin: AtomicUsize::new(0) }
    }

    /// Enqueue a raw datagram onto the worker responsible for its dialog.
    /// Blocks if that worker's queue is full.
    pub fn dispatch(&self, raw: String, source_ip: String, source_port: u16) {
        let index = self.worker_index_for(&raw);
        let job = Job { raw, source_ip, source_port };
        if self.senders[index].send(job).is_err() {
            error!("worker {} channel closed, dropping datagram", index);
        }
    }

    fn worker_index_for(&self, raw: &str) -> usize {
        match crate::parser::parse(raw).ok().map(|m| m.call_id_value().to_string()) {
            Some(call_id) if !call_id.is_empty() => {
                let mut hasher = DefaultHasher::new();
                call_id.hash(&mut hasher);
                (hasher.finish() as usize) % self.senders.len()
            }
            _ => self.round_robin.fetch_add(1, Ordering::Relaxed) % self.senders.len(),
        }
    }

    /// Drop every sender (closing the queues) and join all worker threads.
    pub fn shutdown(mut self) {
        self.senders.clear();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
