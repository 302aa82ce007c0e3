//! Runtime configuration (§6, §9 `CoreContext`).
//!
//! The original server reads its address, port, worker count and queue
//! capacity from compile-time constants. This keeps those as defaults but
//! allows overriding them from the command line for local testing, the way
//! a systems CLI tool parses flags once at startup into an immutable config
//! struct.

use clap::Parser;

pub const DEFAULT_SERVER_IP: &str = "192.168.32.131";
pub const DEFAULT_SERVER_PORT: u16 = 5060;
pub const DEFAULT_WORKER_COUNT: usize = 5;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// A minimal SIP B2BUA over UDP.
#[derive(Debug, Parser)]
#[command(name = "tinysip", about = "A minimal SIP B2BUA over UDP")]
pub struct Cli {
    /// Interface address the B2BUA listens and sends on.
    #[arg(long, default_value = DEFAULT_SERVER_IP)]
    pub server_ip: String,

    /// UDP port the B2BUA listens and sends on.
    #[arg(long, default_value_t = DEFAULT_SERVER_PORT)]
    pub server_port: u16,

    /// Number of dialog-sticky worker threads.
    #[arg(long, default_value_t = DEFAULT_WORKER_COUNT)]
    pub worker_count: usize,

    /// Per-worker bounded queue capacity.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

/// Resolved, immutable configuration passed into the core at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TinySipConfig {
    pub server_ip: String,
    pub server_port: u16,
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl TinySipConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        TinySipConfig {
            server_ip: cli.server_ip.clone(),
            server_port: cli.server_port,
            worker_count: cli.worker_count,
            queue_capacity: cli.queue_capacity,
        }
    }
}

impl Default for TinySipConfig {
    fn default() -> Self {
        TinySipConfig {
            server_ip: DEFAULT_SERVER_IP.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_compile_time_constants() {
        let config = TinySipConfig::default();
        assert_eq!(config.server_ip, "192.168.32.131");
        assert_eq!(config.server_port, 5060);
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.queue_capacity, 10);
    }
}
