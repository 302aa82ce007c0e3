//! TinySIP B2BUA entry point: parses CLI flags, wires the ambient stack
//! (logging, config, transport, worker pool) around the call-control core,
//! and runs the receive loop until the process is killed.

use clap::Parser;
use log::info;
use std::sync::Arc;
use tinysip::config::{Cli, TinySipConfig};
use tinysip::state_machine::Core;
use tinysip::transport::Transport;
use tinysip::worker::WorkerPool;

fn main() -> std::io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = TinySipConfig::from_cli(&cli);
    info!(
        "starting tinysip on {}:{} with {} workers (queue capacity {})",
        config.server_ip, config.server_port, config.worker_count, config.queue_capacity
    );

    let transport = Arc::new(Transport::bind(&config.server_ip, config.server_port)?);
    let core = Arc::new(Core::new(config.clone()));
    let pool = WorkerPool::spawn(config.worker_count, config.queue_capacity, core, Arc::clone(&transport));

    loop {
        match transport.recv() {
            Ok((raw, source_ip, source_port)) => pool.dispatch(raw, source_ip, source_port),
            Err(e) => log::error!("receive failed: {}", e),
        }
    }
}
