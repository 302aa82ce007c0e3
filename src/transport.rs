//! Transport (C7): the one place that touches a real UDP socket.
//!
//! Grounded on `examples/original_source/network_utils.c`'s `send_sip_message`
//! (one-shot `sendto`) and `sip_server.c`'s receive loop, which reads each
//! datagram into a fixed `BUFFER_SIZE` buffer. Unlike the original, which
//! opens and closes a socket per outbound send, this keeps one bound socket
//! for both directions — the original's per-send socket churn buys nothing
//! once a persistent `UdpSocket` is available.

use crate::error::{SipError, SipResult};
use crate::state_machine::Outbound;
use log::{debug, warn};
use std::net::UdpSocket;

/// Matches the original's `BUFFER_SIZE`: one UDP-MTU-safe datagram.
pub const BUFFER_SIZE: usize = 1400;

/// Owns the bound UDP socket used for both receiving and sending.
pub struct Transport {
    socket: UdpSocket,
}

impl Transport {
    pub fn bind(ip: &str, port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((ip, port))?;
        Ok(Transport { socket })
    }

    /// Block for the next datagram, returning its text and source address.
    /// Payloads exceeding `BUFFER_SIZE` are truncated at the buffer boundary,
    /// matching the original's fixed-size receive buffer. Non-UTF-8 bytes
    /// become replacement characters rather than failing the receive.
    pub fn recv(&self) -> std::io::Result<(String, String, u16)> {
        let mut buf = [0u8; BUFFER_SIZE];
        let (len, addr) = self.socket.recv_from(&mut buf)?;
        let text = String::from_utf8_lossy(&buf[..len]).into_owned();
        Ok((text, addr.ip().to_string(), addr.port()))
    }

    /// Send one outbound message, logging and swallowing transport failures
    /// — per `spec.md` §7, the caller's state has already advanced and the
    /// system relies on endpoint retransmission rather than a local retry.
    pub fn send(&self, outbound: &Outbound) -> SipResult<()> {
        let destination = format!("{}:{}", outbound.ip, outbound.port);
        self.socket
            .send_to(outbound.payload.as_bytes(), &destination)
            .map(|_| {
                debug!("sent {} bytes to {}", outbound.payload.len(), destination);
            })
            .map_err(|e| {
                warn!("send to {} failed: {}", destination, e);
                SipError::transport_error(destination, e.to_string())
            })
    }
}
