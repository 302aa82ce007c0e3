//! Unified error handling for TinySIP
//!
//! A single error enum covering the failure taxonomy the call-control core
//! can produce: malformed input, lookup misses, pool exhaustion, protocol
//! races, and transport failures. No transaction-layer retry semantics are
//! modeled here — the core is deliberately stateless with respect to SIP
//! transactions (see `state_machine` module docs).

use std::error::Error as StdError;
use std::fmt;

/// Unified error type for TinySIP operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SipError {
    /// The message's start line was missing, truncated, or did not match
    /// `METHOD SP URI SP SIP/2.0` or `SIP/2.0 SP CODE SP ...`.
    MalformedStartLine { reason: String },

    /// A called party was not present in the location directory.
    LookupFailure { user_id: String },

    /// The call table has no free slots.
    CapacityExhaustion { capacity: usize },

    /// An event arrived that the current call state does not expect.
    ProtocolViolation { state: String, event: String },

    /// The outbound datagram could not be sent.
    TransportError { destination: String, reason: String },
}

impl fmt::Display for SipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SipError::MalformedStartLine { reason } => {
                write!(f, "malformed start line: {}", reason)
            }
            SipError::LookupFailure { user_id } => {
                write!(f, "no location entry for user '{}'", user_id)
            }
            SipError::CapacityExhaustion { capacity } => {
                write!(f, "call table full (capacity {})", capacity)
            }
            SipError::ProtocolViolation { state, event } => {
                write!(f, "unexpected event '{}' in state {}", event, state)
            }
            SipError::TransportError { destination, reason } => {
                write!(f, "failed to send to {}: {}", destination, reason)
            }
        }
    }
}

impl StdError for SipError {}

impl SipError {
    pub fn malformed_start_line(reason: impl Into<String>) -> Self {
        SipError::MalformedStartLine { reason: reason.into() }
    }

    pub fn lookup_failure(user_id: impl Into<String>) -> Self {
        SipError::LookupFailure { user_id: user_id.into() }
    }

    pub fn capacity_exhaustion(capacity: usize) -> Self {
        SipError::CapacityExhaustion { capacity }
    }

    pub fn protocol_violation(state: impl Into<String>, event: impl Into<String>) -> Self {
        SipError::ProtocolViolation { state: state.into(), event: event.into() }
    }

    pub fn transport_error(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        SipError::TransportError { destination: destination.into(), reason: reason.into() }
    }

    /// Short category tag, useful as a log field.
    pub fn category(&self) -> &'static str {
        match self {
            SipError::MalformedStartLine { .. } => "parse",
            SipError::LookupFailure { .. } => "lookup",
            SipError::CapacityExhaustion { .. } => "capacity",
            SipError::ProtocolViolation { .. } => "protocol",
            SipError::TransportError { .. } => "transport",
        }
    }
}

/// Result type for TinySIP operations.
pub type SipResult<T> = Result<T, SipError>;
