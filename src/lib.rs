//! TinySIP — a minimal SIP B2BUA over UDP.
//!
//! Bridges an A-leg dialog to an independently-numbered B-leg dialog through
//! a single call-control state machine, bypassing media (SDP bodies are
//! forwarded verbatim, RTP is never touched).

pub mod benchmark;
pub mod call;
pub mod config;
pub mod error;
pub mod headers;
pub mod location;
pub mod parser;
pub mod register;
pub mod state_machine;
pub mod transport;
pub mod types;
pub mod worker;

pub use call::{Call, CallHandle, CallTable, LegHeaders};
pub use config::TinySipConfig;
pub use error::{SipError, SipResult};
pub use location::{LocationDirectory, LocationEntry};
pub use state_machine::{Core, Outbound};
