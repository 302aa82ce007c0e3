//! Common enums shared across the call-control core.

use strum_macros::{Display, EnumString};

/// SIP methods the core dispatches on. Anything else parses to `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Method {
    INVITE,
    ACK,
    BYE,
    CANCEL,
    REGISTER,
    OPTIONS,
    #[strum(default)]
    Unknown(String),
}

/// Which half of the bridged call a message or dialog identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegSide {
    ALeg,
    BLeg,
}

/// The kind of SIP message, carrying the parsed method or status code.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Request { method: Method },
    Response { code: u16 },
}

/// Per-leg record of whether an SDP offer/answer has been seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaFlags {
    pub local_media: bool,
    pub remote_media: bool,
}

/// Call-control state, shared by both legs of a bridged call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallState {
    #[default]
    Idle,
    Routing,
    Ringing,
    Answered,
    Connected,
    Disconnecting,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn unknown_method_round_trips_its_text() {
        let m = Method::from_str("SUBSCRIBE").unwrap();
        assert_eq!(m, Method::Unknown("SUBSCRIBE".to_string()));
    }

    #[test]
    fn known_methods_parse_exactly() {
        assert_eq!(Method::from_str("INVITE").unwrap(), Method::INVITE);
        assert_eq!(Method::from_str("BYE").unwrap(), Method::BYE);
    }

    #[test]
    fn call_state_defaults_to_idle() {
        assert_eq!(CallState::default(), CallState::Idle);
    }
}
