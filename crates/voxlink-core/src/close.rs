//! Connection close codes.
//!
//! Numeric values are part of the wire contract with clients and must not
//! be renumbered.

use std::fmt;

/// Why the gateway closed a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    NoClientId,
    NoAuth,
    NotAllowed,
    SessionExpired,
    DecodeError,
    AlreadyConnected,
    NotIdentified,
    ServerClosed,
}

impl CloseCode {
    pub const ALL: [CloseCode; 8] = [
        CloseCode::NoClientId,
        CloseCode::NoAuth,
        CloseCode::NotAllowed,
        CloseCode::SessionExpired,
        CloseCode::DecodeError,
        CloseCode::AlreadyConnected,
        CloseCode::NotIdentified,
        CloseCode::ServerClosed,
    ];

    pub fn code(self) -> u16 {
        match self {
            CloseCode::NoClientId => 4001,
            CloseCode::NoAuth => 4002,
            CloseCode::NotAllowed => 4003,
            CloseCode::SessionExpired => 4004,
            CloseCode::DecodeError => 4005,
            CloseCode::AlreadyConnected => 4006,
            CloseCode::NotIdentified => 4007,
            CloseCode::ServerClosed => 4008,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            CloseCode::NoClientId => "no client id",
            CloseCode::NoAuth => "unauthorized",
            CloseCode::NotAllowed => "not allowed",
            CloseCode::SessionExpired => "session expired",
            CloseCode::DecodeError => "decode error",
            CloseCode::AlreadyConnected => "already connected",
            CloseCode::NotIdentified => "not identified",
            CloseCode::ServerClosed => "server closed",
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.reason())
    }
}
