//! Connection admission and per-connection handshake state.
//!
//! Implements the voxlink handshake:
//! 1. Transport upgrade carries `client-id` and `authorization` headers
//! 2. Server checks the block list, the identity, and the password
//! 3. Server sends HELLO with its current timestamp
//! 4. Client sends IDENTIFY (op 10)
//! 5. Server sends READY with the session id and access token

use crate::config::ServerConfig;
use std::net::IpAddr;
use std::sync::Arc;
use voxlink_core::{Channel, CloseCode};

/// Header carrying the client identity.
pub const CLIENT_ID_HEADER: &str = "client-id";
/// Header carrying the shared password.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Metadata captured when the transport accepted the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionMeta {
    pub remote: Option<IpAddr>,
    pub client_id: Option<String>,
    pub authorization: Option<String>,
}

impl ConnectionMeta {
    pub fn new(remote: Option<IpAddr>, client_id: Option<&str>, authorization: Option<&str>) -> Self {
        Self {
            remote,
            client_id: client_id.map(str::to_string),
            authorization: authorization.map(str::to_string),
        }
    }
}

/// Run the admission checks in order, returning the client identity.
///
/// The first failing check decides the close code.
pub fn admit(meta: &ConnectionMeta, config: &ServerConfig) -> Result<String, CloseCode> {
    if let Some(ip) = meta.remote {
        if config.blocked.contains(&ip) {
            return Err(CloseCode::NotAllowed);
        }
    }

    let identity = match meta.client_id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(CloseCode::NoClientId),
    };

    if !config.password.is_empty()
        && meta.authorization.as_deref() != Some(config.password.as_str())
    {
        return Err(CloseCode::NoAuth);
    }

    Ok(identity)
}

/// Where a connection is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Unauthenticated,
    HelloSent,
    Identified,
}

/// Per-connection context threaded through dispatch and close handling.
pub struct GatewaySession {
    /// Server-assigned connection id, unique for the server's lifetime.
    pub conn_id: u64,
    /// Identity from the `client-id` header.
    pub identity: String,
    pub remote: Option<IpAddr>,
    pub channel: Arc<dyn Channel>,
    pub state: HandshakeState,
}

impl GatewaySession {
    pub fn new(
        conn_id: u64,
        identity: String,
        remote: Option<IpAddr>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        Self {
            conn_id,
            identity,
            remote,
            channel,
            state: HandshakeState::Unauthenticated,
        }
    }

    pub fn is_identified(&self) -> bool {
        self.state == HandshakeState::Identified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(password: &str, blocked: &[&str]) -> ServerConfig {
        ServerConfig {
            password: password.to_string(),
            blocked: blocked.iter().map(|s| s.parse().unwrap()).collect(),
            ..ServerConfig::default()
        }
    }

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn admits_plain_identity() {
        let meta = ConnectionMeta::new(ip("127.0.0.1"), Some("abc"), None);
        assert_eq!(admit(&meta, &config("", &[])), Ok("abc".to_string()));
    }

    #[test]
    fn blocked_address_checked_first() {
        let meta = ConnectionMeta::new(ip("10.0.0.1"), None, None);
        assert_eq!(admit(&meta, &config("pw", &["10.0.0.1"])), Err(CloseCode::NotAllowed));
    }

    #[test]
    fn missing_or_empty_identity() {
        let cfg = config("", &[]);
        assert_eq!(
            admit(&ConnectionMeta::new(None, None, None), &cfg),
            Err(CloseCode::NoClientId)
        );
        assert_eq!(
            admit(&ConnectionMeta::new(None, Some(""), None), &cfg),
            Err(CloseCode::NoClientId)
        );
    }

    #[test]
    fn identity_checked_before_password() {
        let meta = ConnectionMeta::new(None, None, Some("wrong"));
        assert_eq!(admit(&meta, &config("pw", &[])), Err(CloseCode::NoClientId));
    }

    #[test]
    fn password_must_match_exactly() {
        let cfg = config("pw", &[]);
        for auth in [None, Some("PW"), Some("pw "), Some("")] {
            let meta = ConnectionMeta::new(None, Some("abc"), auth);
            assert_eq!(admit(&meta, &cfg), Err(CloseCode::NoAuth), "{auth:?}");
        }
        let meta = ConnectionMeta::new(None, Some("abc"), Some("pw"));
        assert!(admit(&meta, &cfg).is_ok());
    }

    #[test]
    fn empty_password_ignores_authorization() {
        let meta = ConnectionMeta::new(None, Some("abc"), Some("anything"));
        assert!(admit(&meta, &config("", &[])).is_ok());
    }

    #[test]
    fn unknown_remote_is_not_blocked() {
        let meta = ConnectionMeta::new(None, Some("abc"), None);
        assert!(admit(&meta, &config("", &["10.0.0.1"])).is_ok());
    }
}
