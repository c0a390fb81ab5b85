//! Structured gateway events.
//!
//! The server reports every notable lifecycle step to an [`EventSink`].
//! Sinks are owned by the server instance; a panicking sink is isolated by
//! the server and never interrupts the operation that emitted the event.

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::sync::Mutex;
use tracing::debug;
use voxlink_core::{now_ms, CloseCode};

/// A timestamped gateway event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp_ms: now_ms(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    ConnectionAccepted {
        conn_id: u64,
        identity: String,
        remote: Option<IpAddr>,
    },
    ConnectionRejected {
        remote: Option<IpAddr>,
        code: u16,
        reason: &'static str,
    },
    /// An older connection for `identity` was closed to make way for `conn_id`.
    SessionTakeover {
        identity: String,
        old_conn_id: u64,
        conn_id: u64,
    },
    Identified {
        conn_id: u64,
        identity: String,
        client_id: String,
    },
    Routed {
        identity: String,
        message_type: String,
        guild_id: String,
    },
    Dropped {
        identity: String,
        message_type: String,
        reason: &'static str,
    },
    /// The server closed an established connection for a protocol violation.
    Terminated {
        conn_id: u64,
        identity: String,
        code: u16,
        reason: &'static str,
    },
    SendFailed {
        error: String,
    },
    Closed {
        conn_id: u64,
        identity: String,
        guilds_killed: usize,
    },
    ShutDown {
        connections_closed: usize,
    },
}

impl EventKind {
    pub fn rejected(remote: Option<IpAddr>, code: CloseCode) -> Self {
        EventKind::ConnectionRejected {
            remote,
            code: code.code(),
            reason: code.reason(),
        }
    }

    pub fn terminated(conn_id: u64, identity: &str, code: CloseCode) -> Self {
        EventKind::Terminated {
            conn_id,
            identity: identity.to_string(),
            code: code.code(),
            reason: code.reason(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.timestamp_ms)?;
        match &self.kind {
            EventKind::ConnectionAccepted { conn_id, identity, remote } => {
                write!(f, "accepted conn {conn_id} for {identity} from {}", fmt_remote(remote))
            }
            EventKind::ConnectionRejected { remote, code, reason } => {
                write!(f, "rejected {} with {code} ({reason})", fmt_remote(remote))
            }
            EventKind::SessionTakeover { identity, old_conn_id, conn_id } => {
                write!(f, "conn {conn_id} took over {identity} from conn {old_conn_id}")
            }
            EventKind::Identified { conn_id, identity, client_id } => {
                write!(f, "conn {conn_id} identified {identity} as {client_id}")
            }
            EventKind::Routed { identity, message_type, guild_id } => {
                write!(f, "routed {message_type} from {identity} to guild {guild_id}")
            }
            EventKind::Dropped { identity, message_type, reason } => {
                write!(f, "dropped {message_type} from {identity}: {reason}")
            }
            EventKind::Terminated { conn_id, identity, code, reason } => {
                write!(f, "terminated conn {conn_id} ({identity}) with {code} ({reason})")
            }
            EventKind::SendFailed { error } => write!(f, "send failed: {error}"),
            EventKind::Closed { conn_id, identity, guilds_killed } => {
                write!(f, "conn {conn_id} ({identity}) closed, {guilds_killed} guild(s) killed")
            }
            EventKind::ShutDown { connections_closed } => {
                write!(f, "shut down, {connections_closed} connection(s) closed")
            }
        }
    }
}

fn fmt_remote(remote: &Option<IpAddr>) -> String {
    remote.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".into())
}

/// Receiver of gateway events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Writes every event to the `tracing` subscriber at debug level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        debug!(target: "voxlink::events", "{event}");
    }
}

/// Keeps every event in memory; used by tests to assert on lifecycle steps.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events
            .lock()
            .map(|events| events.iter().map(|e| e.kind.clone()).collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
