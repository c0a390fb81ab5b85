//! Gateway message envelope and payload types.
//!
//! Every frame is a JSON object `{ "op"?, "t"?, "d"? }`. Control messages
//! carry an operation code in `op`; dispatch messages carry a type name in
//! `t`. The payload always lives in `d`.

use crate::error::GatewayResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Control operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// Server → client, sent once the connection passes admission.
    Hello = 1,
    /// Server → client, periodic session status.
    Status = 2,
    /// Client → server, requests a session for the connection's identity.
    Identify = 10,
}

impl Op {
    pub fn code(self) -> u64 {
        self as u64
    }
}

impl From<Op> for u64 {
    fn from(op: Op) -> u64 {
        op.code()
    }
}

impl TryFrom<u64> for Op {
    type Error = String;
    fn try_from(v: u64) -> Result<Self, String> {
        match v {
            1 => Ok(Self::Hello),
            2 => Ok(Self::Status),
            10 => Ok(Self::Identify),
            _ => Err(format!("unknown op: {v}")),
        }
    }
}

/// Dispatch type names carried in `t`.
pub mod dispatch {
    pub const READY: &str = "READY";
    pub const VOICE_STATE_UPDATE: &str = "VOICE_STATE_UPDATE";
    pub const VOICE_SERVER_UPDATE: &str = "VOICE_SERVER_UPDATE";
}

/// Wire envelope shared by both directions.
///
/// `op` is kept as a raw number so that unknown operation codes still decode
/// and fall through to type-based dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub d: Value,
}

impl Envelope {
    /// Build a control message.
    pub fn control<T: Serialize>(op: Op, data: &T) -> GatewayResult<Self> {
        Ok(Self {
            op: Some(op.code()),
            t: None,
            d: serde_json::to_value(data)?,
        })
    }

    /// Build a dispatch message.
    pub fn dispatch<T: Serialize>(t: &str, data: &T) -> GatewayResult<Self> {
        Ok(Self {
            op: None,
            t: Some(t.to_string()),
            d: serde_json::to_value(data)?,
        })
    }

    /// HELLO carrying the server timestamp in milliseconds.
    pub fn hello(ready_at_ms: u64) -> Self {
        Self {
            op: Some(Op::Hello.code()),
            t: None,
            d: json!({ "ready": ready_at_ms }),
        }
    }

    /// READY carrying the new session's public id and bearer secret.
    pub fn ready(client_id: &str, access_token: &str) -> Self {
        Self {
            op: None,
            t: Some(dispatch::READY.to_string()),
            d: json!({ "client_id": client_id, "access_token": access_token }),
        }
    }

    /// Known operation code, if any.
    pub fn op(&self) -> Option<Op> {
        self.op.and_then(|v| Op::try_from(v).ok())
    }

    pub fn is_identify(&self) -> bool {
        self.op() == Some(Op::Identify)
    }

    /// Deserialize `d` into a typed payload.
    pub fn data<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.d.clone()).ok()
    }
}

/// `d` of HELLO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloPayload {
    pub ready: u64,
}

/// `d` of READY.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub client_id: String,
    pub access_token: String,
}

/// `d` of STATUS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub client_id: String,
    pub guilds: usize,
    pub uptime_ms: u64,
}

/// `d` of VOICE_STATE_UPDATE. Unknown fields are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceStateUpdate {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `d` of VOICE_SERVER_UPDATE. Unknown fields are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceServerUpdate {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
