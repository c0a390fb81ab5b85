//! JSON framing for gateway messages.
//!
//! Each transport frame carries exactly one JSON-encoded [`Envelope`].

use crate::error::{GatewayError, GatewayResult};
use crate::messages::Envelope;
use serde_json::Value;

/// Encode any serializable payload into a text frame.
pub fn encode<T: serde::Serialize>(value: &T) -> GatewayResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a raw frame into an envelope.
///
/// Only unparseable JSON or a non-object frame is a codec error. `op` and `t`
/// are read leniently: a value of the wrong type is treated as absent.
pub fn decode(data: &[u8]) -> GatewayResult<Envelope> {
    let mut fields = match serde_json::from_slice::<Value>(data)? {
        Value::Object(fields) => fields,
        _ => return Err(GatewayError::Codec("frame is not a JSON object".into())),
    };

    Ok(Envelope {
        op: fields.get("op").and_then(op_code),
        t: fields.get("t").and_then(Value::as_str).map(str::to_string),
        d: fields.remove("d").unwrap_or(Value::Null),
    })
}

/// Integral numbers are accepted whether written as `10` or `10.0`.
fn op_code(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
            .map(|f| f as u64)
    })
}
