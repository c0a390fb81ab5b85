//! Session secrets and public session identifiers.
//!
//! Secret format: `hex(identity) "." hex(unix_ms) "." hex(random)`.
//! The secret is handed to the client as a bearer credential and is opaque
//! to the gateway afterwards.

use rand::RngCore;

/// Random bytes mixed into each secret.
const SECRET_RANDOM_BYTES: usize = 24;

/// Mint a new session secret for `identity`.
pub fn mint_secret(identity: &str) -> String {
    mint_secret_at(identity, now_ms())
}

/// Milliseconds since the Unix epoch; 0 if the clock is before it.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn mint_secret_at(identity: &str, unix_ms: u64) -> String {
    let mut random = [0u8; SECRET_RANDOM_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut random);
    format!(
        "{}.{}.{}",
        hex::encode(identity.as_bytes()),
        hex::encode(unix_ms.to_be_bytes()),
        hex::encode(random)
    )
}

/// Generate a random public session ID (hex-encoded, 16 bytes = 32 hex chars).
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
