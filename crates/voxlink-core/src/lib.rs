//! voxlink-core: Shared protocol library for the voxlink gateway.
//!
//! Provides the JSON message envelope, operation codes and dispatch names,
//! connection close codes, session secret minting, and the abstract channel
//! traits the gateway core is written against.

pub mod channel;
pub mod close;
pub mod codec;
pub mod error;
pub mod messages;
pub mod secret;

// Re-export commonly used items at crate root.
pub use channel::{Acceptor, Channel};
pub use close::CloseCode;
pub use codec::{decode, encode};
pub use error::{GatewayError, GatewayResult};
pub use messages::{dispatch, Envelope, Op};
pub use secret::{generate_session_id, mint_secret, now_ms};
