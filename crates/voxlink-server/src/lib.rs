//! voxlink-server: voice gateway session manager.
//!
//! Accepts WebSocket connections from bot clients, runs the HELLO/IDENTIFY/READY
//! handshake, and routes voice state and voice server updates to the guild
//! adapters the voice subsystem registers on each client session.
//!
//! # Registering a guild adapter
//!
//! ```no_run
//! use std::sync::Arc;
//! use voxlink_core::messages::{VoiceServerUpdate, VoiceStateUpdate};
//! use voxlink_core::GatewayResult;
//! use voxlink_server::{GatewayServer, GuildAdapter};
//!
//! struct Player;
//!
//! impl GuildAdapter for Player {
//!     fn on_voice_state_update(&self, _update: &VoiceStateUpdate) {}
//!
//!     fn on_voice_server_update(&self, update: &VoiceServerUpdate) {
//!         println!("voice endpoint: {:?}", update.endpoint);
//!     }
//!
//!     fn destroy(&self) -> GatewayResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example(server: &GatewayServer) {
//! if let Some(client) = server.registry().get("bot-123").await {
//!     client.subscribe("guild-1".into(), Arc::new(Player)).await;
//! }
//! # }
//! ```

pub mod config;
pub mod events;
pub mod handshake;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export primary public types.
pub use config::{Overrides, ServerConfig};
pub use events::{Event, EventKind, EventSink, MemorySink, TracingSink};
pub use registry::ClientRegistry;
pub use server::GatewayServer;
pub use session::{ClientSession, GuildAdapter};
