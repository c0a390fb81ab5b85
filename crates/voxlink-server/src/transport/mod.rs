//! Transport adapters turning sockets into gateway channels.

pub mod websocket;

pub use websocket::{start_listener, WebSocketConnection, WsChannel};
