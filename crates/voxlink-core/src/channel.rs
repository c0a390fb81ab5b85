//! Abstract transport traits for the gateway core.
//!
//! The core never touches sockets directly. A transport adapter wraps each
//! accepted connection in a [`Channel`] and hands the listener itself over
//! as an [`Acceptor`].

use crate::close::CloseCode;
use crate::error::GatewayResult;

/// One bidirectional message connection to a peer.
///
/// Both operations are fire-and-forget: implementations queue the frame and
/// return immediately.
pub trait Channel: Send + Sync {
    /// Queue a text frame for delivery.
    fn send_text(&self, text: String) -> GatewayResult<()>;

    /// Close the connection with `code`. Closing an already closed channel
    /// is a no-op.
    fn close(&self, code: CloseCode);

    /// Whether the channel can still carry frames.
    fn is_open(&self) -> bool;
}

/// The listener producing new channels.
pub trait Acceptor: Send + Sync {
    /// Stop accepting new connections.
    fn close(&self);
}
