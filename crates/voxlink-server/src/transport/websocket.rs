//! WebSocket listener using tokio-tungstenite.
//!
//! Captures the `client-id` and `authorization` upgrade headers, then wraps
//! every accepted socket in a [`WsChannel`] whose frames are written by a
//! dedicated writer task, so sends and closes never block the caller.

use crate::handshake::{ConnectionMeta, AUTHORIZATION_HEADER, CLIENT_ID_HEADER};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};
use voxlink_core::{Acceptor, Channel, CloseCode, GatewayError, GatewayResult};

pub type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
pub type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Maximum frame size accepted from clients (1 MiB).
const MAX_WS_FRAME_SIZE: usize = 1_048_576;

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
    pub meta: ConnectionMeta,
}

/// The running accept loop. Closing it stops new connections.
pub struct ListenerHandle {
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Acceptor for ListenerHandle {
    fn close(&self) {
        info!(addr = %self.local_addr, "WebSocket listener closed");
        self.task.abort();
    }
}

/// Start the WebSocket listener.
///
/// Returns the listener handle and a receiver that yields upgraded
/// connections. The receiver ends once the listener is closed.
pub async fn start_listener(
    bind_addr: &str,
) -> GatewayResult<(ListenerHandle, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| GatewayError::Transport(format!("WS bind failed on {bind_addr}: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    let task = tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match upgrade(stream, addr).await {
                            Ok(conn) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    });

    Ok((ListenerHandle { task, local_addr }, rx))
}

/// Perform the WebSocket upgrade, capturing the identity headers.
async fn upgrade(stream: TcpStream, remote_addr: SocketAddr) -> GatewayResult<WebSocketConnection> {
    let mut client_id = None;
    let mut authorization = None;

    let capture = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        client_id = header_value(req, CLIENT_ID_HEADER);
        authorization = header_value(req, AUTHORIZATION_HEADER);
        Ok(resp)
    };

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, capture)
        .await
        .map_err(|e| GatewayError::Transport(format!("WS upgrade failed: {e}")))?;

    Ok(WebSocketConnection {
        ws_stream,
        remote_addr,
        meta: ConnectionMeta {
            remote: Some(remote_addr.ip()),
            client_id,
            authorization,
        },
    })
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// [`Channel`] over one WebSocket connection.
///
/// Frames are queued on an unbounded channel drained by [`write_loop`].
/// A server-side close also wakes whoever is waiting in [`WsChannel::closed`].
pub struct WsChannel {
    tx: mpsc::UnboundedSender<Message>,
    open: AtomicBool,
    closing: Notify,
}

impl WsChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            tx,
            open: AtomicBool::new(true),
            closing: Notify::new(),
        };
        (channel, rx)
    }

    /// Record that the peer went away without a server-initiated close.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Resolves once the channel has been closed from the server side.
    pub async fn closed(&self) {
        if !self.is_open() {
            return;
        }
        self.closing.notified().await;
    }
}

impl Channel for WsChannel {
    fn send_text(&self, text: String) -> GatewayResult<()> {
        if !self.is_open() {
            return Err(GatewayError::Channel("channel closed".into()));
        }
        self.tx
            .send(Message::Text(text))
            .map_err(|_| GatewayError::Channel("writer task gone".into()))
    }

    fn close(&self, code: CloseCode) {
        if self.open.swap(false, Ordering::AcqRel) {
            let frame = CloseFrame {
                code: WsCloseCode::from(code.code()),
                reason: code.reason().into(),
            };
            let _ = self.tx.send(Message::Close(Some(frame)));
            // notify_one keeps a permit, so a reader that arrives late still wakes.
            self.closing.notify_one();
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Drain queued frames into the socket until a close frame is written or
/// every sender is gone.
pub async fn write_loop(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if let Err(e) = sink.send(msg).await {
            debug!(error = %e, "WebSocket write failed");
            break;
        }
        if is_close {
            break;
        }
    }
}

/// Receive the next data frame as raw bytes.
///
/// Returns `None` once the peer closed or the socket failed. Text and binary
/// frames are both returned; oversized frames end the connection.
pub async fn recv_frame(stream: &mut WsSource) -> Option<Vec<u8>> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return check_size(text.into_bytes()),
            Some(Ok(Message::Binary(data))) => return check_size(data),
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "WebSocket closed by peer");
                return None;
            }
            // Pings are answered by tungstenite itself.
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(error = %e, "WebSocket recv failed");
                return None;
            }
            None => return None,
        }
    }
}

fn check_size(data: Vec<u8>) -> Option<Vec<u8>> {
    if data.len() > MAX_WS_FRAME_SIZE {
        warn!(size = data.len(), max = MAX_WS_FRAME_SIZE, "WS frame too large");
        return None;
    }
    Some(data)
}
