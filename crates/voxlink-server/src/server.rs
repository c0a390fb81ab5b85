//! Core server: admits connections, drives the handshake and dispatches
//! messages to client sessions.
//!
//! Owns the client registry, the set of open channels, the listener handle
//! and the event sink. Coordinates the lifecycle of every connection.

use crate::config::ServerConfig;
use crate::events::{Event, EventKind, EventSink, TracingSink};
use crate::handshake::{self, ConnectionMeta, GatewaySession, HandshakeState};
use crate::registry::ClientRegistry;
use crate::session::ClientSession;
use crate::transport::websocket;
use crate::transport::{WebSocketConnection, WsChannel};
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use voxlink_core::messages::{dispatch, VoiceServerUpdate, VoiceStateUpdate};
use voxlink_core::{codec, mint_secret, now_ms, Acceptor, Channel, CloseCode, Envelope};

/// How long a finished connection waits for its writer to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// The voxlink gateway instance.
pub struct GatewayServer {
    config: ServerConfig,
    registry: ClientRegistry,
    /// Every admitted connection that has not run its close handler yet.
    connections: RwLock<HashMap<u64, Arc<dyn Channel>>>,
    acceptor: Mutex<Option<Box<dyn Acceptor>>>,
    events: Arc<dyn EventSink>,
    next_conn_id: AtomicU64,
}

impl GatewayServer {
    /// Create a new server instance.
    pub fn new(config: ServerConfig, acceptor: Option<Box<dyn Acceptor>>) -> Self {
        if config.password.is_empty() {
            warn!("no password configured, any client may connect");
        }
        if !config.blocked.is_empty() {
            info!(count = config.blocked.len(), "loaded blocked addresses");
        }

        Self {
            config,
            registry: ClientRegistry::new(),
            connections: RwLock::new(HashMap::new()),
            acceptor: Mutex::new(acceptor),
            events: Arc::new(TracingSink),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Replace the event sink.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Access the client registry.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Number of admitted connections still open.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    // ── Connection lifecycle ───────────────────────────────────────────

    /// Admit a freshly accepted channel.
    ///
    /// Returns the connection context on success. On rejection the channel
    /// has already been closed with the matching code.
    pub async fn accept(
        &self,
        channel: Arc<dyn Channel>,
        meta: ConnectionMeta,
    ) -> Option<GatewaySession> {
        let identity = match handshake::admit(&meta, &self.config) {
            Ok(identity) => identity,
            Err(code) => {
                info!(remote = ?meta.remote, %code, "connection rejected");
                channel.close(code);
                self.emit(EventKind::rejected(meta.remote, code));
                return None;
            }
        };

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);

        // Takeover: the displaced peer hears about it before the new one gets HELLO.
        if let Some(existing) = self.registry.get(&identity).await {
            if existing.channel().is_open() {
                info!(identity = %identity, old_conn_id = existing.conn_id, conn_id, "session taken over");
                existing.channel().close(CloseCode::SessionExpired);
                self.emit(EventKind::SessionTakeover {
                    identity: identity.clone(),
                    old_conn_id: existing.conn_id,
                    conn_id,
                });
            }
        }

        self.connections
            .write()
            .await
            .insert(conn_id, channel.clone());

        let mut session = GatewaySession::new(conn_id, identity, meta.remote, channel);
        self.send(session.channel.as_ref(), &Envelope::hello(now_ms()));
        session.state = HandshakeState::HelloSent;

        info!(conn_id, identity = %session.identity, remote = ?session.remote, "connection accepted");
        self.emit(EventKind::ConnectionAccepted {
            conn_id,
            identity: session.identity.clone(),
            remote: session.remote,
        });

        Some(session)
    }

    /// Handle one inbound frame on an admitted connection.
    ///
    /// Frames arriving after the channel was closed are discarded.
    pub async fn dispatch(&self, session: &mut GatewaySession, raw: &[u8]) {
        if !session.channel.is_open() {
            debug!(conn_id = session.conn_id, "frame on closed channel discarded");
            return;
        }

        let envelope = match codec::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(conn_id = session.conn_id, error = %e, "undecodable frame");
                self.terminate(session, CloseCode::DecodeError);
                return;
            }
        };

        if envelope.is_identify() {
            self.identify(session).await;
            return;
        }

        let client = match self.registry.get(&session.identity).await {
            Some(client) if client.conn_id == session.conn_id => client,
            _ => {
                self.terminate(session, CloseCode::NotIdentified);
                return;
            }
        };

        match envelope.t.as_deref() {
            Some(dispatch::VOICE_STATE_UPDATE) => {
                self.route_voice_state(session, &client, &envelope).await
            }
            Some(dispatch::VOICE_SERVER_UPDATE) => {
                self.route_voice_server(session, &client, &envelope).await
            }
            other => {
                debug!(conn_id = session.conn_id, t = ?other, "ignoring message");
            }
        }
    }

    /// Close handler: tear down the session this connection installed.
    pub async fn on_close(&self, session: &GatewaySession) {
        self.connections.write().await.remove(&session.conn_id);

        let guilds_killed = match self
            .registry
            .remove_owned(&session.identity, session.conn_id)
            .await
        {
            Some(client) => client.teardown().await,
            None => 0,
        };

        info!(conn_id = session.conn_id, identity = %session.identity, guilds_killed, "connection closed");
        self.emit(EventKind::Closed {
            conn_id: session.conn_id,
            identity: session.identity.clone(),
            guilds_killed,
        });
    }

    /// Serialize `payload` and queue it on `channel`.
    ///
    /// Failures are reported as events and never returned.
    pub fn send<T: Serialize>(&self, channel: &dyn Channel, payload: &T) {
        let result = codec::encode(payload).and_then(|text| channel.send_text(text));
        if let Err(e) = result {
            debug!(error = %e, "send failed");
            self.emit(EventKind::SendFailed {
                error: e.to_string(),
            });
        }
    }

    /// Close every open channel, stop the listener and clear the registry.
    pub async fn shutdown(&self) {
        let channels: Vec<Arc<dyn Channel>> = self
            .connections
            .write()
            .await
            .drain()
            .map(|(_, channel)| channel)
            .collect();

        let mut connections_closed = 0;
        for channel in channels {
            if channel.is_open() {
                channel.close(CloseCode::ServerClosed);
                connections_closed += 1;
            }
        }

        let acceptor = self.acceptor.lock().ok().and_then(|mut a| a.take());
        if let Some(acceptor) = acceptor {
            acceptor.close();
        }

        for client in self.registry.drain().await {
            client.teardown().await;
        }

        info!(connections_closed, "gateway shut down");
        self.emit(EventKind::ShutDown { connections_closed });
    }

    // ── Dispatch helpers ───────────────────────────────────────────────

    async fn identify(&self, session: &mut GatewaySession) {
        let secret = mint_secret(&session.identity);
        let client = Arc::new(ClientSession::new(
            session.identity.clone(),
            session.conn_id,
            session.channel.clone(),
            secret,
            self.config.status_interval,
        ));

        if self.registry.try_insert(client.clone()).await.is_err() {
            self.terminate(session, CloseCode::AlreadyConnected);
            return;
        }

        session.state = HandshakeState::Identified;
        self.send(
            session.channel.as_ref(),
            &Envelope::ready(&client.id, client.secret()),
        );
        client.start_status_updates();

        info!(conn_id = session.conn_id, identity = %session.identity, session_id = %client.id, "client identified");
        self.emit(EventKind::Identified {
            conn_id: session.conn_id,
            identity: session.identity.clone(),
            client_id: client.id.clone(),
        });
    }

    async fn route_voice_state(
        &self,
        session: &GatewaySession,
        client: &ClientSession,
        envelope: &Envelope,
    ) {
        let message_type = dispatch::VOICE_STATE_UPDATE;
        let Some(update) = envelope.data::<VoiceStateUpdate>() else {
            return self.drop_message(session, message_type, "malformed payload");
        };
        let (Some(guild_id), Some(_)) = (non_empty(&update.guild_id), non_empty(&update.session_id))
        else {
            return self.drop_message(session, message_type, "missing guild or session id");
        };
        if update.user_id.as_deref() != Some(session.identity.as_str()) {
            return self.drop_message(session, message_type, "user id does not match identity");
        }

        match client.adapter(guild_id).await {
            Some(adapter) => {
                adapter.on_voice_state_update(&update);
                self.routed(session, message_type, guild_id);
            }
            None => self.drop_message(session, message_type, "no adapter for guild"),
        }
    }

    async fn route_voice_server(
        &self,
        session: &GatewaySession,
        client: &ClientSession,
        envelope: &Envelope,
    ) {
        let message_type = dispatch::VOICE_SERVER_UPDATE;
        let Some(update) = envelope.data::<VoiceServerUpdate>() else {
            return self.drop_message(session, message_type, "malformed payload");
        };
        let Some(guild_id) = non_empty(&update.guild_id) else {
            return self.drop_message(session, message_type, "missing guild id");
        };

        match client.adapter(guild_id).await {
            Some(adapter) => {
                adapter.on_voice_server_update(&update);
                self.routed(session, message_type, guild_id);
            }
            None => self.drop_message(session, message_type, "no adapter for guild"),
        }
    }

    fn routed(&self, session: &GatewaySession, message_type: &str, guild_id: &str) {
        debug!(identity = %session.identity, message_type, guild_id, "message routed");
        self.emit(EventKind::Routed {
            identity: session.identity.clone(),
            message_type: message_type.to_string(),
            guild_id: guild_id.to_string(),
        });
    }

    fn drop_message(&self, session: &GatewaySession, message_type: &str, reason: &'static str) {
        debug!(identity = %session.identity, message_type, reason, "message dropped");
        self.emit(EventKind::Dropped {
            identity: session.identity.clone(),
            message_type: message_type.to_string(),
            reason,
        });
    }

    /// Close an admitted connection for a protocol violation.
    fn terminate(&self, session: &GatewaySession, code: CloseCode) {
        info!(conn_id = session.conn_id, identity = %session.identity, %code, "terminating connection");
        session.channel.close(code);
        self.emit(EventKind::terminated(session.conn_id, &session.identity, code));
    }

    /// Deliver an event to the sink. A panicking sink is contained here.
    fn emit(&self, kind: EventKind) {
        let event = Event::now(kind);
        let sink = &self.events;
        if std::panic::catch_unwind(AssertUnwindSafe(|| sink.emit(&event))).is_err() {
            warn!("event sink panicked");
        }
    }

    // ── WebSocket serving ──────────────────────────────────────────────

    /// Serve connections from the listener until it closes.
    pub async fn run(self: Arc<Self>, mut incoming: mpsc::Receiver<WebSocketConnection>) {
        info!(
            addr = %self.config.listen_addr(),
            auth = !self.config.password.is_empty(),
            status_interval_secs = self.config.status_interval.as_secs(),
            "voxlink gateway ready"
        );

        while let Some(conn) = incoming.recv().await {
            let srv = self.clone();
            tokio::spawn(async move {
                srv.handle_websocket(conn).await;
            });
        }

        info!("listener closed, no longer accepting connections");
    }

    /// Drive one WebSocket connection from admission to close.
    async fn handle_websocket(&self, conn: WebSocketConnection) {
        let WebSocketConnection {
            ws_stream,
            remote_addr,
            meta,
        } = conn;
        let (sink, mut stream) = ws_stream.split();
        let (channel, outgoing) = WsChannel::new();
        let channel = Arc::new(channel);
        let mut writer = tokio::spawn(websocket::write_loop(sink, outgoing));

        let Some(mut session) = self.accept(channel.clone(), meta).await else {
            drop(channel);
            if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
                writer.abort();
            }
            return;
        };

        // A close from our side (takeover, protocol error, shutdown) ends the
        // loop without waiting for the peer to acknowledge it.
        loop {
            let frame = tokio::select! {
                frame = websocket::recv_frame(&mut stream) => frame,
                _ = channel.closed() => None,
            };
            let Some(frame) = frame else { break };
            self.dispatch(&mut session, &frame).await;
        }

        channel.mark_closed();
        self.on_close(&session).await;
        debug!(remote = %remote_addr, conn_id = session.conn_id, "WebSocket connection finished");

        drop(session);
        drop(channel);
        if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            writer.abort();
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
