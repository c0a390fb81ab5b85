//! Per-identity client session.
//!
//! A session is created when a connection identifies and lives until that
//! connection closes. It owns the peer's channel, the bearer secret issued
//! in READY, and the guild adapters registered by the voice subsystem.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voxlink_core::messages::{StatusPayload, VoiceServerUpdate, VoiceStateUpdate};
use voxlink_core::{encode, generate_session_id, Channel, Envelope, GatewayResult, Op};

/// Per-guild handler owned by the voice subsystem.
pub trait GuildAdapter: Send + Sync {
    fn on_voice_state_update(&self, update: &VoiceStateUpdate);

    fn on_voice_server_update(&self, update: &VoiceServerUpdate);

    /// Release everything the adapter holds for its guild.
    fn destroy(&self) -> GatewayResult<()>;
}

pub struct ClientSession {
    /// Public session identifier sent in READY.
    pub id: String,
    pub identity: String,
    /// Connection that installed this session.
    pub conn_id: u64,
    secret: String,
    channel: Arc<dyn Channel>,
    status_interval: Duration,
    created_at: Instant,
    subscriptions: RwLock<HashMap<String, Arc<dyn GuildAdapter>>>,
    status_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientSession {
    pub fn new(
        identity: String,
        conn_id: u64,
        channel: Arc<dyn Channel>,
        secret: String,
        status_interval: Duration,
    ) -> Self {
        Self {
            id: generate_session_id(),
            identity,
            conn_id,
            secret,
            channel,
            status_interval,
            created_at: Instant::now(),
            subscriptions: RwLock::new(HashMap::new()),
            status_task: Mutex::new(None),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Register the adapter for `guild_id`, returning the one it replaced.
    pub async fn subscribe(
        &self,
        guild_id: String,
        adapter: Arc<dyn GuildAdapter>,
    ) -> Option<Arc<dyn GuildAdapter>> {
        self.subscriptions.write().await.insert(guild_id, adapter)
    }

    /// Remove the adapter for `guild_id` without destroying it.
    pub async fn unsubscribe(&self, guild_id: &str) -> Option<Arc<dyn GuildAdapter>> {
        self.subscriptions.write().await.remove(guild_id)
    }

    pub async fn adapter(&self, guild_id: &str) -> Option<Arc<dyn GuildAdapter>> {
        self.subscriptions.read().await.get(guild_id).cloned()
    }

    pub async fn guild_ids(&self) -> Vec<String> {
        self.subscriptions.read().await.keys().cloned().collect()
    }

    /// Remove and destroy the adapter for `guild_id`.
    ///
    /// Returns `Ok(false)` when no adapter was registered for the guild.
    pub async fn kill(&self, guild_id: &str) -> GatewayResult<bool> {
        let adapter = self.subscriptions.write().await.remove(guild_id);
        match adapter {
            Some(adapter) => {
                adapter.destroy()?;
                debug!(identity = %self.identity, guild_id, "guild adapter killed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop status updates and kill every guild adapter.
    ///
    /// A failing kill is logged and the remaining guilds are still attempted.
    /// Returns the number of guilds that were attempted.
    pub async fn teardown(&self) -> usize {
        self.stop_status_updates();

        let guilds = self.guild_ids().await;
        for guild_id in &guilds {
            if let Err(e) = self.kill(guild_id).await {
                warn!(identity = %self.identity, guild_id = %guild_id, error = %e, "guild teardown failed");
            }
        }

        info!(identity = %self.identity, session_id = %self.id, guilds = guilds.len(), "session torn down");
        guilds.len()
    }

    pub async fn status(&self) -> StatusPayload {
        StatusPayload {
            client_id: self.id.clone(),
            guilds: self.subscriptions.read().await.len(),
            uptime_ms: self.created_at.elapsed().as_millis() as u64,
        }
    }

    /// Spawn the STATUS ticker. Does nothing when the interval is zero.
    ///
    /// The ticker holds only a weak reference and exits once the session is
    /// dropped or its channel closes.
    pub fn start_status_updates(self: &Arc<Self>) {
        if self.status_interval.is_zero() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.status_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(session) = weak.upgrade() else { break };
                if !session.channel.is_open() {
                    break;
                }
                let status = Envelope::control(Op::Status, &session.status().await);
                match status.and_then(|status| encode(&status)) {
                    Ok(text) => {
                        if let Err(e) = session.channel.send_text(text) {
                            debug!(identity = %session.identity, error = %e, "status send failed");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "status encode failed"),
                }
            }
        });

        if let Ok(mut task) = self.status_task.lock() {
            if let Some(previous) = task.replace(handle) {
                previous.abort();
            }
        }
    }

    fn stop_status_updates(&self) {
        if let Ok(mut task) = self.status_task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("conn_id", &self.conn_id)
            .finish_non_exhaustive()
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.stop_status_updates();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockAdapter, MockChannel};

    fn session(channel: Arc<MockChannel>, interval: Duration) -> Arc<ClientSession> {
        Arc::new(ClientSession::new(
            "abc".into(),
            1,
            channel,
            "s.e.cret".into(),
            interval,
        ))
    }

    #[tokio::test]
    async fn subscribe_and_lookup() {
        let s = session(MockChannel::new(), Duration::ZERO);
        let adapter = MockAdapter::new();
        assert!(s.subscribe("g1".into(), adapter.clone()).await.is_none());
        assert!(s.adapter("g1").await.is_some());
        assert!(s.adapter("g2").await.is_none());
        assert!(s.unsubscribe("g1").await.is_some());
        assert!(s.adapter("g1").await.is_none());
        assert_eq!(adapter.destroy_count(), 0);
    }

    #[tokio::test]
    async fn kill_removes_and_destroys() {
        let s = session(MockChannel::new(), Duration::ZERO);
        let adapter = MockAdapter::new();
        s.subscribe("g1".into(), adapter.clone()).await;
        assert!(s.kill("g1").await.unwrap());
        assert!(!s.kill("g1").await.unwrap());
        assert_eq!(adapter.destroy_count(), 1);
    }

    #[tokio::test]
    async fn teardown_continues_past_failures() {
        let s = session(MockChannel::new(), Duration::ZERO);
        let bad = MockAdapter::failing();
        let good1 = MockAdapter::new();
        let good2 = MockAdapter::new();
        s.subscribe("bad".into(), bad.clone()).await;
        s.subscribe("g1".into(), good1.clone()).await;
        s.subscribe("g2".into(), good2.clone()).await;

        assert_eq!(s.teardown().await, 3);
        assert_eq!(bad.destroy_count(), 1);
        assert_eq!(good1.destroy_count(), 1);
        assert_eq!(good2.destroy_count(), 1);
        assert!(s.guild_ids().await.is_empty());
    }

    #[tokio::test]
    async fn status_reports_guild_count() {
        let s = session(MockChannel::new(), Duration::ZERO);
        s.subscribe("g1".into(), MockAdapter::new()).await;
        let status = s.status().await;
        assert_eq!(status.client_id, s.id);
        assert_eq!(status.guilds, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn status_ticker_sends_until_teardown() {
        let channel = MockChannel::new();
        let s = session(channel.clone(), Duration::from_secs(5));
        s.start_status_updates();

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        tokio::task::yield_now().await;
        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].op(), Some(Op::Status));

        s.teardown().await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn zero_interval_disables_status() {
        let s = session(MockChannel::new(), Duration::ZERO);
        s.start_status_updates();
        assert!(s.status_task.lock().unwrap().is_none());
    }
}
