//! Test doubles for channels and guild adapters.

use crate::session::GuildAdapter;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use voxlink_core::messages::{VoiceServerUpdate, VoiceStateUpdate};
use voxlink_core::{Channel, CloseCode, Envelope, GatewayError, GatewayResult};

/// Records every frame and close code.
#[derive(Default)]
pub struct MockChannel {
    sent: Mutex<Vec<String>>,
    closed_with: Mutex<Vec<CloseCode>>,
    closed: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Frames decoded back into envelopes.
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    /// First close code applied, if any.
    pub fn close_code(&self) -> Option<CloseCode> {
        self.closed_with.lock().unwrap().first().copied()
    }

    pub fn close_count(&self) -> usize {
        self.closed_with.lock().unwrap().len()
    }
}

impl Channel for MockChannel {
    fn send_text(&self, text: String) -> GatewayResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::Channel("channel closed".into()));
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&self, code: CloseCode) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closed_with.lock().unwrap().push(code);
        }
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

/// Counts calls; optionally fails on destroy.
#[derive(Default)]
pub struct MockAdapter {
    pub state_updates: Mutex<Vec<VoiceStateUpdate>>,
    pub server_updates: Mutex<Vec<VoiceServerUpdate>>,
    pub destroyed: AtomicUsize,
    fail_destroy: bool,
}

impl MockAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_destroy: true,
            ..Self::default()
        })
    }

    pub fn state_count(&self) -> usize {
        self.state_updates.lock().unwrap().len()
    }

    pub fn server_count(&self) -> usize {
        self.server_updates.lock().unwrap().len()
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl GuildAdapter for MockAdapter {
    fn on_voice_state_update(&self, update: &VoiceStateUpdate) {
        self.state_updates.lock().unwrap().push(update.clone());
    }

    fn on_voice_server_update(&self, update: &VoiceServerUpdate) {
        self.server_updates.lock().unwrap().push(update.clone());
    }

    fn destroy(&self) -> GatewayResult<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        if self.fail_destroy {
            Err(GatewayError::Other("adapter refused to die".into()))
        } else {
            Ok(())
        }
    }
}
