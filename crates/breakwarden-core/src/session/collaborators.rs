use std::sync::Arc;
use tokio::sync::mpsc;

use super::model::Session;
use crate::events::Event;
use crate::policy::{Mode, Phase};
use crate::streak::StreakState;

/// Receives finalized sessions and streak snapshots.
/// Called from the dispatcher thread, never from the transition path.
pub trait SessionStore: Send + Sync {
    fn save_session(&self, session: &Session) -> Result<(), Box<dyn std::error::Error>>;

    fn save_streaks(&self, _state: &StreakState) -> Result<(), Box<dyn std::error::Error>> {
        Ok(()) // default no-op
    }
}

/// Receives every lifecycle event, in order.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Audio, brightness and input-blocking hooks.
pub trait DeviceControl: Send + Sync {
    fn apply_phase_effects(&self, _mode: Mode, _phase: Phase) -> Result<(), Box<dyn std::error::Error>> {
        Ok(()) // default no-op
    }
}

/// Forwards events into a channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &Event) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event.clone());
    }
}

struct Silent;

impl SessionStore for Silent {
    fn save_session(&self, _session: &Session) -> Result<(), Box<dyn std::error::Error>> {
        Ok(())
    }
}

impl Notifier for Silent {
    fn notify(&self, _event: &Event) {}
}

impl DeviceControl for Silent {}

/// External collaborators a session runtime reports to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn SessionStore>,
    pub notifier: Arc<dyn Notifier>,
    pub device: Arc<dyn DeviceControl>,
}

impl Collaborators {
    /// Collaborators that discard everything.
    pub fn silent() -> Self {
        Self {
            store: Arc::new(Silent),
            notifier: Arc::new(Silent),
            device: Arc::new(Silent),
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: Arc<dyn DeviceControl>) -> Self {
        self.device = device;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
