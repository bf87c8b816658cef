//! Mode-change notifications for the UI collaborator.
//!
//! Each subscriber gets its own unbounded channel. Subscribers whose receiver
//! was dropped are pruned on the next emit.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Transition of the data source used by the session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeEvent {
    /// The backend became unreachable; operations now run against synthetic data.
    EnteredSynthetic,
    /// The backend answered again; operations are back on real data.
    Recovered,
}

impl ModeEvent {
    /// User-facing wording of the notice.
    pub fn message(self) -> &'static str {
        match self {
            Self::EnteredSynthetic => {
                "Backend unreachable. Showing demo data; changes are not saved to your account."
            }
            Self::Recovered => "Connection restored. Showing your real data again.",
        }
    }
}

/// One delivered notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub event: ModeEvent,
    pub message: &'static str,
    pub at: DateTime<Utc>,
}

type SubscriberMap = HashMap<u64, UnboundedSender<Notice>>;

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<SubscriberMap>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> (u64, UnboundedReceiver<Notice>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = unbounded_channel();
        self.subscribers.lock().insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn emit(&self, event: ModeEvent) {
        let notice = Notice {
            event,
            message: event.message(),
            at: Utc::now(),
        };

        let mut guard = self.subscribers.lock();
        guard.retain(|_, tx| tx.send(notice.clone()).is_ok());
    }
}
