use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::{SessionId, SpotId, UserId};

const CHANNEL_CAPACITY: usize = 256;

/// What the engine decides to tell a user. Delivery (email, SMS) is an
/// external collaborator's job; the hub only fans the decision out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    ReservationConfirmed {
        session_id: SessionId,
        spot_id: SpotId,
        start: DateTime<Utc>,
    },
    ReservationCancelled {
        session_id: SessionId,
        /// "user request" or "expired" — shown verbatim to the user.
        reason: String,
    },
    Extended {
        session_id: SessionId,
        added_hours: i64,
        new_end: DateTime<Utc>,
    },
    LatePickup {
        session_id: SessionId,
        estimated_end: DateTime<Utc>,
    },
    CodeRecovery {
        session_id: SessionId,
    },
}

/// Per-user notification fan-out. Fire-and-forget: sending never fails the
/// operation that produced the notice, and state is already committed by the
/// time a notice is dispatched.
pub struct NotifyHub {
    channels: DashMap<UserId, broadcast::Sender<Notice>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a user's notices. Creates the channel if needed.
    pub fn subscribe(&self, user_id: UserId) -> broadcast::Receiver<Notice> {
        let sender = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Dispatch a notice. No-op (beyond the log line) if nobody is listening.
    pub fn send(&self, user_id: UserId, notice: Notice) {
        tracing::info!(user_id, ?notice, "notification queued");
        metrics::counter!(crate::observability::NOTICES_TOTAL).increment(1);
        if let Some(sender) = self.channels.get(&user_id) {
            let _ = sender.send(notice);
        }
    }
}
