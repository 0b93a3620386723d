use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::event_types::MarketEvent;

const BUS_CAPACITY: usize = 1024;

/// A [`MarketEvent`] as delivered to subscribers, stamped with its session
/// and position on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: String,
    pub session_id: Option<String>,
    pub seq: i64,
    pub category: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: String,
}

pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
    seq: AtomicI64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            tx,
            seq: AtomicI64::new(0),
        }
    }

    /// Stamp `event` for `session_id` and broadcast it. Events emitted while
    /// nobody is subscribed are dropped; the stamped event is still returned.
    pub fn emit(&self, event: &MarketEvent, session_id: Option<String>) -> BusEvent {
        let stamped = BusEvent {
            id: Uuid::new_v4().to_string(),
            session_id,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            category: event.category().to_string(),
            event_type: event.event_type().to_string(),
            payload: event.to_payload(),
            created_at: Utc::now().to_rfc3339(),
        };
        if let Err(e) = self.tx.send(stamped.clone()) {
            tracing::debug!("{} dropped (no receivers): {e}", stamped.event_type);
        }
        stamped
    }

    /// Get a new receiver for this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}
