//! Event emission.
//!
//! Events are pushed from the node to subscribed connections as JSON-RPC
//! notifications. Each subscriber has an independent buffer; a subscriber
//! that falls behind loses the oldest events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use meditrust_types::{Event, EventType};

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Category filter: "system", "identity", "ledger", "access".
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    /// Only events about these patients.
    #[serde(default)]
    pub patient_ids: Option<Vec<String>>,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event_type: EventType, payload: serde_json::Value) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let event = Event::new(sequence, event_type, meditrust_types::unix_now(), payload);
        tracing::debug!(event = ?event.event_type, sequence, "event emitted");
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref categories) = self.categories {
            let category = event.event_type.category();
            if !categories.iter().any(|c| c == category) {
                return false;
            }
        }

        // Events without a patient id pass the patient filter.
        if let Some(ref patient_ids) = self.patient_ids {
            if let Some(pid) = event.payload.get("patient_id").and_then(|v| v.as_str()) {
                if !patient_ids.iter().any(|id| id == pid) {
                    return false;
                }
            }
        }

        true
    }
}
