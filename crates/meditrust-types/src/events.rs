//! Event types pushed from the node to subscribers.

use serde::{Deserialize, Serialize};

/// Envelope for all node events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the node's emission order, starting at 1. A gap seen by
    /// a subscriber means it lagged and lost events.
    pub sequence: u64,
    pub event_type: EventType,
    pub timestamp: u64,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(
        sequence: u64,
        event_type: EventType,
        timestamp: u64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            sequence,
            event_type,
            timestamp,
            payload,
        }
    }
}

/// All event types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Node lifecycle
    NodeStarted,
    ChainVerified,

    // Identity
    UserRegistered,
    PatientConverted,

    // Ledger
    BlockAppended,

    // Approval workflow
    AccessRequestCreated,
    AccessRequestSigned,
    AccessRequestApproved,
}

impl EventType {
    /// Category used by subscription filters.
    pub const fn category(self) -> &'static str {
        match self {
            EventType::NodeStarted | EventType::ChainVerified => "system",
            EventType::UserRegistered | EventType::PatientConverted => "identity",
            EventType::BlockAppended => "ledger",
            EventType::AccessRequestCreated
            | EventType::AccessRequestSigned
            | EventType::AccessRequestApproved => "access",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_name() {
        let json = serde_json::to_string(&EventType::AccessRequestApproved).expect("serialize");
        assert_eq!(json, "\"access_request_approved\"");
    }

    #[test]
    fn test_categories() {
        assert_eq!(EventType::BlockAppended.category(), "ledger");
        assert_eq!(EventType::AccessRequestSigned.category(), "access");
        assert_eq!(EventType::PatientConverted.category(), "identity");
        assert_eq!(EventType::NodeStarted.category(), "system");
    }
}
