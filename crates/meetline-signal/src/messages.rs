//! Signal channel messages
//!
//! Every frame is a JSON text message tagged by `event`. Signaling
//! payloads are carried as raw JSON and never inspected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use meetline_core::{ConnectionId, RoomId, SignalKind};

/// Events a peer sends to the relay
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Ask the relay to notify one peer about a room
    Invite {
        #[serde(default)]
        room: Option<RoomId>,
        #[serde(default, alias = "participantId")]
        participant_id: Option<ConnectionId>,
    },

    /// SDP offer
    Offer {
        #[serde(default)]
        payload: Value,
    },

    /// SDP answer
    Answer {
        #[serde(default)]
        payload: Value,
    },

    /// ICE candidate
    Candidate {
        #[serde(default)]
        payload: Value,
    },
}

/// Events the relay sends to peers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Sent once to a new peer with its own identifier
    Connected { connection_id: ConnectionId },

    /// Unicast result of an `invite`
    Invitation { room: RoomId },

    Offer { payload: Value },

    Answer { payload: Value },

    Candidate { payload: Value },
}

impl InboundEvent {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl OutboundEvent {
    /// Relay a signaling payload under its original event name
    pub fn signal(kind: SignalKind, payload: Value) -> Self {
        match kind {
            SignalKind::Offer => OutboundEvent::Offer { payload },
            SignalKind::Answer => OutboundEvent::Answer { payload },
            SignalKind::Candidate => OutboundEvent::Candidate { payload },
        }
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Payloads the relay refuses to forward: absent, `null`, or `""`
pub fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
