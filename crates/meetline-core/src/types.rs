//! Core type definitions for Meetline
//!
//! Identifiers are opaque to the relay: it compares them, it never
//! interprets them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CONNECTION_ID_BYTES;

/// Identifies one live channel connection
///
/// Assigned by the relay when a peer connects and invalid once it
/// disconnects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh random identifier (16 hex chars)
    pub fn try_generate() -> Result<Self, getrandom::Error> {
        let mut bytes = [0u8; CONNECTION_ID_BYTES];
        getrandom::getrandom(&mut bytes)?;
        Ok(Self(hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for an empty identifier, which can never name a connection
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Meeting room identifier, as chosen by the web app
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single routed notification: tell `target` about `room`
///
/// Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invitation {
    pub room: RoomId,
    pub target: ConnectionId,
}

impl Invitation {
    pub fn new(room: RoomId, target: ConnectionId) -> Self {
        Self { room, target }
    }
}

/// The three signaling events relayed broadcast-except-sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::try_generate().unwrap();
        let id2 = ConnectionId::try_generate().unwrap();

        assert_eq!(id1.as_str().len(), CONNECTION_ID_BYTES * 2);
        assert!(id1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_connection_id_is_transparent_json() {
        let id = ConnectionId::from("abc123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
        assert!(ConnectionId::from("").is_empty());
    }

    #[test]
    fn test_blank_room_is_empty() {
        assert!(RoomId::new("   ").is_empty());
        assert!(!RoomId::new("abc123").is_empty());
    }

    #[test]
    fn test_signal_kind_names() {
        assert_eq!(SignalKind::Offer.to_string(), "offer");
        assert_eq!(SignalKind::Candidate.as_str(), "candidate");
    }
}
