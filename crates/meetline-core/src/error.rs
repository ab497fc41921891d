//! Error types for the Meetline relay

use thiserror::Error;

use crate::types::SignalKind;

/// Relay-level errors
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

impl From<getrandom::Error> for RelayError {
    fn from(e: getrandom::Error) -> Self {
        RelayError::Entropy(e.to_string())
    }
}

/// Why an inbound signaling frame was not relayed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("{0} event carried no payload")]
    EmptyPayload(SignalKind),

    #[error("invite carried no room")]
    EmptyRoom,
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("no configuration directory available")]
    NoConfigDir,

    #[error("missing mail credentials: set {0}")]
    MissingCredentials(&'static str),
}
