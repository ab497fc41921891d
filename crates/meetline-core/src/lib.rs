//! Meetline Core - Shared types, errors, and configuration
//!
//! This crate contains the foundational types used by the relay.
//! It has no dependencies on networking or mail code.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, MailConfig, MailCredentials, ServerConfig};
pub use error::*;
pub use types::*;

/// Default listening port for the relay
pub const DEFAULT_PORT: u16 = 5000;

/// Default browser origin allowed to call the relay
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

/// Default base URL of the web app that hosts meetings
pub const DEFAULT_MEETING_BASE_URL: &str = "http://localhost:3000";

/// Length of a connection identifier in random bytes
pub const CONNECTION_ID_BYTES: usize = 8;
