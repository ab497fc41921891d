//! Configuration system for Meetline
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/meetline/config.toml
//! - Linux: ~/.config/meetline/config.toml
//! - Windows: %APPDATA%/meetline/config.toml
//!
//! The relay binary layers CLI flags and environment variables on top.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::{DEFAULT_CORS_ORIGIN, DEFAULT_MEETING_BASE_URL, DEFAULT_PORT};

/// Environment variable holding the sender mailbox
pub const EMAIL_USER_ENV: &str = "EMAIL_USER";

/// Environment variable holding the sender credential
pub const EMAIL_PASS_ENV: &str = "EMAIL_PASS";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP/WebSocket listener settings
    pub server: ServerConfig,
    /// Outbound mail settings
    pub mail: MailConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address
    pub bind: IpAddr,
    /// Browser origin allowed by CORS
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// SMTP configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// SMTP relay host (STARTTLS)
    pub smtp_host: String,
    /// SMTP submission port
    pub smtp_port: u16,
    /// Sender address, also the SMTP username
    pub sender: Option<String>,
    /// SMTP password (an app password for Gmail)
    pub password: Option<String>,
    /// Base URL meeting links point at
    pub meeting_base_url: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            sender: None,
            password: None,
            meeting_base_url: DEFAULT_MEETING_BASE_URL.to_string(),
        }
    }
}

// Hand-written so the password never lands in logs.
impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("sender", &self.sender)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("meeting_base_url", &self.meeting_base_url)
            .finish()
    }
}

/// Sender identity for the SMTP transport
#[derive(Clone)]
pub struct MailCredentials {
    pub sender: String,
    pub password: String,
}

impl std::fmt::Debug for MailCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailCredentials")
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

impl MailConfig {
    /// Sender credentials, or an error naming the missing setting
    pub fn credentials(&self) -> Result<MailCredentials, ConfigError> {
        let sender = self
            .sender
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingCredentials(EMAIL_USER_ENV))?;
        let password = self
            .password
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingCredentials(EMAIL_PASS_ENV))?;

        Ok(MailCredentials {
            sender: sender.to_string(),
            password: password.to_string(),
        })
    }

    /// Link a recipient follows to join `room`
    pub fn meeting_link(&self, room: &str) -> String {
        format!("{}/meeting/{}", self.meeting_base_url.trim_end_matches('/'), room)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::Io(e.to_string()))?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "meetline", "meetline")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
