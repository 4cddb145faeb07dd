//! Configuration types for the relay control plane

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum length of a plain rendezvous address
pub const DEFAULT_MAX_ADDRESS_LENGTH: usize = 256;

/// Default time a relay leg may spend in `Connecting` before it is force-closed
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Server-wide configuration: one entry per signaling application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayServerConfig {
    /// Applications served by the signaling transport
    #[serde(default)]
    pub apps: Vec<RelayAppConfig>,

    /// Relay leg settings shared by every relay application
    #[serde(default)]
    pub peer: PeerConfig,
}

/// Configuration of one signaling application (one peer pool)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayAppConfig {
    /// Application name (used as the logging span name)
    pub name: String,

    /// URL path the application is served under
    #[serde(default = "default_path")]
    pub path: String,

    /// Allow several listeners on one plain address and mesh them together
    #[serde(default)]
    pub address_sharing: bool,

    /// Enable `_snd` / `_rec` relay semantics for this application
    #[serde(default)]
    pub relay: bool,

    /// Plain addresses longer than this are never available
    #[serde(default = "default_max_address_length")]
    pub max_address_length: usize,
}

/// Relay leg (peer connection state machine) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Time allowed to reach `Connected` before the leg is force-closed
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_max_address_length() -> usize {
    DEFAULT_MAX_ADDRESS_LENGTH
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

impl Default for RelayAppConfig {
    fn default() -> Self {
        Self {
            name: "relay".to_string(),
            path: default_path(),
            address_sharing: false,
            relay: false,
            max_address_length: DEFAULT_MAX_ADDRESS_LENGTH,
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl PeerConfig {
    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl RelayAppConfig {
    /// Create a relay-enabled application config
    pub fn relay(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relay: true,
            ..Default::default()
        }
    }

    /// Create a plain (non-relay) application config
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Enable or disable address sharing
    pub fn with_address_sharing(mut self, enabled: bool) -> Self {
        self.address_sharing = enabled;
        self
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, the path does not start with `/`
    /// or `max_address_length` is 0.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidConfig("app name must not be empty".to_string()));
        }
        if !self.path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "app path must start with '/', got '{}'",
                self.path
            )));
        }
        if self.max_address_length == 0 {
            return Err(Error::InvalidConfig(
                "max_address_length must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl RelayServerConfig {
    /// Parse a configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            Error::InvalidConfig(format!("Failed to parse relay server config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every application and the peer settings
    pub fn validate(&self) -> Result<()> {
        self.peer.validate()?;

        for app in &self.apps {
            app.validate()?;
        }

        for (i, app) in self.apps.iter().enumerate() {
            if self.apps[..i].iter().any(|other| other.path == app.path) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate app path '{}'",
                    app.path
                )));
            }
        }

        Ok(())
    }

    /// Find the application served under `path`
    pub fn app(&self, path: &str) -> Option<&RelayAppConfig> {
        self.apps.iter().find(|app| app.path == path)
    }
}
