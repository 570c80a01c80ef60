//! Server configuration.
//!
//! Loaded from a TOML file; every field is optional:
//!
//! ```toml
//! bind_address = "127.0.0.1"
//! port = 9222
//! connection_policy = "refuse_new"   # or "replace_existing"
//! max_payload_size = 67108864
//!
//! [writer]
//! max_pending_messages = 1024
//! channel_capacity = 1024
//! backpressure_timeout_ms = 5000
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::Deserialize;

use crate::error::{DevToolsError, Result};
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::transport::ListenerOptions;
use crate::writer::WriterConfig;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9222;

/// What happens when a client connects while another one is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPolicy {
    /// Accept and immediately close the newcomer.
    #[default]
    RefuseNew,
    /// Drop the active connection in favour of the newcomer. Tools are not
    /// told that the previous client went away.
    ReplaceExisting,
}

/// Settings for the remote debugging server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Must be a loopback address.
    pub bind_address: IpAddr,
    /// `0` picks an ephemeral port.
    pub port: u16,
    pub connection_policy: ConnectionPolicy,
    /// Largest accepted `Content-Length`.
    pub max_payload_size: usize,
    pub writer: WriterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            connection_policy: ConnectionPolicy::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("Loading config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.bind_address.is_loopback() {
            return Err(DevToolsError::Config(format!(
                "bind_address must be a loopback address, got {}",
                self.bind_address
            )));
        }
        if self.max_payload_size == 0 {
            return Err(DevToolsError::Config(
                "max_payload_size must be greater than zero".to_string(),
            ));
        }
        if self.writer.channel_capacity == 0 || self.writer.max_pending_messages == 0 {
            return Err(DevToolsError::Config(
                "writer queue sizes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Listener settings derived from this config.
    pub fn listener_options(&self) -> ListenerOptions {
        ListenerOptions {
            policy: self.connection_policy,
            max_payload_size: self.max_payload_size,
            writer: self.writer.clone(),
        }
    }
}
