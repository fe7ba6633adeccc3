// src/config.rs

//! Manages server configuration: loading, resolving defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Per-connection settings shared by the TCP and WebSocket listeners.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConnectionConfig {
    /// Close a connection that sends nothing for this long. Unset disables it.
    #[serde(default, with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    /// The longest accepted inbound frame, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Capacity of each connection's outbound queue, in frames.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_max_frame_bytes() -> usize {
    64 * 1024
}
fn default_outbound_buffer() -> usize {
    256
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            max_frame_bytes: default_max_frame_bytes(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// Configuration for the WebSocket listener used by browsers and capture devices.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WebSocketConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ws_port")]
    pub port: u16,
    /// The HTTP path the upgrade is served on.
    #[serde(default = "default_ws_path")]
    pub path: String,
}

fn default_true() -> bool {
    true
}
fn default_ws_port() -> u16 {
    8080
}
fn default_ws_path() -> String {
    "/".to_string()
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_ws_port(),
            path: default_ws_path(),
        }
    }
}

/// Behavior of the relay itself.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RelayConfig {
    /// Reply to producers with a `posture_data_update` after each persisted measurement.
    #[serde(default = "default_true")]
    pub persistence_ack: bool,
    /// Send a `connection_response` greeting as soon as a socket is accepted.
    #[serde(default = "default_true")]
    pub greet_on_connect: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            persistence_ack: true,
            greet_on_connect: true,
        }
    }
}

/// Which account store backs persistence.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
}

/// An account created at startup if it does not already exist.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SeedAccount {
    pub name: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// The accounts document used by the `file` backend.
    #[serde(default = "default_storage_path")]
    pub path: String,
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
}

fn default_storage_path() -> String {
    "posture_relay_data/accounts.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
            accounts: Vec::new(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9464
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default)]
    connection: ConnectionConfig,
    #[serde(default)]
    websocket: WebSocketConfig,
    #[serde(default)]
    relay: RelayConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7979
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}

/// Represents the final, validated server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    /// Port of the line-delimited JSON listener.
    pub port: u16,
    pub log_level: String,
    pub max_clients: usize,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            connection: ConnectionConfig::default(),
            websocket: WebSocketConfig::default(),
            relay: RelayConfig::default(),
            storage: StorageConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates the configuration at `path`.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse configuration TOML")?;

        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            log_level: raw_config.log_level,
            max_clients: raw_config.max_clients,
            connection: raw_config.connection,
            websocket: raw_config.websocket,
            relay: raw_config.relay,
            storage: raw_config.storage,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.connection.outbound_buffer == 0 {
            return Err(anyhow!("connection.outbound_buffer cannot be 0"));
        }
        if self.connection.max_frame_bytes < 64 {
            return Err(anyhow!("connection.max_frame_bytes must be at least 64"));
        }
        if let Some(timeout) = self.connection.idle_timeout
            && timeout.is_zero()
        {
            return Err(anyhow!(
                "connection.idle_timeout cannot be 0; omit it to disable idle timeouts"
            ));
        }

        if self.websocket.enabled {
            if self.websocket.port == 0 {
                return Err(anyhow!("websocket.port cannot be 0"));
            }
            if self.websocket.port == self.port {
                return Err(anyhow!(
                    "websocket.port cannot be the same as the main server port"
                ));
            }
            if !self.websocket.path.starts_with('/') {
                return Err(anyhow!("websocket.path must start with '/'"));
            }
        }

        if self.storage.backend == StorageBackend::File && self.storage.path.trim().is_empty() {
            return Err(anyhow!(
                "storage.path cannot be empty when the file backend is selected"
            ));
        }
        if self.storage.backend == StorageBackend::Memory && self.storage.accounts.is_empty() {
            warn!(
                "Using the in-memory account store with no seeded accounts; every persisted reading will report an unknown user."
            );
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port
                || (self.websocket.enabled && self.metrics.port == self.websocket.port)
            {
                return Err(anyhow!(
                    "metrics.port cannot be the same as a relay listener port"
                ));
            }
        }
        Ok(())
    }
}
