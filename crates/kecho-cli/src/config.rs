//! Client configuration at `~/.kecho/client.toml`.
//!
//! CLI flags always override config file values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port of the endpoint.
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket port of the endpoint.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// Transport preference: "tcp" or "ws".
    #[serde(default = "default_transport")]
    pub transport: String,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_port: default_ws_port(),
            transport: default_transport(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7407
}
fn default_ws_port() -> u16 {
    7408
}
fn default_transport() -> String {
    "tcp".to_string()
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load(path: &str) -> Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            debug!(path = %path.display(), "client config not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }
}
