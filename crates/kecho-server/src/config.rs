//! Server configuration: TOML file + CLI overrides.

use kecho_core::{KechoError, KechoResult, MAX_PAYLOAD_SIZE};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub endpoint: EndpointSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    #[serde(default = "default_true")]
    pub websocket: bool,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            ws_port: default_ws_port(),
            websocket: true,
            max_sessions: default_max_sessions(),
            max_payload: default_max_payload(),
        }
    }
}

/// `[endpoint]` section: the identity the endpoint registers under.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSection {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_class")]
    pub class: String,
}

impl Default for EndpointSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            class: default_class(),
        }
    }
}

fn default_bind() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}
fn default_port() -> u16 {
    7407
}
fn default_ws_port() -> u16 {
    7408
}
fn default_true() -> bool {
    true
}
fn default_max_sessions() -> usize {
    64
}
fn default_max_payload() -> usize {
    MAX_PAYLOAD_SIZE
}
fn default_name() -> String {
    "echo".to_string()
}
fn default_class() -> String {
    "kecho".to_string()
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind: Option<IpAddr>,
    pub port: Option<u16>,
    pub ws_port: Option<u16>,
    pub no_websocket: bool,
    pub max_sessions: Option<usize>,
    pub max_payload: Option<usize>,
}

/// Resolved server configuration (file loaded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub ws_port: Option<u16>,
    pub max_sessions: usize,
    pub max_payload: usize,
    pub name: String,
    pub class: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_parts(ConfigFile::default(), &ConfigOverrides::default())
    }
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> KechoResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| KechoError::Other(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        let config = Self::from_parts(file_config, overrides);
        config.validate()?;
        Ok(config)
    }

    fn from_parts(file: ConfigFile, overrides: &ConfigOverrides) -> Self {
        let ws_port = if overrides.no_websocket || !file.server.websocket {
            None
        } else {
            Some(overrides.ws_port.unwrap_or(file.server.ws_port))
        };

        Self {
            bind: overrides.bind.unwrap_or(file.server.bind),
            port: overrides.port.unwrap_or(file.server.port),
            ws_port,
            max_sessions: overrides.max_sessions.unwrap_or(file.server.max_sessions),
            max_payload: overrides.max_payload.unwrap_or(file.server.max_payload),
            name: file.endpoint.name,
            class: file.endpoint.class,
        }
    }

    fn validate(&self) -> KechoResult<()> {
        if self.max_sessions == 0 {
            return Err(invalid("max_sessions must be at least 1"));
        }
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD_SIZE {
            return Err(invalid(&format!(
                "max_payload must be between 1 and {MAX_PAYLOAD_SIZE}"
            )));
        }
        // Port 0 asks the OS for an ephemeral port, so two zeros never clash.
        if self.port != 0 && self.ws_port == Some(self.port) {
            return Err(invalid("ws_port must differ from port"));
        }
        if self.name.is_empty() {
            return Err(invalid("endpoint name must not be empty"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> KechoError {
    KechoError::Other(format!("invalid config: {msg}"))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = ServerConfig::load(Some(&path), &ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.port, 7407);
        assert_eq!(cfg.ws_port, Some(7408));
        assert_eq!(cfg.max_payload, MAX_PAYLOAD_SIZE);
        assert_eq!(cfg.name, "echo");
        assert_eq!(cfg.class, "kecho");
    }

    #[test]
    fn file_values_are_read() {
        let file = write_config(
            r#"
[server]
bind = "0.0.0.0"
port = 9000
ws_port = 9001
max_sessions = 2
max_payload = 16

[endpoint]
name = "loop"
"#,
        );
        let cfg = ServerConfig::load(Some(file.path()), &ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.bind, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.ws_port, Some(9001));
        assert_eq!(cfg.max_sessions, 2);
        assert_eq!(cfg.max_payload, 16);
        assert_eq!(cfg.name, "loop");
        assert_eq!(cfg.class, "kecho");
    }

    #[test]
    fn cli_overrides_win() {
        let file = write_config("[server]\nport = 9000\nmax_sessions = 2\n");
        let overrides = ConfigOverrides {
            port: Some(9100),
            max_sessions: Some(10),
            no_websocket: true,
            ..Default::default()
        };
        let cfg = ServerConfig::load(Some(file.path()), &overrides).unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.max_sessions, 10);
        assert_eq!(cfg.ws_port, None);
    }

    #[test]
    fn websocket_can_be_disabled_in_file() {
        let file = write_config("[server]\nwebsocket = false\n");
        let cfg = ServerConfig::load(Some(file.path()), &ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.ws_port, None);
    }

    #[test]
    fn rejects_clashing_ports() {
        let overrides = ConfigOverrides {
            port: Some(9000),
            ws_port: Some(9000),
            ..Default::default()
        };
        assert!(ServerConfig::load(None, &overrides).is_err());
    }

    #[test]
    fn rejects_out_of_range_payload_limit() {
        for max_payload in [0, MAX_PAYLOAD_SIZE + 1] {
            let overrides = ConfigOverrides {
                max_payload: Some(max_payload),
                ..Default::default()
            };
            assert!(ServerConfig::load(None, &overrides).is_err());
        }
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let file = write_config("[server\nport = ");
        let err = ServerConfig::load(Some(file.path()), &ConfigOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("config parse error"));
    }
}
