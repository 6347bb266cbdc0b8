//! Subcommand implementations.

pub mod echo;
pub mod info;
pub mod repl;

use crate::client::EchoClient;
use anyhow::{Context, Result};

/// Where and how to reach the endpoint.
#[derive(Debug, Clone)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub websocket: bool,
}

impl Target {
    /// Open a new session on the endpoint.
    pub async fn connect(&self) -> Result<EchoClient> {
        let client = if self.websocket {
            EchoClient::connect_ws(&self.host, self.port).await
        } else {
            EchoClient::connect_tcp(&self.host, self.port).await
        };
        client.with_context(|| format!("failed to reach kecho at {}:{}", self.host, self.port))
    }
}
