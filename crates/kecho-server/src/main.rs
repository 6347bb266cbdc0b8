//! kecho-server: per-session echo endpoint.
//!
//! Every accepted TCP or WebSocket connection gets its own session buffer.
//! A write replaces the buffered payload and reads drain it back.

mod config;
mod connection;
mod endpoint;
mod registry;
mod transport;

use clap::Parser;
use config::{ConfigOverrides, ServerConfig};
use endpoint::Endpoint;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{error, info};

/// kecho-server — per-session echo endpoint
#[derive(Parser, Debug)]
#[command(name = "kecho-server", version, about = "Per-session echo endpoint")]
struct Cli {
    /// Address to bind both listeners on
    #[arg(long)]
    bind: Option<IpAddr>,

    /// TCP listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// WebSocket listen port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Disable the WebSocket listener
    #[arg(long)]
    no_websocket: bool,

    /// Maximum concurrent sessions
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Largest payload a single write may install, in bytes
    #[arg(long)]
    max_payload: Option<usize>,

    /// Config file path
    #[arg(long, default_value = "~/.kecho/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting kecho-server");

    let overrides = ConfigOverrides {
        bind: cli.bind,
        port: cli.port,
        ws_port: cli.ws_port,
        no_websocket: cli.no_websocket,
        max_sessions: cli.max_sessions,
        max_payload: cli.max_payload,
    };
    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(Some(&config_path), &overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let mut endpoint = match Endpoint::register(server_config).await {
        Ok(ep) => ep,
        Err(e) => {
            error!(error = %e, "failed to register endpoint");
            std::process::exit(1);
        }
    };

    info!(
        tcp = %endpoint.tcp_addr(),
        ws = ?endpoint.ws_addr(),
        "kecho-server ready"
    );

    let mut failed = false;
    tokio::select! {
        result = endpoint.run() => {
            if let Err(e) = result {
                error!(error = %e, "endpoint error");
                failed = true;
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    endpoint.unregister().await;
    info!("kecho-server stopped");
    if failed {
        std::process::exit(1);
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
