//! kecho — client for a kecho endpoint.
//!
//! Each invocation opens one session: what it writes can only be read back
//! on that same connection.

mod client;
mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::Target;
use tracing::error;

/// kecho — per-session echo client
#[derive(Parser)]
#[command(name = "kecho", version, about = "Client for a kecho per-session echo endpoint")]
struct Cli {
    /// Endpoint host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Endpoint port (TCP, or WebSocket with --ws)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Connect over WebSocket instead of TCP
    #[arg(long, global = true)]
    ws: bool,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write TEXT (or stdin) once, then read it back
    Echo {
        /// Payload to write; read from stdin when omitted
        text: Option<String>,

        /// Bytes requested per read
        #[arg(long, default_value_t = 4096)]
        chunk: usize,
    },

    /// Describe the endpoint
    Info,

    /// Drive one session interactively from stdin
    Repl,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("kecho=debug,kecho_cli=debug,kecho_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("kecho=warn,kecho_cli=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.clone().unwrap_or_else(|| {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".kecho").join("client.toml").to_string_lossy().to_string()
    });
    let cfg = match config::Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "ignoring unreadable client config");
            config::Config::default()
        }
    };

    // CLI overrides config.
    let websocket = cli.ws || cfg.default.transport == "ws";
    let default_port = if websocket {
        cfg.default.ws_port
    } else {
        cfg.default.port
    };
    let target = Target {
        host: cli.host.unwrap_or(cfg.default.host),
        port: cli.port.unwrap_or(default_port),
        websocket,
    };

    let result = match cli.command {
        Command::Echo { text, chunk } => commands::echo::run(&target, text, chunk).await,
        Command::Info => commands::info::run(&target).await,
        Command::Repl => commands::repl::run(&target).await,
    };

    if let Err(e) = result {
        eprintln!("kecho: {e:#}");
        std::process::exit(1);
    }
}
