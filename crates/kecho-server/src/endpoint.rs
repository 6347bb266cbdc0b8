//! Endpoint lifecycle: the process-wide identity sessions are opened against.
//!
//! `Endpoint::register` binds the listeners and creates the shared context,
//! `run` hands accepted connections to session tasks, and `unregister`
//! stops accepting and tells live sessions to close.

use crate::config::ServerConfig;
use crate::connection;
use crate::registry::SessionRegistry;
use crate::transport::tcp::{self, TcpConnection};
use crate::transport::websocket::{self, WebSocketConnection};
use crate::transport::Listener;
use kecho_core::KechoResult;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Reported to clients in `Info` responses.
pub const DESCRIPTION: &str = "echoes each write back to the same session";

/// State shared by every session task of one endpoint.
pub struct EndpointContext {
    pub config: ServerConfig,
    pub registry: SessionRegistry,
    shutdown_tx: broadcast::Sender<()>,
}

impl EndpointContext {
    pub fn new(config: ServerConfig) -> Self {
        let registry = SessionRegistry::new(config.max_sessions);
        Self {
            config,
            registry,
            shutdown_tx: broadcast::channel(1).0,
        }
    }

    /// Receiver that fires once when the endpoint unregisters.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}

/// A registered echo endpoint.
pub struct Endpoint {
    ctx: Arc<EndpointContext>,
    tcp: Listener<TcpConnection>,
    ws: Option<Listener<WebSocketConnection>>,
}

impl Endpoint {
    /// Bind the configured listeners and register the endpoint.
    ///
    /// If a later listener fails to bind, the ones already bound are dropped
    /// (and their sockets released) before the error is returned.
    pub async fn register(config: ServerConfig) -> KechoResult<Self> {
        let tcp = tcp::start_listener(SocketAddr::new(config.bind, config.port)).await?;
        let ws = match config.ws_port {
            Some(port) => Some(websocket::start_listener(SocketAddr::new(config.bind, port)).await?),
            None => None,
        };

        info!(
            name = %config.name,
            class = %config.class,
            tcp = %tcp.local_addr,
            ws = ?ws.as_ref().map(|l| l.local_addr),
            max_sessions = config.max_sessions,
            max_payload = config.max_payload,
            "endpoint registered"
        );

        Ok(Self {
            ctx: Arc::new(EndpointContext::new(config)),
            tcp,
            ws,
        })
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp.local_addr
    }

    pub fn ws_addr(&self) -> Option<SocketAddr> {
        self.ws.as_ref().map(|l| l.local_addr)
    }

    #[cfg(test)]
    pub fn context(&self) -> &Arc<EndpointContext> {
        &self.ctx
    }

    /// Accept connections until every listener has stopped.
    pub async fn run(&mut self) -> KechoResult<()> {
        let ws_enabled = self.ws.is_some();
        loop {
            tokio::select! {
                Some(conn) = self.tcp.rx.recv() => {
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        let remote = conn.remote_addr;
                        if let Err(e) = connection::serve_tcp(ctx, conn).await {
                            warn!(remote = %remote, error = %e, "TCP connection error");
                        }
                    });
                }
                Some(conn) = recv_ws(&mut self.ws), if ws_enabled => {
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        let remote = conn.remote_addr;
                        if let Err(e) = connection::serve_websocket(ctx, conn).await {
                            warn!(remote = %remote, error = %e, "WebSocket connection error");
                        }
                    });
                }
                else => {
                    info!("all listeners closed");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Stop accepting connections and close every live session.
    pub async fn unregister(self) {
        let Self { ctx, tcp, ws } = self;
        drop(tcp);
        drop(ws);

        let open = ctx.registry.count().await;
        for s in ctx.registry.list().await {
            debug!(
                handle = s.handle,
                transport = %s.transport,
                remote = %s.remote_addr,
                written = s.bytes_written,
                read = s.bytes_read,
                "closing live session"
            );
        }
        // No receivers just means no live sessions.
        let _ = ctx.shutdown_tx.send(());
        info!(name = %ctx.config.name, open_sessions = open, "endpoint unregistered");
    }
}

async fn recv_ws(ws: &mut Option<Listener<WebSocketConnection>>) -> Option<WebSocketConnection> {
    match ws {
        Some(listener) => listener.rx.recv().await,
        None => None,
    }
}
