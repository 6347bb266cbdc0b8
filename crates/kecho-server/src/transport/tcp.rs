//! Plain TCP listener. Requests travel as length-prefixed CBOR frames.

use super::Listener;
use kecho_core::{KechoError, KechoResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// An accepted TCP connection.
pub struct TcpConnection {
    pub stream: TcpStream,
    pub remote_addr: SocketAddr,
}

/// Bind `bind_addr` and start accepting connections.
pub async fn start_listener(bind_addr: SocketAddr) -> KechoResult<Listener<TcpConnection>> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| KechoError::Transport(format!("TCP bind {bind_addr} failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "TCP listener started");

    let (tx, rx) = mpsc::channel::<TcpConnection>(64);

    let task = tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(remote = %addr, "TCP connection accepted");
                    let conn = TcpConnection {
                        stream,
                        remote_addr: addr,
                    };
                    if tx.send(conn).await.is_err() {
                        debug!("TCP connection channel closed, stopping accept loop");
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                    // Usually fd exhaustion; give in-flight sessions a moment to close.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    });

    Ok(Listener::new(local_addr, rx, task))
}
