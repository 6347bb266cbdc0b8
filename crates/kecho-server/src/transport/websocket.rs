//! WebSocket listener using tokio-tungstenite.
//!
//! For clients that cannot open raw TCP sockets. Each binary message carries
//! exactly one CBOR request or response, so no length prefix is needed.

use super::Listener;
use futures_util::{SinkExt, StreamExt};
use kecho_core::{KechoError, KechoResult, MAX_FRAME_SIZE};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
}

/// Start the WebSocket listener.
pub async fn start_listener(bind_addr: SocketAddr) -> KechoResult<Listener<WebSocketConnection>> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| KechoError::Transport(format!("WS bind {bind_addr} failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    let task = tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws_stream) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    });

    Ok(Listener::new(local_addr, rx, task))
}

/// Send a binary message over a WebSocket.
pub async fn ws_send_binary(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    data: Vec<u8>,
) -> KechoResult<()> {
    ws.send(Message::Binary(data))
        .await
        .map_err(|e| KechoError::Transport(format!("WS send failed: {e}")))
}

/// Receive the next binary message from a WebSocket.
///
/// Returns `None` once the peer closes. Text messages are ignored.
pub async fn ws_recv_binary(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
) -> KechoResult<Option<Vec<u8>>> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Binary(data))) => {
                if data.len() > MAX_FRAME_SIZE {
                    return Err(KechoError::InvalidMessage(format!(
                        "WS frame too large: {} bytes (max {MAX_FRAME_SIZE})",
                        data.len()
                    )));
                }
                return Ok(Some(data));
            }
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(Message::Ping(payload))) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                return Err(KechoError::Transport(format!("WS recv failed: {e}")));
            }
        }
    }
}
