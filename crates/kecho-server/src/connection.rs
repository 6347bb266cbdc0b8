//! Per-connection session loop.
//!
//! A connection is one open handle: accepting it opens a session buffer,
//! every decoded request is applied to that buffer, and the buffer is
//! released when the peer sends `Close`, disconnects, or the endpoint
//! shuts down.

use crate::endpoint::EndpointContext;
use crate::registry::TransportKind;
use crate::transport::tcp::TcpConnection;
use crate::transport::websocket::{self, WebSocketConnection};
use kecho_core::{
    cbor_decode, cbor_encode, frame_encode, ErrorKind, FrameDecoder, KechoError, KechoResult,
    Request, Response, SessionBuffer, SessionError,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Socket read size for the TCP transport.
const READ_CHUNK: usize = 16 * 1024;

/// An open handle and the session buffer it owns.
pub struct Connection {
    handle: u64,
    session: SessionBuffer,
    ctx: Arc<EndpointContext>,
}

impl Connection {
    /// Allocate a handle and open an empty session for it.
    pub async fn open(
        ctx: Arc<EndpointContext>,
        transport: TransportKind,
        remote_addr: SocketAddr,
    ) -> KechoResult<Self> {
        let handle = ctx.registry.open(transport, remote_addr).await?;
        Ok(Self {
            handle,
            session: SessionBuffer::with_limit(ctx.config.max_payload),
            ctx,
        })
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Apply one request to the session and build its response.
    pub async fn handle_request(&mut self, request: Request) -> Response {
        match request {
            Request::Write { data } => match self.session.write(&data) {
                Ok(count) => {
                    debug!(handle = self.handle, count, "write");
                    self.ctx.registry.record_write(self.handle, count).await;
                    Response::Written {
                        count: count as u64,
                    }
                }
                Err(e) => {
                    debug!(handle = self.handle, error = %e, "write rejected");
                    session_error(e)
                }
            },
            Request::Read { max_len } => {
                let max_len = usize::try_from(max_len)
                    .unwrap_or(usize::MAX)
                    .min(self.ctx.config.max_payload);
                match self.session.read(max_len) {
                    Ok(data) => {
                        debug!(
                            handle = self.handle,
                            count = data.len(),
                            remaining = self.session.remaining(),
                            "read"
                        );
                        self.ctx.registry.record_read(self.handle, data.len()).await;
                        Response::Data { data }
                    }
                    Err(e) => {
                        warn!(handle = self.handle, error = %e, "read failed");
                        session_error(e)
                    }
                }
            }
            Request::Stat => Response::Stat {
                state: self.session.state(),
                payload_len: self.session.payload_len() as u64,
                cursor: self.session.cursor() as u64,
            },
            Request::Info => Response::Info {
                name: self.ctx.config.name.clone(),
                class: self.ctx.config.class.clone(),
                description: crate::endpoint::DESCRIPTION.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                handle: self.handle,
            },
            Request::Close => Response::Closed,
        }
    }

    /// Release the session buffer and the handle.
    pub async fn close(self) {
        self.session.close();
        self.ctx.registry.close(self.handle).await;
    }
}

fn session_error(e: SessionError) -> Response {
    let kind = match e {
        SessionError::Alloc { .. } => ErrorKind::NoSpace,
        SessionError::Transfer(_) => ErrorKind::Fault,
    };
    Response::error(kind, e.to_string())
}

/// Decode one request payload and apply it, answering undecodable input
/// with `BadRequest`.
async fn dispatch(conn: &mut Connection, payload: &[u8]) -> Response {
    match cbor_decode::<Request>(payload) {
        Ok(request) => conn.handle_request(request).await,
        Err(e) => {
            debug!(handle = conn.handle(), error = %e, "undecodable request");
            Response::error(ErrorKind::BadRequest, e.to_string())
        }
    }
}

/// Serve one TCP connection until it closes.
pub async fn serve_tcp(ctx: Arc<EndpointContext>, tcp: TcpConnection) -> KechoResult<()> {
    let remote = tcp.remote_addr;
    let (mut reader, mut writer) = tcp.stream.into_split();

    let mut conn = match Connection::open(ctx.clone(), TransportKind::Tcp, remote).await {
        Ok(conn) => conn,
        Err(e @ KechoError::SessionLimit(_)) => {
            warn!(remote = %remote, error = %e, "rejecting TCP connection");
            let frame = frame_encode(&Response::error(ErrorKind::Busy, e.to_string()))?;
            writer.write_all(&frame).await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let mut shutdown = ctx.subscribe_shutdown();
    let result = tcp_loop(&mut conn, &mut reader, &mut writer, &mut shutdown).await;
    conn.close().await;
    result
}

async fn tcp_loop(
    conn: &mut Connection,
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    shutdown: &mut broadcast::Receiver<()>,
) -> KechoResult<()> {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = tokio::select! {
            read = reader.read(&mut buf) => read?,
            _ = shutdown.recv() => {
                debug!(handle = conn.handle(), "endpoint shutting down");
                return Ok(());
            }
        };
        if n == 0 {
            debug!(handle = conn.handle(), "peer disconnected");
            return Ok(());
        }

        let frames = match decoder.feed(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                let frame = frame_encode(&Response::error(ErrorKind::BadRequest, e.to_string()))?;
                writer.write_all(&frame).await?;
                return Err(e);
            }
        };

        for payload in frames {
            let response = dispatch(conn, &payload).await;
            let closing = response == Response::Closed;
            writer.write_all(&frame_encode(&response)?).await?;
            if closing {
                return Ok(());
            }
        }
    }
}

/// Serve one WebSocket connection until it closes.
pub async fn serve_websocket(
    ctx: Arc<EndpointContext>,
    mut ws: WebSocketConnection,
) -> KechoResult<()> {
    let remote = ws.remote_addr;

    let mut conn = match Connection::open(ctx.clone(), TransportKind::WebSocket, remote).await {
        Ok(conn) => conn,
        Err(e @ KechoError::SessionLimit(_)) => {
            warn!(remote = %remote, error = %e, "rejecting WebSocket connection");
            let busy = cbor_encode(&Response::error(ErrorKind::Busy, e.to_string()))?;
            websocket::ws_send_binary(&mut ws.ws_stream, busy).await?;
            let _ = ws.ws_stream.close(None).await;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let mut shutdown = ctx.subscribe_shutdown();
    let result = ws_loop(&mut conn, &mut ws, &mut shutdown).await;
    let _ = ws.ws_stream.close(None).await;
    conn.close().await;
    result
}

async fn ws_loop(
    conn: &mut Connection,
    ws: &mut WebSocketConnection,
    shutdown: &mut broadcast::Receiver<()>,
) -> KechoResult<()> {
    loop {
        let message = tokio::select! {
            msg = websocket::ws_recv_binary(&mut ws.ws_stream) => msg?,
            _ = shutdown.recv() => {
                debug!(handle = conn.handle(), "endpoint shutting down");
                return Ok(());
            }
        };
        let Some(payload) = message else {
            debug!(handle = conn.handle(), "peer disconnected");
            return Ok(());
        };

        let response = dispatch(conn, &payload).await;
        let closing = response == Response::Closed;
        websocket::ws_send_binary(&mut ws.ws_stream, cbor_encode(&response)?).await?;
        if closing {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use kecho_core::SessionState;

    fn context(max_payload: usize) -> Arc<EndpointContext> {
        let config = ServerConfig {
            max_payload,
            ..ServerConfig::default()
        };
        Arc::new(EndpointContext::new(config))
    }

    async fn open(ctx: &Arc<EndpointContext>) -> Connection {
        Connection::open(ctx.clone(), TransportKind::Tcp, "127.0.0.1:1".parse().unwrap())
            .await
            .unwrap()
    }

    fn write(data: &[u8]) -> Request {
        Request::Write {
            data: data.to_vec(),
        }
    }

    fn data(bytes: &[u8]) -> Response {
        Response::Data {
            data: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn write_then_partial_reads() {
        let ctx = context(1024);
        let mut conn = open(&ctx).await;

        assert_eq!(
            conn.handle_request(write(b"hello")).await,
            Response::Written { count: 5 }
        );
        assert_eq!(
            conn.handle_request(Request::Read { max_len: 3 }).await,
            data(b"hel")
        );
        assert_eq!(
            conn.handle_request(Request::Read { max_len: 10 }).await,
            data(b"lo")
        );
        assert_eq!(
            conn.handle_request(Request::Read { max_len: 10 }).await,
            data(b"")
        );
        assert_eq!(
            conn.handle_request(Request::Stat).await,
            Response::Stat {
                state: SessionState::Drained,
                payload_len: 5,
                cursor: 5
            }
        );
    }

    #[tokio::test]
    async fn oversized_write_reports_no_space_and_empties_session() {
        let ctx = context(4);
        let mut conn = open(&ctx).await;
        conn.handle_request(write(b"abc")).await;

        let resp = conn.handle_request(write(b"too long")).await;
        assert!(matches!(
            resp,
            Response::Error {
                kind: ErrorKind::NoSpace,
                ..
            }
        ));
        assert_eq!(
            conn.handle_request(Request::Stat).await,
            Response::Stat {
                state: SessionState::Empty,
                payload_len: 0,
                cursor: 0
            }
        );
        assert_eq!(
            conn.handle_request(Request::Read { max_len: 10 }).await,
            data(b"")
        );
    }

    #[tokio::test]
    async fn read_length_is_clamped_to_payload_limit() {
        let ctx = context(4);
        let mut conn = open(&ctx).await;
        conn.handle_request(write(b"abcd")).await;
        assert_eq!(
            conn.handle_request(Request::Read { max_len: u64::MAX }).await,
            data(b"abcd")
        );
    }

    #[tokio::test]
    async fn info_names_the_handle() {
        let ctx = context(16);
        let _first = open(&ctx).await;
        let mut second = open(&ctx).await;
        match second.handle_request(Request::Info).await {
            Response::Info {
                name, class, handle, ..
            } => {
                assert_eq!(name, "echo");
                assert_eq!(class, "kecho");
                assert_eq!(handle, 1);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_payload_is_a_bad_request() {
        let ctx = context(16);
        let mut conn = open(&ctx).await;
        let resp = dispatch(&mut conn, &[0xff, 0x00]).await;
        assert!(matches!(
            resp,
            Response::Error {
                kind: ErrorKind::BadRequest,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn close_releases_the_handle() {
        let ctx = context(16);
        let mut conn = open(&ctx).await;
        conn.handle_request(write(b"x")).await;
        assert_eq!(ctx.registry.count().await, 1);

        assert_eq!(conn.handle_request(Request::Close).await, Response::Closed);
        conn.close().await;
        assert_eq!(ctx.registry.count().await, 0);
    }
}
