//! Client side of the kecho protocol.
//!
//! One `EchoClient` is one session on the endpoint: connecting opens it and
//! `close` (or dropping the client) releases it.

use futures_util::{SinkExt, StreamExt};
use kecho_core::{
    cbor_decode, cbor_encode, frame_encode, ErrorKind, FrameDecoder, KechoError, KechoResult,
    Request, Response, SessionError,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

enum Transport {
    Tcp {
        stream: TcpStream,
        decoder: FrameDecoder,
    },
    WebSocket(Box<WebSocketStream<MaybeTlsStream<TcpStream>>>),
}

/// A connected session on a kecho endpoint.
pub struct EchoClient {
    transport: Transport,
}

impl EchoClient {
    /// Open a session over TCP.
    pub async fn connect_tcp(host: &str, port: u16) -> KechoResult<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| KechoError::Transport(format!("connect {host}:{port} failed: {e}")))?;
        debug!(host, port, "connected over TCP");
        Ok(Self {
            transport: Transport::Tcp {
                stream,
                decoder: FrameDecoder::new(),
            },
        })
    }

    /// Open a session over WebSocket.
    pub async fn connect_ws(host: &str, port: u16) -> KechoResult<Self> {
        let url = format!("ws://{host}:{port}");
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| KechoError::Transport(format!("connect {url} failed: {e}")))?;
        debug!(url = %url, "connected over WebSocket");
        Ok(Self {
            transport: Transport::WebSocket(Box::new(ws)),
        })
    }

    /// Send one request and wait for its response.
    pub async fn call(&mut self, request: &Request) -> KechoResult<Response> {
        match &mut self.transport {
            Transport::Tcp { stream, decoder } => {
                stream.write_all(&frame_encode(request)?).await?;
                let mut buf = [0u8; 16 * 1024];
                // Requests are strictly one-at-a-time, so the first complete
                // frame is this request's response.
                loop {
                    let n = stream.read(&mut buf).await?;
                    if n == 0 {
                        return Err(KechoError::Transport("endpoint closed the connection".into()));
                    }
                    if let Some(frame) = decoder.feed(&buf[..n])?.into_iter().next() {
                        return cbor_decode(&frame);
                    }
                }
            }
            Transport::WebSocket(ws) => {
                ws.send(Message::Binary(cbor_encode(request)?))
                    .await
                    .map_err(|e| KechoError::Transport(format!("WS send failed: {e}")))?;
                loop {
                    match ws.next().await {
                        Some(Ok(Message::Binary(data))) => return cbor_decode(&data),
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(KechoError::Transport(
                                "endpoint closed the connection".into(),
                            ));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            return Err(KechoError::Transport(format!("WS recv failed: {e}")));
                        }
                    }
                }
            }
        }
    }

    /// Replace the session payload. Returns the accepted byte count.
    pub async fn write(&mut self, data: &[u8]) -> KechoResult<usize> {
        let request = Request::Write {
            data: data.to_vec(),
        };
        match self.call(&request).await? {
            Response::Written { count } => Ok(count as usize),
            other => Err(unexpected(other, data.len())),
        }
    }

    /// Read up to `max_len` bytes; an empty result means drained.
    pub async fn read(&mut self, max_len: usize) -> KechoResult<Vec<u8>> {
        let request = Request::Read {
            max_len: max_len as u64,
        };
        match self.call(&request).await? {
            Response::Data { data } => Ok(data),
            other => Err(unexpected(other, 0)),
        }
    }

    /// Read until the session is drained, `chunk` bytes at a time.
    pub async fn drain(&mut self, chunk: usize) -> KechoResult<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let data = self.read(chunk).await?;
            if data.is_empty() {
                return Ok(out);
            }
            out.extend(data);
        }
    }

    /// Release the session and disconnect.
    pub async fn close(mut self) -> KechoResult<()> {
        match self.call(&Request::Close).await? {
            Response::Closed => Ok(()),
            other => Err(unexpected(other, 0)),
        }
    }
}

/// Turn a response of the wrong type into an error.
///
/// `requested` is the payload size of the write being answered, if any.
fn unexpected(response: Response, requested: usize) -> KechoError {
    match response {
        Response::Error { kind, message } => match kind {
            ErrorKind::NoSpace => SessionError::Alloc { requested }.into(),
            ErrorKind::Fault => SessionError::Transfer(message).into(),
            ErrorKind::BadRequest => KechoError::InvalidMessage(message),
            ErrorKind::Busy => KechoError::Transport(format!("endpoint busy: {message}")),
        },
        other => KechoError::InvalidMessage(format!("unexpected response: {other:?}")),
    }
}
