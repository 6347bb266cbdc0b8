//! Request and response messages exchanged between a client and the
//! echo endpoint. Each message is one CBOR value.

use serde::{Deserialize, Serialize};

pub use crate::session::SessionState;

/// Client-to-endpoint operations on the connection's session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Replace the session payload.
    Write {
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
    /// Read up to `max_len` undelivered bytes.
    Read { max_len: u64 },
    /// Report the session state without changing it.
    Stat,
    /// Describe the endpoint and this session's handle.
    Info,
    /// Release the session and end the connection.
    Close,
}

/// Endpoint-to-client replies, one per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Written {
        count: u64,
    },
    Data {
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
    Stat {
        state: SessionState,
        payload_len: u64,
        cursor: u64,
    },
    Info {
        name: String,
        class: String,
        description: String,
        version: String,
        handle: u64,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    Closed,
}

/// Category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Payload storage could not be obtained; the session is now empty.
    NoSpace,
    /// Bytes could not be delivered; the cursor did not move.
    Fault,
    /// The request could not be decoded.
    BadRequest,
    /// The endpoint has no free session slots.
    Busy,
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
        }
    }
}
