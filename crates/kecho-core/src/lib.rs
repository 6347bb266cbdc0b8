//! kecho-core: the per-session echo buffer and its wire protocol.
//!
//! Provides the session buffer state machine, CBOR request/response
//! messages, length-prefixed framing, and the shared error types.

pub mod codec;
pub mod error;
pub mod messages;
pub mod session;

// Re-export commonly used items at crate root.
pub use codec::{cbor_decode, cbor_encode, frame_encode, FrameDecoder, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
pub use error::{KechoError, KechoResult, SessionError};
pub use messages::{ErrorKind, Request, Response, SessionState};
pub use session::{ReadSink, SessionBuffer};
