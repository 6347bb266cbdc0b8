//! Length-prefixed CBOR framing for stream transports.
//!
//! Wire format: `[4-byte big-endian length][CBOR payload]`

use crate::error::{KechoError, KechoResult};
use std::io::Cursor;

/// Largest session payload a frame can carry (1 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 1_048_576;

/// Largest accepted frame payload: a full session payload plus message overhead.
pub const MAX_FRAME_SIZE: usize = MAX_PAYLOAD_SIZE + 1024;

/// Encode a value as a bare CBOR payload.
pub fn cbor_encode<T: serde::Serialize>(value: &T) -> KechoResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(value, &mut payload)?;
    Ok(payload)
}

/// Encode a serializable value into a length-prefixed CBOR frame.
pub fn frame_encode<T: serde::Serialize>(value: &T) -> KechoResult<Vec<u8>> {
    let payload = cbor_encode(value)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(KechoError::InvalidMessage(format!(
            "frame too large: {} bytes (max {MAX_FRAME_SIZE})",
            payload.len()
        )));
    }

    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend(payload);
    Ok(frame)
}

/// Decode a CBOR payload (without length prefix) into a typed value.
pub fn cbor_decode<T: serde::de::DeserializeOwned>(data: &[u8]) -> KechoResult<T> {
    let value: T = ciborium::from_reader(Cursor::new(data))?;
    Ok(value)
}

/// Streaming frame decoder: accumulates bytes and yields complete payloads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the complete frame payloads, undecoded.
    ///
    /// A length prefix above [`MAX_FRAME_SIZE`] poisons the stream, since
    /// there is no way to resynchronise on the next frame boundary.
    pub fn feed(&mut self, data: &[u8]) -> KechoResult<Vec<Vec<u8>>> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        while self.buffer.len() >= 4 {
            let len = u32::from_be_bytes([
                self.buffer[0],
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
            ]) as usize;
            if len > MAX_FRAME_SIZE {
                return Err(KechoError::InvalidMessage(format!(
                    "frame too large: {len} bytes (max {MAX_FRAME_SIZE})"
                )));
            }
            if self.buffer.len() < 4 + len {
                break;
            }

            frames.push(self.buffer[4..4 + len].to_vec());
            self.buffer.drain(..4 + len);
        }

        Ok(frames)
    }

    /// Number of bytes remaining in the internal buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
