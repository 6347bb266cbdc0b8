//! Per-session echo buffer.
//!
//! A session holds at most one payload, captured by the latest write, and a
//! cursor marking how much of it reads have already delivered. A new write
//! replaces the payload wholesale; reads drain it until the cursor reaches
//! the end, after which they return zero bytes until the next write.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Observable state of a session buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing written yet, or the last write failed to allocate.
    Empty,
    /// Payload present with undelivered bytes.
    Holding,
    /// Payload present and fully delivered.
    Drained,
}

/// Destination for bytes delivered by [`SessionBuffer::read_into`].
///
/// An `Err` from [`accept`](ReadSink::accept) leaves the session cursor
/// where it was, so the same range can be read again.
pub trait ReadSink {
    fn accept(&mut self, chunk: &[u8]) -> Result<(), SessionError>;
}

impl ReadSink for Vec<u8> {
    fn accept(&mut self, chunk: &[u8]) -> Result<(), SessionError> {
        self.try_reserve(chunk.len())
            .map_err(|e| SessionError::Transfer(e.to_string()))?;
        self.extend_from_slice(chunk);
        Ok(())
    }
}

/// Buffered payload and read cursor for one open handle.
#[derive(Debug, Default)]
pub struct SessionBuffer {
    payload: Option<Vec<u8>>,
    cursor: usize,
    /// Largest payload this session may hold. `None` means unbounded.
    limit: Option<usize>,
}

impl SessionBuffer {
    /// Open a new session with no payload.
    pub fn open() -> Self {
        Self::default()
    }

    /// Open a session whose payloads may not exceed `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Change the payload size limit. Applies to subsequent writes only.
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Replace the payload with a copy of `bytes`.
    ///
    /// Returns `bytes.len()` on success. On allocation failure the previous
    /// payload is released anyway and the session is left empty.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, SessionError> {
        match self.allocate(bytes) {
            Ok(payload) => {
                self.payload = Some(payload);
                self.cursor = 0;
                Ok(bytes.len())
            }
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    /// Deliver up to `max_len` undelivered bytes into `sink`.
    ///
    /// Returns the number of bytes delivered; 0 means nothing was written
    /// yet or the payload is drained.
    pub fn read_into<S: ReadSink + ?Sized>(
        &mut self,
        max_len: usize,
        sink: &mut S,
    ) -> Result<usize, SessionError> {
        let Some(payload) = self.payload.as_deref() else {
            return Ok(0);
        };
        let remaining = &payload[self.cursor..];
        let count = max_len.min(remaining.len());
        if count == 0 {
            return Ok(0);
        }

        sink.accept(&remaining[..count])?;
        self.cursor += count;
        Ok(count)
    }

    /// Deliver up to `max_len` undelivered bytes as a new vector.
    pub fn read(&mut self, max_len: usize) -> Result<Vec<u8>, SessionError> {
        let mut out = Vec::new();
        self.read_into(max_len, &mut out)?;
        Ok(out)
    }

    /// Release the session and its payload.
    pub fn close(self) {
        drop(self);
    }

    /// Current state of the buffer.
    pub fn state(&self) -> SessionState {
        match &self.payload {
            None => SessionState::Empty,
            Some(p) if self.cursor < p.len() => SessionState::Holding,
            Some(_) => SessionState::Drained,
        }
    }

    /// Length of the current payload, 0 when there is none.
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }

    /// Bytes of the current payload already delivered.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes still waiting to be read.
    pub fn remaining(&self) -> usize {
        self.payload_len() - self.cursor
    }

    fn allocate(&self, bytes: &[u8]) -> Result<Vec<u8>, SessionError> {
        let requested = bytes.len();
        if self.limit.is_some_and(|limit| requested > limit) {
            trace!(requested, limit = ?self.limit, "payload exceeds session limit");
            return Err(SessionError::Alloc { requested });
        }

        let mut payload = Vec::new();
        payload.try_reserve_exact(requested).map_err(|e| {
            trace!(requested, error = %e, "payload allocation failed");
            SessionError::Alloc { requested }
        })?;
        payload.extend_from_slice(bytes);
        Ok(payload)
    }

    fn release(&mut self) {
        self.payload = None;
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that refuses every chunk, like a destination that went away.
    struct BrokenSink;

    impl ReadSink for BrokenSink {
        fn accept(&mut self, _chunk: &[u8]) -> Result<(), SessionError> {
            Err(SessionError::Transfer("destination unavailable".into()))
        }
    }

    fn drain(session: &mut SessionBuffer, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let got = session.read(chunk).unwrap();
            if got.is_empty() {
                return out;
            }
            out.extend(got);
        }
    }

    #[test]
    fn partial_reads_then_drained() {
        let mut s = SessionBuffer::open();
        assert_eq!(s.write(b"hello").unwrap(), 5);

        assert_eq!(s.read(3).unwrap(), b"hel");
        assert_eq!(s.cursor(), 3);
        assert_eq!(s.state(), SessionState::Holding);

        assert_eq!(s.read(10).unwrap(), b"lo");
        assert_eq!(s.cursor(), 5);
        assert_eq!(s.state(), SessionState::Drained);

        assert!(s.read(10).unwrap().is_empty());
    }

    #[test]
    fn read_before_write_is_empty() {
        let mut s = SessionBuffer::open();
        assert!(s.read(5).unwrap().is_empty());
        assert_eq!(s.state(), SessionState::Empty);
        assert_eq!(s.payload_len(), 0);
    }

    #[test]
    fn last_write_wins() {
        let mut s = SessionBuffer::open();
        s.write(b"ab").unwrap();
        s.write(b"xyz").unwrap();
        assert_eq!(s.read(10).unwrap(), b"xyz");
    }

    #[test]
    fn rewrite_after_partial_read_restarts() {
        let mut s = SessionBuffer::open();
        s.write(b"first payload").unwrap();
        assert_eq!(s.read(4).unwrap(), b"firs");

        s.write(b"second").unwrap();
        assert_eq!(s.cursor(), 0);
        assert_eq!(drain(&mut s, 4), b"second");
    }

    #[test]
    fn empty_write_is_immediately_drained() {
        let mut s = SessionBuffer::open();
        assert_eq!(s.write(b"").unwrap(), 0);
        assert_eq!(s.state(), SessionState::Drained);
        assert!(s.read(10).unwrap().is_empty());
    }

    #[test]
    fn zero_length_read_changes_nothing() {
        let mut s = SessionBuffer::open();
        assert!(s.read(0).unwrap().is_empty());

        s.write(b"abc").unwrap();
        assert!(s.read(0).unwrap().is_empty());
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.state(), SessionState::Holding);
    }

    #[test]
    fn drained_stays_drained_until_next_write() {
        let mut s = SessionBuffer::open();
        s.write(b"xy").unwrap();
        assert_eq!(s.read(2).unwrap(), b"xy");
        for _ in 0..5 {
            assert!(s.read(100).unwrap().is_empty());
            assert_eq!(s.state(), SessionState::Drained);
        }

        s.write(b"z").unwrap();
        assert_eq!(s.read(100).unwrap(), b"z");
    }

    #[test]
    fn reconstructs_payload_for_any_chunk_size() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        for chunk in [1, 7, 64, 999, 1000, 4096] {
            let mut s = SessionBuffer::open();
            s.write(&payload).unwrap();
            assert_eq!(drain(&mut s, chunk), payload, "chunk size {chunk}");
            assert_eq!(s.remaining(), 0);
        }
    }

    #[test]
    fn alloc_failure_leaves_session_empty_and_retry_succeeds() {
        let mut s = SessionBuffer::with_limit(3);
        s.write(b"ok").unwrap();

        let err = s.write(b"data").unwrap_err();
        assert_eq!(err, SessionError::Alloc { requested: 4 });
        assert_eq!(s.state(), SessionState::Empty);
        assert!(s.read(10).unwrap().is_empty());

        s.set_limit(None);
        assert_eq!(s.write(b"data").unwrap(), 4);
        assert_eq!(s.read(10).unwrap(), b"data");
    }

    #[test]
    fn limit_is_inclusive() {
        let mut s = SessionBuffer::with_limit(4);
        assert_eq!(s.write(b"four").unwrap(), 4);
    }

    #[test]
    fn transfer_failure_keeps_cursor() {
        let mut s = SessionBuffer::open();
        s.write(b"hello").unwrap();
        s.read(2).unwrap();

        let err = s.read_into(10, &mut BrokenSink).unwrap_err();
        assert!(matches!(err, SessionError::Transfer(_)));
        assert_eq!(s.cursor(), 2);

        assert_eq!(s.read(10).unwrap(), b"llo");
    }

    #[test]
    fn read_into_appends_to_existing_sink() {
        let mut s = SessionBuffer::open();
        s.write(b"tail").unwrap();
        let mut out = b"head-".to_vec();
        assert_eq!(s.read_into(10, &mut out).unwrap(), 4);
        assert_eq!(out, b"head-tail");
    }

    #[test]
    fn drained_read_does_not_touch_sink() {
        let mut s = SessionBuffer::open();
        assert_eq!(s.read_into(10, &mut BrokenSink).unwrap(), 0);
        s.write(b"a").unwrap();
        s.read(1).unwrap();
        assert_eq!(s.read_into(10, &mut BrokenSink).unwrap(), 0);
    }

    #[test]
    fn close_without_write() {
        SessionBuffer::open().close();
        let mut s = SessionBuffer::open();
        s.write(b"bye").unwrap();
        s.close();
    }
}
