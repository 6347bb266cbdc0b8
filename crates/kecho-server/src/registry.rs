//! Registry of open session handles.
//!
//! Each connection task owns its session buffer outright; the registry only
//! tracks handle metadata so the endpoint can enforce its session limit and
//! report who is connected.

use kecho_core::{KechoError, KechoResult};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Which listener a session arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    WebSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => f.write_str("tcp"),
            TransportKind::WebSocket => f.write_str("ws"),
        }
    }
}

/// Metadata about one open handle.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub handle: u64,
    pub transport: TransportKind,
    pub remote_addr: SocketAddr,
    pub opened_at: Instant,
    pub bytes_written: u64,
    pub bytes_read: u64,
}

/// Tracks all open handles and allocates handle numbers.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, SessionInfo>>,
    next_handle: AtomicU64,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
            max_sessions,
        }
    }

    /// Allocate a handle for a new session, or fail if the limit is reached.
    pub async fn open(
        &self,
        transport: TransportKind,
        remote_addr: SocketAddr,
    ) -> KechoResult<u64> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(KechoError::SessionLimit(self.max_sessions));
        }

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        sessions.insert(
            handle,
            SessionInfo {
                handle,
                transport,
                remote_addr,
                opened_at: Instant::now(),
                bytes_written: 0,
                bytes_read: 0,
            },
        );
        info!(handle, %transport, remote = %remote_addr, "session opened");
        Ok(handle)
    }

    /// Forget a handle. Closing an unknown handle is a no-op.
    pub async fn close(&self, handle: u64) {
        let mut sessions = self.sessions.write().await;
        if let Some(info) = sessions.remove(&handle) {
            info!(
                handle,
                written = info.bytes_written,
                read = info.bytes_read,
                secs = info.opened_at.elapsed().as_secs(),
                "session closed"
            );
        } else {
            debug!(handle, "close for unknown handle");
        }
    }

    pub async fn record_write(&self, handle: u64, count: usize) {
        if let Some(info) = self.sessions.write().await.get_mut(&handle) {
            info.bytes_written += count as u64;
        }
    }

    pub async fn record_read(&self, handle: u64, count: usize) {
        if let Some(info) = self.sessions.write().await.get_mut(&handle) {
            info.bytes_read += count as u64;
        }
    }

    /// Snapshot of all open sessions, ordered by handle.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut list: Vec<SessionInfo> = self.sessions.read().await.values().cloned().collect();
        list.sort_by_key(|s| s.handle);
        list
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[tokio::test]
    async fn handles_are_sequential_and_not_reused() {
        let reg = SessionRegistry::new(4);
        let a = reg.open(TransportKind::Tcp, addr()).await.unwrap();
        let b = reg.open(TransportKind::WebSocket, addr()).await.unwrap();
        assert_eq!((a, b), (0, 1));

        reg.close(a).await;
        let c = reg.open(TransportKind::Tcp, addr()).await.unwrap();
        assert_eq!(c, 2);
        assert_eq!(reg.count().await, 2);
    }

    #[tokio::test]
    async fn limit_is_enforced_until_a_slot_frees() {
        let reg = SessionRegistry::new(1);
        let a = reg.open(TransportKind::Tcp, addr()).await.unwrap();
        assert!(matches!(
            reg.open(TransportKind::Tcp, addr()).await,
            Err(KechoError::SessionLimit(1))
        ));

        reg.close(a).await;
        assert!(reg.open(TransportKind::Tcp, addr()).await.is_ok());
    }

    #[tokio::test]
    async fn counters_accumulate() {
        let reg = SessionRegistry::new(2);
        let h = reg.open(TransportKind::Tcp, addr()).await.unwrap();
        reg.record_write(h, 5).await;
        reg.record_read(h, 3).await;
        reg.record_read(h, 2).await;

        let list = reg.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].bytes_written, 5);
        assert_eq!(list[0].bytes_read, 5);
    }

    #[tokio::test]
    async fn closing_unknown_handle_is_harmless() {
        let reg = SessionRegistry::new(1);
        reg.close(42).await;
        assert_eq!(reg.count().await, 0);
    }
}
