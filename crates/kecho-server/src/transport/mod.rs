//! Network listeners that feed accepted connections to the endpoint.

pub mod tcp;
pub mod websocket;

use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A bound listener whose accept loop runs in a background task.
///
/// Dropping the listener stops the accept loop and releases the socket.
pub struct Listener<T> {
    pub local_addr: SocketAddr,
    pub rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> Listener<T> {
    fn new(local_addr: SocketAddr, rx: mpsc::Receiver<T>, task: JoinHandle<()>) -> Self {
        Self {
            local_addr,
            rx,
            task,
        }
    }
}

impl<T> Drop for Listener<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
