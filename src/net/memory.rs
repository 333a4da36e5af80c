//! In-process transport for tests and simulations.
//!
//! [`MemoryTransport::pair`] returns two connected ends. Whatever one end
//! sends, the other receives, in order. Closing either end makes the peer's
//! `recv` fail, which is how a dropped TCP connection looks to a link.
//!
//! ## Example
//!
//! ```
//! use knx_link::net::memory::MemoryTransport;
//! use knx_link::net::transport::Transport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> knx_link::Result<()> {
//! let (client, server) = MemoryTransport::pair();
//! client.send(&[0x06, 0x10]).await?;
//! assert_eq!(server.recv().await?, [0x06, 0x10]);
//!
//! client.close().await;
//! assert!(server.recv().await.is_err());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::{KnxError, Result};
use crate::net::transport::Transport;

/// One end of an in-process duplex transport
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: watch::Sender<bool>,
    sent: AtomicUsize,
}

impl MemoryTransport {
    /// Two connected ends
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    fn new(tx: mpsc::UnboundedSender<Vec<u8>>, rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            closed: watch::Sender::new(false),
            sent: AtomicUsize::new(0),
        }
    }

    /// Number of frames sent from this end
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }

    /// Whether this end was closed
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, frame: &[u8]) -> Result<()> {
        let tx = self.tx.lock().await;
        let tx = tx.as_ref().ok_or_else(KnxError::transport_closed)?;
        tx.send(frame.to_vec()).map_err(|_| KnxError::send_failed())?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(KnxError::transport_closed());
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            frame = rx.recv() => frame.ok_or_else(KnxError::transport_closed),
            _ = closed.changed() => Err(KnxError::transport_closed()),
        }
    }

    async fn close(&self) {
        self.closed.send_replace(true);
        self.tx.lock().await.take();
        self.rx.lock().await.close();
    }
}
