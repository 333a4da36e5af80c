//! Transport abstraction for KNXnet/IP communication.
//!
//! The link depends on this trait only, so sockets, serial lines and
//! in-process pipes are interchangeable:
//!
//! - High-level code ([`NetworkLink`](crate::link::NetworkLink)) depends on
//!   [`Transport`]
//! - Concrete transports (TCP sockets, [`MemoryTransport`](super::memory::MemoryTransport))
//!   implement it
//!
//! ## Contract
//!
//! Transports are message oriented: one `send` carries exactly one
//! KNXnet/IP frame, one `recv` yields exactly one frame. Delivery is
//! reliable and ordered. After `close`, both directions fail with a
//! transport-closed error and the peer's `recv` fails too.
//!
//! ## Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use knx_link::net::transport::Transport;
//!
//! #[derive(Debug)]
//! struct SerialTransport {
//!     // ... serial port fields
//! }
//!
//! #[async_trait]
//! impl Transport for SerialTransport {
//!     async fn send(&self, frame: &[u8]) -> knx_link::Result<()> {
//!         // Write one frame with serial framing
//!         Ok(())
//!     }
//!
//!     async fn recv(&self) -> knx_link::Result<Vec<u8>> {
//!         // Read one frame
//!         Ok(Vec::new())
//!     }
//!
//!     async fn close(&self) {}
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;

/// Message-oriented, reliable transport for KNXnet/IP frames.
///
/// Methods take `&self` so a link can receive on one task while other tasks
/// send; implementations synchronize internally.
#[async_trait]
pub trait Transport: Send + Sync + core::fmt::Debug {
    /// Send one complete frame.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the transport is closed or the peer is
    /// gone.
    async fn send(&self, frame: &[u8]) -> Result<()>;

    /// Receive the next complete frame, waiting until one is available.
    ///
    /// # Errors
    ///
    /// Returns a transport error once the transport or its peer is closed.
    async fn recv(&self) -> Result<Vec<u8>>;

    /// Close the transport and release resources. Closing twice is a no-op.
    async fn close(&self);
}
