//! Events published by a [`NetworkLink`](super::NetworkLink).

use std::sync::Arc;

use crate::error::KnxError;
use crate::protocol::cemi::LDataFrame;

/// Why a link stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `close()` was called
    Requested,
    /// The transport failed or the peer went away
    TransportLost,
    /// A keep-alive acknowledgment did not arrive in time
    SessionTimeout,
    /// The secure session ended (server close or repeated integrity failures)
    SessionClosed,
    /// The server disconnected the tunnel
    ServerDisconnect,
}

/// Something observed on a link, in receive order
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Channel established
    Connected,
    /// Decoded incoming telegram
    Indication(LDataFrame),
    /// A received frame was rejected; the link stays open
    FrameDropped(Arc<KnxError>),
    /// Link is closed and cannot be used again
    Disconnected(DisconnectReason),
}

impl LinkEvent {
    /// Whether this event ends the stream
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }
}
