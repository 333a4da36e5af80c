//! KNXnet/IP tunneling client with typestate pattern.
//!
//! The client is sans-IO: every transition returns the frame to put on the
//! wire and consumes the peer's answer as a frame body. The state parameter
//! decides at compile time which operations are available.
//!
//! Tunneling here runs over a connection-oriented transport, so tunneling
//! requests are not acknowledged and both endpoints use route-back HPAIs.
//!
//! ## Example
//!
//! ```
//! use knx_link::protocol::tunnel::TunnelClient;
//! use knx_link::protocol::{ConnectResponse, Hpai, KnxnetIpFrame};
//! use knx_link::IndividualAddress;
//!
//! // Idle → Connecting
//! let (client, connect_frame) = TunnelClient::new().connect()?;
//! assert_eq!(KnxnetIpFrame::parse(&connect_frame)?.body().len(), 20);
//!
//! // Connecting → Connected
//! let address = IndividualAddress::new(1, 1, 250)?;
//! let response = ConnectResponse::accepted(7, Hpai::tcp_route_back(), address).build()?;
//! let mut client = client.handle_connect_response(&response[6..])?;
//! assert_eq!(client.channel_id(), 7);
//!
//! // Connected only
//! let _frame = client.send_tunneling_request(&[0x11, 0x00])?;
//! assert_eq!(client.send_sequence(), 1);
//!
//! // Connected → Disconnecting → Idle
//! let (client, _disconnect_frame) = client.disconnect()?;
//! let _client = client.finish();
//! # Ok::<(), knx_link::KnxError>(())
//! ```

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::knx_log;
use crate::protocol::frame::Hpai;
use crate::protocol::services::{
    ConnectRequest, ConnectResponse, ConnectionHeader, ConnectionStateRequest,
    ConnectionStateResponse, DisconnectRequest, TunnelingRequest,
};

// =============================================================================
// State Types
// =============================================================================

/// Client is idle (not connected)
#[derive(Debug, Clone, Copy)]
pub struct Idle;

/// Connection request sent, waiting for response
#[derive(Debug, Clone, Copy)]
pub struct Connecting;

/// Connected and ready to send/receive
#[derive(Debug, Clone, Copy)]
pub struct Connected {
    /// Communication channel ID assigned by the server
    pub channel_id: u8,
    /// Send sequence counter (wraps at 256)
    pub send_sequence: u8,
    /// Next expected receive sequence counter
    pub recv_sequence: u8,
    /// Individual address assigned to the tunnel, if reported
    pub tunnel_address: Option<IndividualAddress>,
}

/// Disconnect request sent
#[derive(Debug, Clone, Copy)]
pub struct Disconnecting {
    /// Channel being torn down
    pub channel_id: u8,
}

// =============================================================================
// Tunneling Client
// =============================================================================

/// Tunneling client for KNXnet/IP servers
///
/// ## State Machine
///
/// ```text
/// Idle → Connecting → Connected → Disconnecting → Idle
///         ↓ (error)
///         (dropped)
/// ```
///
/// - `TunnelClient<Idle>` can only call `connect()`
/// - `TunnelClient<Connecting>` can only call `handle_connect_response()` or `cancel()`
/// - `TunnelClient<Connected>` can send/receive or `disconnect()`
/// - `TunnelClient<Disconnecting>` can only call `finish()`
#[derive(Debug)]
pub struct TunnelClient<State> {
    control_endpoint: Hpai,
    state: State,
}

impl<S> TunnelClient<S> {
    fn transition<T>(self, state: T) -> TunnelClient<T> {
        TunnelClient {
            control_endpoint: self.control_endpoint,
            state,
        }
    }
}

impl Default for TunnelClient<Idle> {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelClient<Idle> {
    /// Create a new tunnel client using route-back endpoints
    pub const fn new() -> Self {
        Self {
            control_endpoint: Hpai::tcp_route_back(),
            state: Idle,
        }
    }

    /// Start connection (Idle → Connecting), returning the `CONNECT_REQUEST`.
    pub fn connect(self) -> Result<(TunnelClient<Connecting>, Vec<u8>)> {
        let frame = ConnectRequest::new(self.control_endpoint, self.control_endpoint).build()?;
        Ok((self.transition(Connecting), frame))
    }
}

impl TunnelClient<Connecting> {
    /// Handle `CONNECT_RESPONSE` body (Connecting → Connected)
    ///
    /// # Errors
    ///
    /// A non-zero status yields a refused connection error carrying the
    /// server's status code; the client is dropped.
    pub fn handle_connect_response(self, body: &[u8]) -> Result<TunnelClient<Connected>> {
        let response = ConnectResponse::parse(body)?;
        if !response.is_ok() {
            knx_log!(warn, "Tunnel connection refused, status 0x{:02X}", response.status);
            return Err(KnxError::connection_refused(response.status));
        }

        knx_log!(
            info,
            "Tunnel connected on channel {} as {:?}",
            response.channel_id,
            response.tunnel_address
        );
        Ok(self.transition(Connected {
            channel_id: response.channel_id,
            send_sequence: 0,
            recv_sequence: 0,
            tunnel_address: response.tunnel_address,
        }))
    }

    /// Cancel connection attempt (Connecting → Idle)
    pub fn cancel(self) -> TunnelClient<Idle> {
        self.transition(Idle)
    }
}

impl TunnelClient<Connected> {
    /// Assigned channel ID
    #[inline]
    pub const fn channel_id(&self) -> u8 {
        self.state.channel_id
    }

    /// Current send sequence counter
    #[inline]
    pub const fn send_sequence(&self) -> u8 {
        self.state.send_sequence
    }

    /// Next expected receive sequence counter
    #[inline]
    pub const fn recv_sequence(&self) -> u8 {
        self.state.recv_sequence
    }

    /// Individual address of the tunnel
    #[inline]
    pub const fn tunnel_address(&self) -> Option<IndividualAddress> {
        self.state.tunnel_address
    }

    /// Build a `TUNNELING_REQUEST` and advance the send sequence.
    pub fn send_tunneling_request(&mut self, cemi_data: &[u8]) -> Result<Vec<u8>> {
        let header = ConnectionHeader::new(self.state.channel_id, self.state.send_sequence);
        let frame = TunnelingRequest::new(header, cemi_data).build()?;
        self.state.send_sequence = self.state.send_sequence.wrapping_add(1);
        Ok(frame)
    }

    /// Handle an incoming `TUNNELING_REQUEST` body, returning its cEMI data.
    ///
    /// Frames for another channel are rejected. The stream is reliable, so a
    /// sequence gap only resynchronizes the counter.
    pub fn handle_tunneling_indication<'a>(&mut self, body: &'a [u8]) -> Result<&'a [u8]> {
        let request = TunnelingRequest::parse(body)?;
        let header = request.connection_header;
        if header.channel_id != self.state.channel_id {
            return Err(KnxError::invalid_frame());
        }
        if header.sequence_counter != self.state.recv_sequence {
            knx_log!(
                debug,
                "Tunnel sequence gap: expected {}, got {}",
                self.state.recv_sequence,
                header.sequence_counter
            );
        }
        self.state.recv_sequence = header.sequence_counter.wrapping_add(1);
        Ok(request.cemi_data)
    }

    /// Build a `CONNECTIONSTATE_REQUEST` (heartbeat)
    pub fn heartbeat(&self) -> Result<Vec<u8>> {
        ConnectionStateRequest::new(self.state.channel_id, self.control_endpoint).build()
    }

    /// Check a `CONNECTIONSTATE_RESPONSE` body
    pub fn handle_heartbeat_response(&self, body: &[u8]) -> Result<()> {
        let response = ConnectionStateResponse::parse(body)?;
        if !response.is_ok() {
            return Err(KnxError::connection_lost());
        }
        Ok(())
    }

    /// Start disconnect (Connected → Disconnecting)
    pub fn disconnect(self) -> Result<(TunnelClient<Disconnecting>, Vec<u8>)> {
        let channel_id = self.state.channel_id;
        let frame = DisconnectRequest::new(channel_id, self.control_endpoint).build()?;
        Ok((self.transition(Disconnecting { channel_id }), frame))
    }
}

impl TunnelClient<Disconnecting> {
    /// Finish (Disconnecting → Idle); the server's answer is not awaited.
    pub fn finish(self) -> TunnelClient<Idle> {
        knx_log!(debug, "Tunnel channel {} closed", self.state.channel_id);
        self.transition(Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::E_NO_MORE_CONNECTIONS;
    use crate::protocol::frame::KnxnetIpFrame;
    use crate::protocol::services::ConnectionStateResponse;

    fn connected() -> TunnelClient<Connected> {
        let (client, _) = TunnelClient::new().connect().unwrap();
        let address = IndividualAddress::new(1, 1, 250).unwrap();
        let response = ConnectResponse::accepted(5, Hpai::tcp_route_back(), address)
            .build()
            .unwrap();
        client.handle_connect_response(&response[6..]).unwrap()
    }

    #[test]
    fn test_connect_flow() {
        let client = connected();
        assert_eq!(client.channel_id(), 5);
        assert_eq!(client.tunnel_address().unwrap().to_string(), "1.1.250");
    }

    #[test]
    fn test_connect_refused() {
        let (client, _) = TunnelClient::new().connect().unwrap();
        let response = ConnectResponse::rejected(E_NO_MORE_CONNECTIONS).build().unwrap();
        let err = client.handle_connect_response(&response[6..]).unwrap_err();
        assert!(matches!(err, KnxError::Connection(ref e) if e.status() == Some(E_NO_MORE_CONNECTIONS)));
    }

    #[test]
    fn test_send_sequence_wraps() {
        let mut client = connected();
        for _ in 0..256 {
            client.send_tunneling_request(&[0x11, 0x00]).unwrap();
        }
        assert_eq!(client.send_sequence(), 0);
    }

    #[test]
    fn test_indication_channel_check() {
        let mut client = connected();
        let cemi = [0x29, 0x00];
        let frame = TunnelingRequest::new(ConnectionHeader::new(5, 0), &cemi).build().unwrap();
        let parsed = KnxnetIpFrame::parse(&frame).unwrap();
        assert_eq!(client.handle_tunneling_indication(parsed.body()).unwrap(), &cemi);
        assert_eq!(client.recv_sequence(), 1);

        let foreign = TunnelingRequest::new(ConnectionHeader::new(9, 1), &cemi).build().unwrap();
        assert!(client.handle_tunneling_indication(&foreign[6..]).is_err());
    }

    #[test]
    fn test_heartbeat_response() {
        let client = connected();
        let ok = ConnectionStateResponse { channel_id: 5, status: 0 }.build().unwrap();
        assert!(client.handle_heartbeat_response(&ok[6..]).is_ok());
        let lost = ConnectionStateResponse { channel_id: 5, status: 0x21 }.build().unwrap();
        assert!(client.handle_heartbeat_response(&lost[6..]).is_err());
    }
}
