//! KNXnet/IP service request and response builders.
//!
//! Every service can be built into a complete frame and parsed back from a
//! frame body, so the same types serve the client and the server side of a
//! tunnel.
//!
//! ## Protocol Flow (connection-oriented transport)
//!
//! ```text
//! Client                          Server
//!   |                                |
//!   |------- CONNECT_REQUEST ------->|
//!   |<------ CONNECT_RESPONSE -------|
//!   |                                |
//!   |------ TUNNELING_REQUEST ------>|   no TUNNELING_ACK over TCP
//!   |<----- TUNNELING_REQUEST -------|
//!   |                                |
//!   |--- CONNECTIONSTATE_REQUEST --->|   keep-alive
//!   |<-- CONNECTIONSTATE_RESPONSE ---|
//!   |                                |
//!   |------ DISCONNECT_REQUEST ----->|
//!   |<----- DISCONNECT_RESPONSE -----|
//! ```

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::protocol::constants::{ServiceType, E_NO_ERROR, TUNNEL_CONNECTION, TUNNEL_LINKLAYER};
use crate::protocol::frame::{build_frame, Hpai};

/// Connection Request Information (CRI) for tunneling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequestInfo {
    /// Connection type (`TUNNEL_CONNECTION` = 0x04)
    pub connection_type: u8,
    /// KNX layer (`TUNNEL_LINKLAYER` = 0x02)
    pub knx_layer: u8,
}

impl ConnectionRequestInfo {
    /// Size of the CRI structure
    pub const SIZE: usize = 4;

    /// CRI for a link-layer tunnel
    pub const fn tunnel_link_layer() -> Self {
        Self {
            connection_type: TUNNEL_CONNECTION,
            knx_layer: TUNNEL_LINKLAYER,
        }
    }

    fn to_bytes(self) -> [u8; Self::SIZE] {
        [Self::SIZE as u8, self.connection_type, self.knx_layer, 0x00]
    }

    fn parse(data: &[u8]) -> Result<Self> {
        match *data {
            [4, connection_type, knx_layer, _, ..] => Ok(Self {
                connection_type,
                knx_layer,
            }),
            _ => Err(KnxError::invalid_frame()),
        }
    }
}

/// `CONNECT_REQUEST` service (0x0205)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Control endpoint (for connection management)
    pub control_endpoint: Hpai,
    /// Data endpoint (for tunneling data)
    pub data_endpoint: Hpai,
    /// Connection request information
    pub cri: ConnectionRequestInfo,
}

impl ConnectRequest {
    /// Link-layer tunnel request with the given endpoints
    pub const fn new(control_endpoint: Hpai, data_endpoint: Hpai) -> Self {
        Self {
            control_endpoint,
            data_endpoint,
            cri: ConnectionRequestInfo::tunnel_link_layer(),
        }
    }

    /// Build the complete frame (26 bytes)
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(2 * Hpai::SIZE + ConnectionRequestInfo::SIZE);
        body.extend_from_slice(&self.control_endpoint.to_bytes());
        body.extend_from_slice(&self.data_endpoint.to_bytes());
        body.extend_from_slice(&self.cri.to_bytes());
        build_frame(ServiceType::ConnectRequest, &body)
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let control_endpoint = Hpai::parse(body)?;
        let data_endpoint = Hpai::parse(body.get(Hpai::SIZE..).unwrap_or_default())?;
        let cri = ConnectionRequestInfo::parse(body.get(2 * Hpai::SIZE..).unwrap_or_default())?;
        Ok(Self {
            control_endpoint,
            data_endpoint,
            cri,
        })
    }
}

/// `CONNECT_RESPONSE` service (0x0206)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Communication channel ID
    pub channel_id: u8,
    /// Status code (0 = OK)
    pub status: u8,
    /// Data endpoint assigned by the server (absent on error)
    pub data_endpoint: Option<Hpai>,
    /// Individual address assigned to the tunnel (absent on error)
    pub tunnel_address: Option<IndividualAddress>,
}

impl ConnectResponse {
    /// Successful response assigning `channel_id` and `tunnel_address`
    pub const fn accepted(channel_id: u8, data_endpoint: Hpai, tunnel_address: IndividualAddress) -> Self {
        Self {
            channel_id,
            status: E_NO_ERROR,
            data_endpoint: Some(data_endpoint),
            tunnel_address: Some(tunnel_address),
        }
    }

    /// Error response
    pub const fn rejected(status: u8) -> Self {
        Self {
            channel_id: 0,
            status,
            data_endpoint: None,
            tunnel_address: None,
        }
    }

    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut body = vec![self.channel_id, self.status];
        if let (Some(hpai), Some(address)) = (self.data_endpoint, self.tunnel_address) {
            body.extend_from_slice(&hpai.to_bytes());
            // CRD: length, connection type, tunnel address
            body.extend_from_slice(&[4, TUNNEL_CONNECTION]);
            body.extend_from_slice(&address.to_bytes());
        }
        build_frame(ServiceType::ConnectResponse, &body)
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let [channel_id, status, rest @ ..] = body else {
            return Err(KnxError::invalid_frame());
        };
        let (channel_id, status) = (*channel_id, *status);
        if status != E_NO_ERROR {
            return Ok(Self {
                channel_id,
                status,
                data_endpoint: None,
                tunnel_address: None,
            });
        }

        let data_endpoint = Hpai::parse(rest)?;
        let tunnel_address = match rest.get(Hpai::SIZE..) {
            Some([4, TUNNEL_CONNECTION, crd @ ..]) => Some(IndividualAddress::from_slice(crd)?),
            _ => return Err(KnxError::invalid_frame()),
        };
        Ok(Self {
            channel_id,
            status,
            data_endpoint: Some(data_endpoint),
            tunnel_address,
        })
    }

    /// Check if connection was successful
    pub const fn is_ok(&self) -> bool {
        self.status == E_NO_ERROR
    }
}

/// Channel-scoped request body: channel, reserved, control endpoint.
fn build_channel_request(service: ServiceType, channel_id: u8, endpoint: &Hpai) -> Result<Vec<u8>> {
    let mut body = vec![channel_id, 0x00];
    body.extend_from_slice(&endpoint.to_bytes());
    build_frame(service, &body)
}

fn parse_channel_request(body: &[u8]) -> Result<(u8, Hpai)> {
    match body {
        [channel_id, _, hpai @ ..] => Ok((*channel_id, Hpai::parse(hpai)?)),
        _ => Err(KnxError::invalid_frame()),
    }
}

fn parse_channel_status(body: &[u8]) -> Result<(u8, u8)> {
    match *body {
        [channel_id, status, ..] => Ok((channel_id, status)),
        _ => Err(KnxError::invalid_frame()),
    }
}

/// `CONNECTIONSTATE_REQUEST` service (0x0207)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStateRequest {
    /// Communication channel ID
    pub channel_id: u8,
    /// Control endpoint
    pub control_endpoint: Hpai,
}

impl ConnectionStateRequest {
    /// Create a new `CONNECTIONSTATE_REQUEST`
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        build_channel_request(ServiceType::ConnectionstateRequest, self.channel_id, &self.control_endpoint)
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let (channel_id, control_endpoint) = parse_channel_request(body)?;
        Ok(Self::new(channel_id, control_endpoint))
    }
}

/// `CONNECTIONSTATE_RESPONSE` service (0x0208)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStateResponse {
    /// Communication channel ID
    pub channel_id: u8,
    /// Status code (0 = OK)
    pub status: u8,
}

impl ConnectionStateResponse {
    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        build_frame(ServiceType::ConnectionstateResponse, &[self.channel_id, self.status])
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let (channel_id, status) = parse_channel_status(body)?;
        Ok(Self { channel_id, status })
    }

    /// Check if connection is still alive
    pub const fn is_ok(&self) -> bool {
        self.status == E_NO_ERROR
    }
}

/// `DISCONNECT_REQUEST` service (0x0209)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectRequest {
    /// Communication channel ID
    pub channel_id: u8,
    /// Control endpoint
    pub control_endpoint: Hpai,
}

impl DisconnectRequest {
    /// Create a new `DISCONNECT_REQUEST`
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        build_channel_request(ServiceType::DisconnectRequest, self.channel_id, &self.control_endpoint)
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let (channel_id, control_endpoint) = parse_channel_request(body)?;
        Ok(Self::new(channel_id, control_endpoint))
    }
}

/// `DISCONNECT_RESPONSE` service (0x020A)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectResponse {
    /// Communication channel ID
    pub channel_id: u8,
    /// Status code (0 = OK)
    pub status: u8,
}

impl DisconnectResponse {
    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        build_frame(ServiceType::DisconnectResponse, &[self.channel_id, self.status])
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let (channel_id, status) = parse_channel_status(body)?;
        Ok(Self { channel_id, status })
    }
}

/// Connection header of tunneling frames (4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHeader {
    /// Communication channel ID
    pub channel_id: u8,
    /// Sequence counter
    pub sequence_counter: u8,
}

impl ConnectionHeader {
    /// Size of the connection header
    pub const SIZE: usize = 4;

    /// Create a new connection header
    pub const fn new(channel_id: u8, sequence_counter: u8) -> Self {
        Self {
            channel_id,
            sequence_counter,
        }
    }

    fn to_bytes(self) -> [u8; Self::SIZE] {
        [Self::SIZE as u8, self.channel_id, self.sequence_counter, 0x00]
    }

    fn parse(data: &[u8]) -> Result<Self> {
        match *data {
            [4, channel_id, sequence_counter, _, ..] => Ok(Self::new(channel_id, sequence_counter)),
            _ => Err(KnxError::invalid_frame()),
        }
    }
}

/// `TUNNELING_REQUEST` service (0x0420)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelingRequest<'a> {
    /// Connection header
    pub connection_header: ConnectionHeader,
    /// cEMI frame
    pub cemi_data: &'a [u8],
}

impl<'a> TunnelingRequest<'a> {
    /// Create a new `TUNNELING_REQUEST`
    pub const fn new(connection_header: ConnectionHeader, cemi_data: &'a [u8]) -> Self {
        Self {
            connection_header,
            cemi_data,
        }
    }

    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(ConnectionHeader::SIZE + self.cemi_data.len());
        body.extend_from_slice(&self.connection_header.to_bytes());
        body.extend_from_slice(self.cemi_data);
        build_frame(ServiceType::TunnellingRequest, &body)
    }

    /// Parse from frame body
    pub fn parse(body: &'a [u8]) -> Result<Self> {
        let connection_header = ConnectionHeader::parse(body)?;
        Ok(Self {
            connection_header,
            cemi_data: &body[ConnectionHeader::SIZE..],
        })
    }
}

/// `ROUTING_INDICATION` service (0x0530): a bare cEMI frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingIndication<'a> {
    /// cEMI frame
    pub cemi_data: &'a [u8],
}

impl<'a> RoutingIndication<'a> {
    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        build_frame(ServiceType::RoutingIndication, self.cemi_data)
    }

    /// Parse from frame body
    pub fn parse(body: &'a [u8]) -> Self {
        Self { cemi_data: body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::KnxnetIpFrame;

    #[test]
    fn test_connect_request_build() {
        let request = ConnectRequest::new(Hpai::tcp_route_back(), Hpai::tcp_route_back());
        let frame = request.build().unwrap();
        assert_eq!(frame.len(), 26);
        assert_eq!(&frame[..6], &[0x06, 0x10, 0x02, 0x05, 0x00, 0x1A]);
        assert_eq!(&frame[22..], &[0x04, 0x04, 0x02, 0x00]);

        let parsed = KnxnetIpFrame::parse(&frame).unwrap();
        assert_eq!(ConnectRequest::parse(parsed.body()).unwrap(), request);
    }

    #[test]
    fn test_connect_response_accepted() {
        let address = IndividualAddress::new(1, 1, 250).unwrap();
        let response = ConnectResponse::accepted(7, Hpai::tcp_route_back(), address);
        let frame = response.build().unwrap();
        let parsed = ConnectResponse::parse(&frame[6..]).unwrap();
        assert!(parsed.is_ok());
        assert_eq!(parsed.channel_id, 7);
        assert_eq!(parsed.tunnel_address, Some(address));
    }

    #[test]
    fn test_connect_response_rejected() {
        let frame = ConnectResponse::rejected(0x24).build().unwrap();
        assert_eq!(frame.len(), 8);
        let parsed = ConnectResponse::parse(&frame[6..]).unwrap();
        assert!(!parsed.is_ok());
        assert_eq!(parsed.status, 0x24);
    }

    #[test]
    fn test_connection_state_request() {
        let frame = ConnectionStateRequest::new(3, Hpai::tcp_route_back()).build().unwrap();
        assert_eq!(frame.len(), 16);
        assert_eq!(ConnectionStateRequest::parse(&frame[6..]).unwrap().channel_id, 3);
    }

    #[test]
    fn test_tunneling_request() {
        let cemi = [0x11, 0x00, 0xBC, 0xE0, 0x00, 0x00, 0x08, 0x03, 0x01, 0x00, 0x81];
        let frame = TunnelingRequest::new(ConnectionHeader::new(1, 9), &cemi).build().unwrap();
        assert_eq!(&frame[6..10], &[0x04, 0x01, 0x09, 0x00]);
        let parsed = TunnelingRequest::parse(&frame[6..]).unwrap();
        assert_eq!(parsed.connection_header.sequence_counter, 9);
        assert_eq!(parsed.cemi_data, &cemi);
    }

    #[test]
    fn test_short_bodies_rejected() {
        assert!(ConnectResponse::parse(&[1]).is_err());
        assert!(ConnectionStateResponse::parse(&[1]).is_err());
        assert!(TunnelingRequest::parse(&[4, 1]).is_err());
    }
}
