//! KNXnet/IP frame parsing and encoding.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  Header (6 bytes)           │
//! │  - Header Length: 0x06      │
//! │  - Protocol Version: 0x10   │
//! │  - Service Type: 2 bytes    │
//! │  - Total Length: 2 bytes    │
//! ├─────────────────────────────┤
//! │  Body (variable)            │
//! └─────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use knx_link::protocol::{build_frame, KnxnetIpFrame, ServiceType};
//!
//! let bytes = build_frame(ServiceType::ConnectionstateResponse, &[0x15, 0x00])?;
//! let frame = KnxnetIpFrame::parse(&bytes)?;
//! assert_eq!(frame.service_type(), ServiceType::ConnectionstateResponse);
//! assert_eq!(frame.body(), &[0x15, 0x00]);
//! # Ok::<(), knx_link::KnxError>(())
//! ```

use crate::error::{KnxError, Result};
use crate::protocol::constants::{
    ServiceType, HEADER_SIZE_10, IPV4_TCP, IPV4_UDP, KNXNETIP_VERSION_10, MAX_FRAME_SIZE,
};

/// KNXnet/IP frame header (6 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnxnetIpHeader {
    /// Service type identifier
    pub service_type: ServiceType,
    /// Total length of frame (header + body)
    pub total_length: u16,
}

impl KnxnetIpHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 6;

    /// Create a header for a body of `body_length` bytes
    pub const fn new(service_type: ServiceType, body_length: u16) -> Self {
        Self {
            service_type,
            total_length: Self::SIZE as u16 + body_length,
        }
    }

    /// Parse a header from the start of `data`
    ///
    /// # Errors
    ///
    /// Fails on a short buffer, wrong header length, unsupported version or
    /// unknown service type.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let [header_length, version, st_hi, st_lo, len_hi, len_lo, ..] = *data else {
            return Err(KnxError::invalid_frame());
        };
        if header_length != HEADER_SIZE_10 {
            return Err(KnxError::invalid_frame());
        }
        if version != KNXNETIP_VERSION_10 {
            return Err(KnxError::unsupported_version());
        }

        let service_type = ServiceType::from_u16(u16::from_be_bytes([st_hi, st_lo]))
            .ok_or_else(KnxError::unsupported_service_type)?;
        let total_length = u16::from_be_bytes([len_hi, len_lo]);
        if usize::from(total_length) < Self::SIZE {
            return Err(KnxError::invalid_frame());
        }

        Ok(Self {
            service_type,
            total_length,
        })
    }

    /// Encode the header
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let st = self.service_type.to_u16().to_be_bytes();
        let len = self.total_length.to_be_bytes();
        [HEADER_SIZE_10, KNXNETIP_VERSION_10, st[0], st[1], len[0], len[1]]
    }

    /// Expected body length
    pub const fn body_length(&self) -> u16 {
        self.total_length.saturating_sub(Self::SIZE as u16)
    }
}

/// Zero-copy view of a KNXnet/IP frame
#[derive(Debug)]
pub struct KnxnetIpFrame<'a> {
    data: &'a [u8],
    header: KnxnetIpHeader,
}

impl<'a> KnxnetIpFrame<'a> {
    /// Parse a frame; trailing bytes past the total length are ignored.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = KnxnetIpHeader::parse(data)?;
        let total = usize::from(header.total_length);
        let data = data.get(..total).ok_or_else(KnxError::invalid_frame)?;
        Ok(Self { data, header })
    }

    /// Frame header
    #[inline]
    pub const fn header(&self) -> &KnxnetIpHeader {
        &self.header
    }

    /// Service type
    #[inline]
    pub const fn service_type(&self) -> ServiceType {
        self.header.service_type
    }

    /// Frame body (payload after header)
    #[inline]
    pub fn body(&self) -> &'a [u8] {
        &self.data[KnxnetIpHeader::SIZE..]
    }

    /// Header bytes as received
    #[inline]
    pub fn header_bytes(&self) -> &'a [u8] {
        &self.data[..KnxnetIpHeader::SIZE]
    }

    /// Complete frame including header
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

/// Build a complete frame from a service type and body.
pub fn build_frame(service_type: ServiceType, body: &[u8]) -> Result<Vec<u8>> {
    let total = KnxnetIpHeader::SIZE + body.len();
    if total > MAX_FRAME_SIZE {
        return Err(KnxError::payload_too_large());
    }
    let header = KnxnetIpHeader::new(service_type, body.len() as u16);
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Host Protocol Address Information (HPAI)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Structure Len│ Host Protocol│   IP Address        │
/// │   (1 byte)   │   (1 byte)   │   (4 bytes IPv4)    │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │                Port (2 bytes)                      │
/// └────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hpai {
    /// Host protocol code
    pub host_protocol: u8,
    /// IPv4 address
    pub ip_address: [u8; 4],
    /// Port
    pub port: u16,
}

impl Hpai {
    /// Size of HPAI structure for IPv4
    pub const SIZE: usize = 8;

    /// HPAI for an IPv4 UDP endpoint
    pub const fn udp(ip_address: [u8; 4], port: u16) -> Self {
        Self {
            host_protocol: IPV4_UDP,
            ip_address,
            port,
        }
    }

    /// Route-back HPAI for connection-oriented transports: the server answers
    /// on the same connection.
    pub const fn tcp_route_back() -> Self {
        Self {
            host_protocol: IPV4_TCP,
            ip_address: [0; 4],
            port: 0,
        }
    }

    /// Parse HPAI from the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        let [len, host_protocol, a, b, c, d, p_hi, p_lo, ..] = *data else {
            return Err(KnxError::invalid_frame());
        };
        if usize::from(len) != Self::SIZE {
            return Err(KnxError::invalid_frame());
        }
        Ok(Self {
            host_protocol,
            ip_address: [a, b, c, d],
            port: u16::from_be_bytes([p_hi, p_lo]),
        })
    }

    /// Encode HPAI
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let [a, b, c, d] = self.ip_address;
        let [p_hi, p_lo] = self.port.to_be_bytes();
        [Self::SIZE as u8, self.host_protocol, a, b, c, d, p_hi, p_lo]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parse() {
        let data = [0x06, 0x10, 0x02, 0x07, 0x00, 0x10];
        let header = KnxnetIpHeader::parse(&data).unwrap();
        assert_eq!(header.service_type, ServiceType::ConnectionstateRequest);
        assert_eq!(header.total_length, 16);
        assert_eq!(header.body_length(), 10);
    }

    #[test]
    fn test_header_rejects_bad_input() {
        assert!(KnxnetIpHeader::parse(&[0x06, 0x10, 0x02]).is_err());
        assert!(KnxnetIpHeader::parse(&[0x05, 0x10, 0x02, 0x07, 0x00, 0x10]).is_err());
        let err = KnxnetIpHeader::parse(&[0x06, 0x20, 0x02, 0x07, 0x00, 0x10]).unwrap_err();
        assert!(matches!(err, KnxError::Protocol(ref e) if e.is_unsupported_version()));
        assert!(KnxnetIpHeader::parse(&[0x06, 0x10, 0x02, 0x01, 0x00, 0x0E]).is_err());
    }

    #[test]
    fn test_build_frame() {
        let frame = build_frame(ServiceType::DisconnectResponse, &[0x01, 0x00]).unwrap();
        assert_eq!(frame, [0x06, 0x10, 0x02, 0x0A, 0x00, 0x08, 0x01, 0x00]);
        assert!(build_frame(ServiceType::TunnellingRequest, &[0; MAX_FRAME_SIZE]).is_err());
    }

    #[test]
    fn test_frame_parse_truncated() {
        let data = [0x06, 0x10, 0x04, 0x20, 0x00, 0x0A, 0x01];
        assert!(KnxnetIpFrame::parse(&data).is_err());
    }

    #[test]
    fn test_hpai() {
        let hpai = Hpai::udp([192, 168, 1, 100], 3671);
        let bytes = hpai.to_bytes();
        assert_eq!(bytes, [0x08, 0x01, 192, 168, 1, 100, 0x0E, 0x57]);
        assert_eq!(Hpai::parse(&bytes).unwrap(), hpai);
        assert_eq!(Hpai::tcp_route_back().to_bytes(), [0x08, 0x02, 0, 0, 0, 0, 0, 0]);
    }
}
