//! KNXnet/IP secure session services.
//!
//! ## Session Establishment
//!
//! ```text
//! Client                                   Server
//!   |------ SESSION_REQUEST (HPAI, Kc, user) -->|
//!   |<----- SESSION_RESPONSE (id, Ks, MAC) -----|
//!   |== SECURE_WRAPPER(SESSION_AUTHENTICATE) ==>|
//!   |<= SECURE_WRAPPER(SESSION_STATUS) =========|
//! ```
//!
//! ## `SECURE_WRAPPER` Body
//!
//! ```text
//! ┌────────────┬──────────┬──────────┬─────────────┬──────────────┬─────────┐
//! │ Session ID │ Sequence │ Serial   │ Message Tag │ Ciphertext   │ GCM Tag │
//! │ (2 bytes)  │ (6 bytes)│ (6 bytes)│ (2 bytes)   │ (variable)   │ (16)    │
//! └────────────┴──────────┴──────────┴─────────────┴──────────────┴─────────┘
//! ```
//!
//! These types only move bytes; key handling lives in [`crate::secure`].

use crate::error::{KnxError, Result};
use crate::protocol::constants::{ServiceType, SessionStatusCode};
use crate::protocol::frame::{build_frame, Hpai, KnxnetIpHeader};

/// X25519 public key size
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Truncated handshake MAC and GCM tag size
pub const MAC_SIZE: usize = 16;

/// Wrapper sequence number size (48 bit)
pub const SEQUENCE_SIZE: usize = 6;

/// Device serial number size
pub const SERIAL_SIZE: usize = 6;

/// Largest sequence number representable in 48 bits
pub const MAX_SEQUENCE: u64 = (1 << 48) - 1;

/// Header a frame of `service` with a body of `body_len` bytes will carry.
///
/// Handshake MACs cover the header, so both peers compute it up front.
pub fn header_bytes(service: ServiceType, body_len: usize) -> [u8; KnxnetIpHeader::SIZE] {
    KnxnetIpHeader::new(service, body_len as u16).to_bytes()
}

fn take<const N: usize>(data: &[u8], at: usize) -> Result<[u8; N]> {
    data.get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(KnxError::invalid_frame)
}

/// `SESSION_REQUEST` service (0x0951)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRequest {
    /// Control endpoint (route back)
    pub control_endpoint: Hpai,
    /// Client ephemeral public key
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    /// Tunnel user (1-127)
    pub user_id: u8,
}

impl SessionRequest {
    /// Body size
    pub const BODY_SIZE: usize = Hpai::SIZE + PUBLIC_KEY_SIZE + 1;

    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(Self::BODY_SIZE);
        body.extend_from_slice(&self.control_endpoint.to_bytes());
        body.extend_from_slice(&self.public_key);
        body.push(self.user_id);
        build_frame(ServiceType::SessionRequest, &body)
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() != Self::BODY_SIZE {
            return Err(KnxError::invalid_frame());
        }
        Ok(Self {
            control_endpoint: Hpai::parse(body)?,
            public_key: take(body, Hpai::SIZE)?,
            user_id: body[Self::BODY_SIZE - 1],
        })
    }
}

/// `SESSION_RESPONSE` service (0x0952)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionResponse {
    /// Session identifier chosen by the server
    pub session_id: u16,
    /// Server ephemeral public key
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    /// MAC keyed with the device authentication code
    pub mac: [u8; MAC_SIZE],
}

impl SessionResponse {
    /// Body size
    pub const BODY_SIZE: usize = 2 + PUBLIC_KEY_SIZE + MAC_SIZE;

    /// Header carried by every `SESSION_RESPONSE`
    pub fn header() -> [u8; KnxnetIpHeader::SIZE] {
        header_bytes(ServiceType::SessionResponse, Self::BODY_SIZE)
    }

    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(Self::BODY_SIZE);
        body.extend_from_slice(&self.session_id.to_be_bytes());
        body.extend_from_slice(&self.public_key);
        body.extend_from_slice(&self.mac);
        build_frame(ServiceType::SessionResponse, &body)
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() != Self::BODY_SIZE {
            return Err(KnxError::invalid_frame());
        }
        Ok(Self {
            session_id: u16::from_be_bytes(take(body, 0)?),
            public_key: take(body, 2)?,
            mac: take(body, 2 + PUBLIC_KEY_SIZE)?,
        })
    }
}

/// `SESSION_AUTHENTICATE` service (0x0953), always sent wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionAuthenticate {
    /// Tunnel user (1-127)
    pub user_id: u8,
    /// MAC keyed with the user key
    pub mac: [u8; MAC_SIZE],
}

impl SessionAuthenticate {
    /// Body size
    pub const BODY_SIZE: usize = 2 + MAC_SIZE;

    /// Header carried by every `SESSION_AUTHENTICATE`
    pub fn header() -> [u8; KnxnetIpHeader::SIZE] {
        header_bytes(ServiceType::SessionAuthenticate, Self::BODY_SIZE)
    }

    /// Build the complete (inner) frame
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(Self::BODY_SIZE);
        body.extend_from_slice(&[0x00, self.user_id]);
        body.extend_from_slice(&self.mac);
        build_frame(ServiceType::SessionAuthenticate, &body)
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        match body {
            [_, user_id, mac @ ..] if mac.len() == MAC_SIZE => Ok(Self {
                user_id: *user_id,
                mac: take(mac, 0)?,
            }),
            _ => Err(KnxError::invalid_frame()),
        }
    }
}

/// `SESSION_STATUS` service (0x0954)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    /// Status code
    pub status: SessionStatusCode,
}

impl SessionStatus {
    /// Create a status frame
    pub const fn new(status: SessionStatusCode) -> Self {
        Self { status }
    }

    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        build_frame(ServiceType::SessionStatus, &[self.status as u8, 0x00])
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let [status, ..] = *body else {
            return Err(KnxError::invalid_frame());
        };
        let status = SessionStatusCode::from_u8(status).ok_or_else(KnxError::invalid_frame)?;
        Ok(Self { status })
    }
}

/// `SECURE_WRAPPER` service (0x0950)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureWrapper {
    /// Session identifier
    pub session_id: u16,
    /// 48-bit sequence number
    pub sequence: u64,
    /// Sender serial number
    pub serial: [u8; SERIAL_SIZE],
    /// Message tag
    pub message_tag: u16,
    /// Encrypted inner frame followed by the GCM tag
    pub ciphertext: Vec<u8>,
}

impl SecureWrapper {
    /// Bytes between the header and the ciphertext
    pub const FIELDS_SIZE: usize = 2 + SEQUENCE_SIZE + SERIAL_SIZE + 2;

    fn fields(&self) -> [u8; Self::FIELDS_SIZE] {
        let mut fields = [0u8; Self::FIELDS_SIZE];
        fields[..2].copy_from_slice(&self.session_id.to_be_bytes());
        fields[2..8].copy_from_slice(&self.sequence.to_be_bytes()[2..]);
        fields[8..14].copy_from_slice(&self.serial);
        fields[14..].copy_from_slice(&self.message_tag.to_be_bytes());
        fields
    }

    /// AES-GCM nonce: sequence ‖ serial
    pub fn nonce(&self) -> [u8; SEQUENCE_SIZE + SERIAL_SIZE] {
        let mut nonce = [0u8; SEQUENCE_SIZE + SERIAL_SIZE];
        nonce[..SEQUENCE_SIZE].copy_from_slice(&self.sequence.to_be_bytes()[2..]);
        nonce[SEQUENCE_SIZE..].copy_from_slice(&self.serial);
        nonce
    }

    /// Associated data for a wrapper carrying `ciphertext_len` bytes
    pub fn associated_data(&self, ciphertext_len: usize) -> Vec<u8> {
        let header = header_bytes(ServiceType::SecureWrapper, Self::FIELDS_SIZE + ciphertext_len);
        let mut aad = Vec::with_capacity(KnxnetIpHeader::SIZE + Self::FIELDS_SIZE);
        aad.extend_from_slice(&header);
        aad.extend_from_slice(&self.fields());
        aad
    }

    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(Self::FIELDS_SIZE + self.ciphertext.len());
        body.extend_from_slice(&self.fields());
        body.extend_from_slice(&self.ciphertext);
        build_frame(ServiceType::SecureWrapper, &body)
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < Self::FIELDS_SIZE + MAC_SIZE {
            return Err(KnxError::invalid_frame());
        }
        let mut sequence = [0u8; 8];
        sequence[2..].copy_from_slice(&body[2..8]);
        Ok(Self {
            session_id: u16::from_be_bytes(take(body, 0)?),
            sequence: u64::from_be_bytes(sequence),
            serial: take(body, 8)?,
            message_tag: u16::from_be_bytes(take(body, 14)?),
            ciphertext: body[Self::FIELDS_SIZE..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::KnxnetIpFrame;

    #[test]
    fn test_session_request_layout() {
        let request = SessionRequest {
            control_endpoint: Hpai::tcp_route_back(),
            public_key: [0xAB; PUBLIC_KEY_SIZE],
            user_id: 2,
        };
        let frame = request.build().unwrap();
        assert_eq!(&frame[..6], &[0x06, 0x10, 0x09, 0x51, 0x00, 0x2F]);
        let parsed = KnxnetIpFrame::parse(&frame).unwrap();
        assert_eq!(SessionRequest::parse(parsed.body()).unwrap(), request);
    }

    #[test]
    fn test_session_response_header_matches_build() {
        let response = SessionResponse {
            session_id: 0x0102,
            public_key: [1; PUBLIC_KEY_SIZE],
            mac: [2; MAC_SIZE],
        };
        let frame = response.build().unwrap();
        assert_eq!(&frame[..6], &SessionResponse::header());
        assert_eq!(SessionResponse::parse(&frame[6..]).unwrap(), response);
    }

    #[test]
    fn test_session_status_parse() {
        let frame = SessionStatus::new(SessionStatusCode::Close).build().unwrap();
        assert_eq!(&frame[6..], &[0x05, 0x00]);
        assert!(SessionStatus::parse(&[0x09]).is_err());
        assert!(SessionStatus::parse(&[]).is_err());
    }

    #[test]
    fn test_wrapper_fields() {
        let wrapper = SecureWrapper {
            session_id: 1,
            sequence: 0x0000_0102_0304,
            serial: [0x00, 0xFA, 0x12, 0x34, 0x56, 0x78],
            message_tag: 0,
            ciphertext: vec![0xEE; 24],
        };
        assert_eq!(wrapper.nonce()[..6], [0x00, 0x00, 0x01, 0x02, 0x03, 0x04]);
        let frame = wrapper.build().unwrap();
        let aad = wrapper.associated_data(24);
        assert_eq!(&aad[..], &frame[..6 + SecureWrapper::FIELDS_SIZE]);
        assert_eq!(SecureWrapper::parse(&frame[6..]).unwrap(), wrapper);
    }

    #[test]
    fn test_wrapper_too_short() {
        assert!(SecureWrapper::parse(&[0; SecureWrapper::FIELDS_SIZE + 3]).is_err());
    }
}
