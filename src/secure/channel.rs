//! `SECURE_WRAPPER` sealing and the receive sequence window.
//!
//! Both ends of a session use a [`SecureChannel`]: it owns one key per
//! direction, the 48-bit send counter and the next expected receive
//! sequence number.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Key, Nonce};

use crate::error::{KnxError, Result};
use crate::knx_log;
use crate::protocol::frame::KnxnetIpFrame;
use crate::protocol::secure::{SecureWrapper, MAC_SIZE, MAX_SEQUENCE, SERIAL_SIZE};
use crate::protocol::ServiceType;
use crate::secure::keys::SecretKey;

/// Accepted forward distance from the expected receive sequence
pub const RECEIVE_WINDOW: u64 = 4;

/// Consecutive integrity failures after which a session is closed
pub const MAX_INTEGRITY_FAILURES: u32 = 3;

/// Per-session wrapping state
#[derive(Debug)]
pub struct SecureChannel {
    session_id: u16,
    serial: [u8; SERIAL_SIZE],
    send_key: SecretKey,
    recv_key: SecretKey,
    send_sequence: u64,
    expected_sequence: u64,
    failures: u32,
}

impl SecureChannel {
    /// Create a channel sending under `send_key` and receiving under `recv_key`
    pub fn new(session_id: u16, serial: [u8; SERIAL_SIZE], send_key: SecretKey, recv_key: SecretKey) -> Self {
        Self {
            session_id,
            serial,
            send_key,
            recv_key,
            send_sequence: 0,
            expected_sequence: 0,
            failures: 0,
        }
    }

    /// Session identifier
    pub const fn session_id(&self) -> u16 {
        self.session_id
    }

    /// Sequence number the next wrapped frame will carry
    pub const fn send_sequence(&self) -> u64 {
        self.send_sequence
    }

    /// Lowest sequence number still accepted from the peer
    pub const fn expected_sequence(&self) -> u64 {
        self.expected_sequence
    }

    /// Consecutive integrity failures so far
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether the failure threshold has been reached
    pub const fn is_exhausted(&self) -> bool {
        self.failures >= MAX_INTEGRITY_FAILURES
    }

    /// Encrypt a complete inner KNXnet/IP frame into a `SECURE_WRAPPER`.
    pub fn wrap(&mut self, inner: &[u8]) -> Result<Vec<u8>> {
        if self.send_sequence > MAX_SEQUENCE {
            return Err(KnxError::session_closed());
        }

        let mut wrapper = SecureWrapper {
            session_id: self.session_id,
            sequence: self.send_sequence,
            serial: self.serial,
            message_tag: 0,
            ciphertext: Vec::new(),
        };
        let aad = wrapper.associated_data(inner.len() + MAC_SIZE);
        let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(self.send_key.as_bytes()));
        wrapper.ciphertext = cipher
            .encrypt(Nonce::from_slice(&wrapper.nonce()), Payload { msg: inner, aad: &aad })
            .map_err(|_| KnxError::integrity_failed())?;

        let frame = wrapper.build()?;
        self.send_sequence += 1;
        Ok(frame)
    }

    /// Verify and decrypt a `SECURE_WRAPPER` body, returning the inner frame.
    ///
    /// The tag is checked before the sequence window, so only authentic
    /// frames move the window. Every rejection counts towards
    /// [`MAX_INTEGRITY_FAILURES`]; a good frame resets the count.
    pub fn unwrap_body(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        match self.open(body) {
            Ok(inner) => {
                self.failures = 0;
                Ok(inner)
            }
            Err(err) => {
                self.failures += 1;
                knx_log!(
                    warn,
                    "Dropping secure frame ({} consecutive failures): {}",
                    self.failures,
                    err
                );
                Err(err)
            }
        }
    }

    /// Like [`unwrap_body`](Self::unwrap_body) for a complete frame.
    pub fn unwrap_frame(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        let parsed = KnxnetIpFrame::parse(frame)?;
        if parsed.service_type() != ServiceType::SecureWrapper {
            return Err(KnxError::integrity_failed());
        }
        self.unwrap_body(parsed.body())
    }

    fn open(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        let wrapper = SecureWrapper::parse(body).map_err(|_| KnxError::integrity_failed())?;
        if wrapper.session_id != self.session_id {
            return Err(KnxError::integrity_failed());
        }

        let aad = wrapper.associated_data(wrapper.ciphertext.len());
        let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(self.recv_key.as_bytes()));
        let inner = cipher
            .decrypt(
                Nonce::from_slice(&wrapper.nonce()),
                Payload {
                    msg: &wrapper.ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| KnxError::integrity_failed())?;

        if wrapper.sequence < self.expected_sequence {
            return Err(KnxError::replayed_frame());
        }
        if wrapper.sequence >= self.expected_sequence + RECEIVE_WINDOW {
            return Err(KnxError::integrity_failed());
        }
        self.expected_sequence = wrapper.sequence + 1;
        Ok(inner)
    }

    /// Wipe both keys; the channel cannot be used afterwards.
    pub fn wipe(&mut self) {
        self.send_key.wipe();
        self.recv_key.wipe();
    }
}
