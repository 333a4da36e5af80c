//! Client side of a secure session.
//!
//! [`SecureSession`] is sans-IO like the tunnel client: it produces the
//! frames to send and consumes complete frames received from the server.
//!
//! ```text
//! Idle ──request()──> Handshaking ──handle_status(OK)──> Established
//!                          │                                  │
//!                          └──── auth failure ───> Closed <───┘ close / timeout /
//!                                                               integrity threshold
//! ```

use core::fmt;

use ring::agreement::{self, EphemeralPrivateKey, UnparsedPublicKey, X25519};
use ring::rand::SystemRandom;

use crate::error::{KnxError, Result};
use crate::knx_log;
use crate::protocol::constants::{ServiceType, SessionStatusCode};
use crate::protocol::frame::{Hpai, KnxnetIpFrame};
use crate::protocol::secure::{
    SessionAuthenticate, SessionRequest, SessionResponse, SessionStatus, PUBLIC_KEY_SIZE,
};
use crate::secure::channel::SecureChannel;
use crate::secure::keys::{handshake_mac, verify_handshake_mac, SessionKeys};
use crate::secure::SecureCredentials;

/// Lifecycle of a secure session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing sent yet
    Idle,
    /// Key exchange and authentication in progress
    Handshaking,
    /// Frames can be exchanged
    Established,
    /// Terminal; keys are wiped
    Closed,
}

/// Client secure session state machine
pub struct SecureSession {
    credentials: SecureCredentials,
    state: SessionState,
    ephemeral: Option<EphemeralPrivateKey>,
    client_public: [u8; PUBLIC_KEY_SIZE],
    channel: Option<SecureChannel>,
    timed_out: bool,
}

impl fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureSession")
            .field("user_id", &self.credentials.user_id)
            .field("state", &self.state)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl SecureSession {
    /// New idle session for `credentials`
    pub fn new(credentials: SecureCredentials) -> Self {
        Self {
            credentials,
            state: SessionState::Idle,
            ephemeral: None,
            client_public: [0; PUBLIC_KEY_SIZE],
            channel: None,
            timed_out: false,
        }
    }

    /// Current state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether frames can be exchanged
    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    /// Session id assigned by the server
    pub fn session_id(&self) -> Option<u16> {
        self.channel.as_ref().map(SecureChannel::session_id)
    }

    /// Wrapping state, once keys are agreed
    pub fn channel(&self) -> Option<&SecureChannel> {
        self.channel.as_ref()
    }

    /// Start the handshake (Idle → Handshaking), returning `SESSION_REQUEST`.
    pub fn request(&mut self) -> Result<Vec<u8>> {
        if self.state != SessionState::Idle {
            return Err(KnxError::InvalidState);
        }

        let rng = SystemRandom::new();
        let private = EphemeralPrivateKey::generate(&X25519, &rng)
            .map_err(|_| KnxError::authentication_failed())?;
        let public = private
            .compute_public_key()
            .map_err(|_| KnxError::authentication_failed())?;
        self.client_public.copy_from_slice(public.as_ref());
        self.ephemeral = Some(private);
        self.state = SessionState::Handshaking;

        knx_log!(debug, "Requesting secure session for user {}", self.credentials.user_id);
        SessionRequest {
            control_endpoint: Hpai::tcp_route_back(),
            public_key: self.client_public,
            user_id: self.credentials.user_id,
        }
        .build()
    }

    /// Handle the server's answer to `SESSION_REQUEST`, returning the wrapped
    /// `SESSION_AUTHENTICATE` to send.
    ///
    /// # Errors
    ///
    /// An authentication error if the server's MAC does not verify under the
    /// device authentication code or the server refuses the user. The
    /// session is closed on any error.
    pub fn handle_response(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        if self.state != SessionState::Handshaking || self.ephemeral.is_none() {
            return Err(KnxError::InvalidState);
        }
        let result = self.accept_response(frame);
        if result.is_err() {
            self.terminate();
        }
        result
    }

    fn accept_response(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        let parsed = KnxnetIpFrame::parse(frame)?;
        match parsed.service_type() {
            ServiceType::SessionResponse => {}
            ServiceType::SessionStatus => {
                let status = SessionStatus::parse(parsed.body())?;
                knx_log!(warn, "Secure session refused by server: {:?}", status.status);
                return Err(KnxError::authentication_failed());
            }
            _ => return Err(KnxError::invalid_frame()),
        }

        let response = SessionResponse::parse(parsed.body())?;
        let session_id = response.session_id.to_be_bytes();
        verify_handshake_mac(
            &self.credentials.device_authentication_code,
            &[parsed.header_bytes(), &session_id, &self.client_public, &response.public_key],
            &response.mac,
        )
        .inspect_err(|_| knx_log!(warn, "Server failed device authentication"))?;

        let private = self.ephemeral.take().ok_or(KnxError::InvalidState)?;
        let user_key = &self.credentials.user_key;
        let client_public = &self.client_public;
        let keys = agreement::agree_ephemeral(
            private,
            &UnparsedPublicKey::new(&X25519, &response.public_key),
            |shared| SessionKeys::derive(user_key, shared, client_public, &response.public_key),
        )
        .map_err(|_| KnxError::authentication_failed())??;

        let SessionKeys {
            client_to_server,
            server_to_client,
        } = keys;
        let mut channel = SecureChannel::new(
            response.session_id,
            self.credentials.serial,
            client_to_server,
            server_to_client,
        );

        let mac = handshake_mac(
            &self.credentials.user_key,
            &[
                &SessionAuthenticate::header(),
                &[self.credentials.user_id],
                &self.client_public,
                &response.public_key,
            ],
        )?;
        let authenticate = SessionAuthenticate {
            user_id: self.credentials.user_id,
            mac,
        }
        .build()?;
        let frame = channel.wrap(&authenticate)?;
        self.channel = Some(channel);
        knx_log!(debug, "Secure session {} keys agreed, authenticating", response.session_id);
        Ok(frame)
    }

    /// Handle the server's `SESSION_STATUS` (Handshaking → Established).
    ///
    /// # Errors
    ///
    /// An authentication error for any status other than success; the
    /// session is closed on any error.
    pub fn handle_status(&mut self, frame: &[u8]) -> Result<()> {
        if self.state != SessionState::Handshaking || self.channel.is_none() {
            return Err(KnxError::InvalidState);
        }
        let result = self.accept_status(frame);
        if result.is_err() {
            self.terminate();
        }
        result
    }

    fn accept_status(&mut self, frame: &[u8]) -> Result<()> {
        let parsed = KnxnetIpFrame::parse(frame)?;
        let status = match parsed.service_type() {
            ServiceType::SecureWrapper => {
                let channel = self.channel.as_mut().ok_or(KnxError::InvalidState)?;
                let inner = channel.unwrap_body(parsed.body())?;
                let inner = KnxnetIpFrame::parse(&inner)?;
                if inner.service_type() != ServiceType::SessionStatus {
                    return Err(KnxError::invalid_frame());
                }
                SessionStatus::parse(inner.body())?.status
            }
            ServiceType::SessionStatus => SessionStatus::parse(parsed.body())?.status,
            _ => return Err(KnxError::invalid_frame()),
        };

        if status != SessionStatusCode::AuthenticationSuccess {
            knx_log!(warn, "Secure session authentication rejected: {:?}", status);
            return Err(KnxError::authentication_failed());
        }
        self.state = SessionState::Established;
        knx_log!(info, "Secure session {:?} established", self.session_id());
        Ok(())
    }

    /// Wrap an inner KNXnet/IP frame for sending.
    pub fn wrap(&mut self, inner: &[u8]) -> Result<Vec<u8>> {
        if self.state != SessionState::Established {
            return Err(self.ended());
        }
        self.channel
            .as_mut()
            .ok_or_else(KnxError::session_closed)?
            .wrap(inner)
    }

    /// Verify and decrypt a received `SECURE_WRAPPER` frame.
    ///
    /// A wrapped `SESSION_STATUS` ending the session closes it and yields a
    /// session-closed error. Reaching the integrity failure threshold also
    /// closes the session; the triggering error is returned.
    pub fn unwrap_frame(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        if self.state != SessionState::Established {
            return Err(self.ended());
        }
        let channel = self.channel.as_mut().ok_or_else(KnxError::session_closed)?;

        let inner = match channel.unwrap_frame(frame) {
            Ok(inner) => inner,
            Err(err) => {
                if channel.is_exhausted() {
                    knx_log!(warn, "Too many integrity failures, closing secure session");
                    self.terminate();
                }
                return Err(err);
            }
        };

        let parsed = KnxnetIpFrame::parse(&inner)?;
        if parsed.service_type() == ServiceType::SessionStatus {
            let status = SessionStatus::parse(parsed.body())?.status;
            if status != SessionStatusCode::KeepAlive {
                knx_log!(info, "Secure session ended by server: {:?}", status);
                self.terminate();
                return Err(KnxError::session_closed());
            }
        }
        Ok(inner)
    }

    /// Close the session, returning a wrapped `SESSION_STATUS(CLOSE)` to send
    /// if it was established. Closing twice yields nothing.
    pub fn close(&mut self) -> Option<Vec<u8>> {
        if self.state == SessionState::Closed {
            return None;
        }
        let frame = match (self.state, self.channel.as_mut()) {
            (SessionState::Established, Some(channel)) => SessionStatus::new(SessionStatusCode::Close)
                .build()
                .and_then(|inner| channel.wrap(&inner))
                .ok(),
            _ => None,
        };
        self.terminate();
        frame
    }

    /// Close after a missed keep-alive acknowledgment
    pub fn expire(&mut self) {
        if self.state != SessionState::Closed {
            knx_log!(warn, "Secure session keep-alive timed out");
            self.terminate();
            self.timed_out = true;
        }
    }

    /// Error for use of a session that is not established
    fn ended(&self) -> KnxError {
        if self.timed_out {
            KnxError::session_timeout()
        } else {
            KnxError::session_closed()
        }
    }

    fn terminate(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.wipe();
        }
        self.ephemeral = None;
        self.state = SessionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure::channel::MAX_INTEGRITY_FAILURES;
    use crate::secure::keys::SecretKey;
    use crate::secure::responder::SessionResponder;

    const SERIAL: [u8; 6] = [0x00, 0xFA, 0x01, 0x02, 0x03, 0x04];

    fn credentials(device: u8) -> SecureCredentials {
        SecureCredentials::new(
            2,
            SecretKey::from_bytes([0x42; 16]),
            SecretKey::from_bytes([device; 16]),
            SERIAL,
        )
        .unwrap()
    }

    fn responder() -> SessionResponder {
        let mut responder = SessionResponder::new(SecretKey::from_bytes([0xDA; 16]), SERIAL);
        responder.add_user(2, SecretKey::from_bytes([0x42; 16]));
        responder
    }

    fn establish(session: &mut SecureSession, responder: &mut SessionResponder) -> Result<()> {
        let request = session.request()?;
        let response = responder.handle_request(&request)?;
        let authenticate = session.handle_response(&response)?;
        let status = responder.handle_authenticate(&authenticate)?;
        session.handle_status(&status)
    }

    #[test]
    fn test_matching_credentials_establish() {
        let mut session = SecureSession::new(credentials(0xDA));
        let mut responder = responder();
        establish(&mut session, &mut responder).unwrap();
        assert_eq!(session.state(), SessionState::Established);
        assert!(responder.is_established());
    }

    #[test]
    fn test_wrong_device_code_fails() {
        let mut session = SecureSession::new(credentials(0x01));
        let err = establish(&mut session, &mut responder()).unwrap_err();
        assert!(err.is_authentication_error());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.channel().is_none());
    }

    #[test]
    fn test_unknown_user_fails() {
        let mut session = SecureSession::new(credentials(0xDA));
        let mut responder = SessionResponder::new(SecretKey::from_bytes([0xDA; 16]), SERIAL);
        let err = establish(&mut session, &mut responder).unwrap_err();
        assert!(err.is_authentication_error());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_wrong_user_key_fails() {
        let mut session = SecureSession::new(credentials(0xDA));
        let mut responder = SessionResponder::new(SecretKey::from_bytes([0xDA; 16]), SERIAL);
        responder.add_user(2, SecretKey::from_bytes([0x43; 16]));
        let err = establish(&mut session, &mut responder).unwrap_err();
        assert!(err.is_authentication_error());
    }

    #[test]
    fn test_sequences_increase_without_gaps() {
        let mut session = SecureSession::new(credentials(0xDA));
        let mut responder = responder();
        establish(&mut session, &mut responder).unwrap();

        let inner = SessionStatus::new(SessionStatusCode::KeepAlive).build().unwrap();
        let start = session.channel().unwrap().send_sequence();
        for n in 0..10 {
            let frame = session.wrap(&inner).unwrap();
            assert_eq!(responder.unwrap_frame(&frame).unwrap(), inner);
            assert_eq!(responder.channel().unwrap().expected_sequence(), start + n + 1);
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut session = SecureSession::new(credentials(0xDA));
        let mut responder = responder();
        establish(&mut session, &mut responder).unwrap();
        let frame = session.close().unwrap();
        assert!(responder.unwrap_frame(&frame).unwrap_err().is_session_closed());
        assert!(session.close().is_none());
        assert!(session.wrap(&[0; 8]).is_err());
    }

    #[test]
    fn test_server_close_ends_session() {
        let mut session = SecureSession::new(credentials(0xDA));
        let mut responder = responder();
        establish(&mut session, &mut responder).unwrap();
        let close = responder.close().unwrap();
        assert!(session.unwrap_frame(&close).unwrap_err().is_session_closed());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_expired_session_reports_timeout() {
        let mut session = SecureSession::new(credentials(0xDA));
        let mut responder = responder();
        establish(&mut session, &mut responder).unwrap();
        session.expire();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.wrap(&[0; 8]).unwrap_err().is_session_timeout());
        assert!(session.close().is_none());
    }

    #[test]
    fn test_integrity_failures_close_session() {
        let mut session = SecureSession::new(credentials(0xDA));
        let mut responder = responder();
        establish(&mut session, &mut responder).unwrap();

        let inner = SessionStatus::new(SessionStatusCode::KeepAlive).build().unwrap();
        for n in 1..=MAX_INTEGRITY_FAILURES {
            let mut frame = responder.wrap(&inner).unwrap();
            let last = frame.len() - 1;
            frame[last] ^= 0xFF;
            assert!(session.unwrap_frame(&frame).unwrap_err().is_integrity_error());
            let expected = if n < MAX_INTEGRITY_FAILURES {
                SessionState::Established
            } else {
                SessionState::Closed
            };
            assert_eq!(session.state(), expected);
        }

        assert!(session.channel().is_none());
        let fresh = responder.wrap(&inner).unwrap();
        assert!(session.unwrap_frame(&fresh).unwrap_err().is_session_closed());
        assert!(session.wrap(&inner).unwrap_err().is_session_closed());
    }
}
