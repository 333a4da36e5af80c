//! Server side of a secure session.
//!
//! A [`SessionResponder`] answers `SESSION_REQUEST` and
//! `SESSION_AUTHENTICATE` for a KNXnet/IP server that knows its device
//! authentication code and the keys of its tunnel users. After
//! authentication it wraps and unwraps frames with the mirrored key pair.

use std::collections::HashMap;

use ring::agreement::{self, EphemeralPrivateKey, UnparsedPublicKey, X25519};
use ring::rand::SystemRandom;

use crate::error::{KnxError, Result};
use crate::knx_log;
use crate::protocol::constants::{ServiceType, SessionStatusCode};
use crate::protocol::frame::KnxnetIpFrame;
use crate::protocol::secure::{
    SessionAuthenticate, SessionRequest, SessionResponse, SessionStatus, PUBLIC_KEY_SIZE, SERIAL_SIZE,
};
use crate::secure::channel::SecureChannel;
use crate::secure::keys::{handshake_mac, verify_handshake_mac, SecretKey, SessionKeys};
use crate::secure::session::SessionState;

#[derive(Debug)]
struct PendingAuthentication {
    user_id: u8,
    user_key: SecretKey,
    client_public: [u8; PUBLIC_KEY_SIZE],
    server_public: [u8; PUBLIC_KEY_SIZE],
}

/// Server secure session state machine
#[derive(Debug)]
pub struct SessionResponder {
    device_authentication_code: SecretKey,
    serial: [u8; SERIAL_SIZE],
    users: HashMap<u8, SecretKey>,
    next_session_id: u16,
    state: SessionState,
    pending: Option<PendingAuthentication>,
    channel: Option<SecureChannel>,
}

impl SessionResponder {
    /// Responder for a server with the given device authentication code
    pub fn new(device_authentication_code: SecretKey, serial: [u8; SERIAL_SIZE]) -> Self {
        Self {
            device_authentication_code,
            serial,
            users: HashMap::new(),
            next_session_id: 1,
            state: SessionState::Idle,
            pending: None,
            channel: None,
        }
    }

    /// Register a tunnel user
    pub fn add_user(&mut self, user_id: u8, user_key: SecretKey) {
        self.users.insert(user_id, user_key);
    }

    /// Current state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the client has authenticated
    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    /// Wrapping state, once keys are agreed
    pub fn channel(&self) -> Option<&SecureChannel> {
        self.channel.as_ref()
    }

    /// Answer a `SESSION_REQUEST` frame.
    ///
    /// Unknown users get a plain `SESSION_STATUS(UNAUTHENTICATED)` and the
    /// responder closes.
    pub fn handle_request(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        if self.state != SessionState::Idle {
            return Err(KnxError::InvalidState);
        }
        let parsed = KnxnetIpFrame::parse(frame)?;
        if parsed.service_type() != ServiceType::SessionRequest {
            return Err(KnxError::invalid_frame());
        }
        let request = SessionRequest::parse(parsed.body())?;

        let Some(user_key) = self.users.get(&request.user_id).cloned() else {
            knx_log!(warn, "Session request for unknown user {}", request.user_id);
            self.terminate();
            return SessionStatus::new(SessionStatusCode::Unauthenticated).build();
        };

        let rng = SystemRandom::new();
        let private = EphemeralPrivateKey::generate(&X25519, &rng)
            .map_err(|_| KnxError::authentication_failed())?;
        let mut server_public = [0u8; PUBLIC_KEY_SIZE];
        server_public.copy_from_slice(
            private
                .compute_public_key()
                .map_err(|_| KnxError::authentication_failed())?
                .as_ref(),
        );

        let keys = agreement::agree_ephemeral(
            private,
            &UnparsedPublicKey::new(&X25519, &request.public_key),
            |shared| SessionKeys::derive(&user_key, shared, &request.public_key, &server_public),
        )
        .map_err(|_| KnxError::authentication_failed())??;

        let session_id = self.next_session_id;
        self.next_session_id = self.next_session_id.wrapping_add(1).max(1);
        let mac = handshake_mac(
            &self.device_authentication_code,
            &[
                &SessionResponse::header(),
                &session_id.to_be_bytes(),
                &request.public_key,
                &server_public,
            ],
        )?;

        let SessionKeys {
            client_to_server,
            server_to_client,
        } = keys;
        self.channel = Some(SecureChannel::new(
            session_id,
            self.serial,
            server_to_client,
            client_to_server,
        ));
        self.pending = Some(PendingAuthentication {
            user_id: request.user_id,
            user_key,
            client_public: request.public_key,
            server_public,
        });
        self.state = SessionState::Handshaking;

        knx_log!(debug, "Offering secure session {} to user {}", session_id, request.user_id);
        SessionResponse {
            session_id,
            public_key: server_public,
            mac,
        }
        .build()
    }

    /// Answer a wrapped `SESSION_AUTHENTICATE` frame with a `SESSION_STATUS`.
    ///
    /// A frame that does not decrypt (the client derived other keys) gets a
    /// plain `AUTH_FAILED`; a wrong MAC gets a wrapped one. Either way the
    /// responder closes.
    pub fn handle_authenticate(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        if self.state != SessionState::Handshaking {
            return Err(KnxError::InvalidState);
        }
        let (Some(channel), Some(pending)) = (self.channel.as_mut(), self.pending.take()) else {
            return Err(KnxError::InvalidState);
        };

        let Ok(inner) = channel.unwrap_frame(frame) else {
            knx_log!(warn, "Session authenticate did not decrypt");
            self.terminate();
            return SessionStatus::new(SessionStatusCode::AuthenticationFailed).build();
        };

        let verified = KnxnetIpFrame::parse(&inner).and_then(|parsed| {
            if parsed.service_type() != ServiceType::SessionAuthenticate {
                return Err(KnxError::invalid_frame());
            }
            let authenticate = SessionAuthenticate::parse(parsed.body())?;
            if authenticate.user_id != pending.user_id {
                return Err(KnxError::authentication_failed());
            }
            verify_handshake_mac(
                &pending.user_key,
                &[
                    &SessionAuthenticate::header(),
                    &[authenticate.user_id],
                    &pending.client_public,
                    &pending.server_public,
                ],
                &authenticate.mac,
            )
        });

        let status = if verified.is_ok() {
            SessionStatusCode::AuthenticationSuccess
        } else {
            SessionStatusCode::AuthenticationFailed
        };
        let reply = channel.wrap(&SessionStatus::new(status).build()?)?;

        if verified.is_ok() {
            self.state = SessionState::Established;
            knx_log!(info, "User {} authenticated", pending.user_id);
        } else {
            knx_log!(warn, "User {} failed authentication", pending.user_id);
            self.terminate();
        }
        Ok(reply)
    }

    /// Wrap an inner frame for the client
    pub fn wrap(&mut self, inner: &[u8]) -> Result<Vec<u8>> {
        match (self.state, self.channel.as_mut()) {
            (SessionState::Established, Some(channel)) => channel.wrap(inner),
            _ => Err(KnxError::session_closed()),
        }
    }

    /// Verify and decrypt a frame from the client.
    ///
    /// A wrapped `SESSION_STATUS(CLOSE)` ends the session with a
    /// session-closed error.
    pub fn unwrap_frame(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        let channel = match (self.state, self.channel.as_mut()) {
            (SessionState::Established, Some(channel)) => channel,
            _ => return Err(KnxError::session_closed()),
        };
        let inner = channel.unwrap_frame(frame)?;

        let parsed = KnxnetIpFrame::parse(&inner)?;
        if parsed.service_type() == ServiceType::SessionStatus
            && SessionStatus::parse(parsed.body())?.status == SessionStatusCode::Close
        {
            knx_log!(info, "Client closed secure session");
            self.terminate();
            return Err(KnxError::session_closed());
        }
        Ok(inner)
    }

    /// Close the session, returning a wrapped `SESSION_STATUS(CLOSE)` if it
    /// was established.
    pub fn close(&mut self) -> Option<Vec<u8>> {
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

    fn terminate(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.wipe();
        }
        self.pending = None;
        self.state = SessionState::Closed;
    }
}
