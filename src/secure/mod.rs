//! KNX IP Secure sessions.
//!
//! A secure session authenticates a tunnel user against a KNXnet/IP server
//! and then protects every frame with AES-128-GCM:
//!
//! 1. Both passwords are stretched into keys ([`keys`]).
//! 2. The client and server exchange ephemeral X25519 keys. The server
//!    proves knowledge of the device authentication code, the client proves
//!    knowledge of the user key ([`session`], [`responder`]).
//! 3. Frames travel inside `SECURE_WRAPPER`s with strictly increasing
//!    sequence numbers ([`channel`]).
//!
//! Key material lives in [`SecretKey`](keys::SecretKey) values that are wiped
//! on drop, so every exit path of a session clears its keys.

pub mod channel;
pub mod keyring;
pub mod keys;
pub mod responder;
pub mod session;

pub use channel::{SecureChannel, MAX_INTEGRITY_FAILURES, RECEIVE_WINDOW};
pub use keyring::{KeyId, Keyring};
pub use keys::{SecretKey, SessionKeys};
pub use responder::SessionResponder;
pub use session::{SecureSession, SessionState};

use crate::error::{KnxError, Result};
use crate::protocol::secure::SERIAL_SIZE;

/// Highest tunnel user id
pub const MAX_USER_ID: u8 = 127;

/// Credentials a client needs to open a secure session
#[derive(Debug, Clone)]
pub struct SecureCredentials {
    /// Tunnel user (1-127)
    pub user_id: u8,
    /// Key of the tunnel user
    pub user_key: SecretKey,
    /// Device authentication code of the server
    pub device_authentication_code: SecretKey,
    /// Serial number carried in wrapped frames
    pub serial: [u8; SERIAL_SIZE],
}

impl SecureCredentials {
    /// Credentials from already derived keys
    pub fn new(
        user_id: u8,
        user_key: SecretKey,
        device_authentication_code: SecretKey,
        serial: [u8; SERIAL_SIZE],
    ) -> Result<Self> {
        if !(1..=MAX_USER_ID).contains(&user_id) {
            return Err(KnxError::InvalidState);
        }
        Ok(Self {
            user_id,
            user_key,
            device_authentication_code,
            serial,
        })
    }

    /// Credentials from the user and device passwords.
    ///
    /// The passwords are only used for key derivation and are not kept.
    pub fn from_passwords(
        user_id: u8,
        user_password: &str,
        device_password: &str,
        serial: [u8; SERIAL_SIZE],
    ) -> Result<Self> {
        Self::new(
            user_id,
            keys::user_key(user_password),
            keys::device_authentication_code(device_password),
            serial,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_bounds() {
        let key = || SecretKey::from_bytes([1; 16]);
        assert!(SecureCredentials::new(0, key(), key(), [0; 6]).is_err());
        assert!(SecureCredentials::new(128, key(), key(), [0; 6]).is_err());
        assert!(SecureCredentials::new(127, key(), key(), [0; 6]).is_ok());
    }
}
