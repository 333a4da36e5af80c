//! Password-based key derivation and the session key schedule.
//!
//! Passwords are turned into keys with PBKDF2-HMAC-SHA256 (65 536
//! iterations, 16-byte output) salted with a protocol-versioned label, so the
//! same password always yields the same key. Handshake tags are
//! HMAC-SHA256 truncated to 16 bytes.

use core::fmt;
use core::num::NonZeroU32;
use core::sync::atomic::{compiler_fence, Ordering};

use hmac::{Hmac, Mac};
use ring::pbkdf2;
use sha2::Sha256;

use crate::error::{KnxError, Result};
use crate::protocol::secure::MAC_SIZE;

type HmacSha256 = Hmac<Sha256>;

/// Size of every symmetric key used by the secure session
pub const KEY_SIZE: usize = 16;

/// PBKDF2 iteration count
pub const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(65_536) {
    Some(n) => n,
    None => panic!("iteration count must be non-zero"),
};

const USER_PASSWORD_SALT: &[u8] = b"user-password.1.secure.ip.knx.org";
const DEVICE_AUTHENTICATION_SALT: &[u8] = b"device-authentication-code.1.secure.ip.knx.org";

/// Zero `bytes` with volatile writes the optimizer cannot elide.
pub(crate) fn wipe_bytes(bytes: &mut [u8]) {
    for byte in bytes.iter_mut() {
        // SAFETY: `byte` is a valid, aligned, exclusive reference to one u8.
        unsafe { core::ptr::write_volatile(byte, 0) };
    }
    compiler_fence(Ordering::SeqCst);
}

/// 128-bit key whose bytes are wiped when it is dropped.
#[derive(Clone)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    /// Wrap raw key bytes
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Wrap raw key bytes from a slice of exactly [`KEY_SIZE`] bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| KnxError::keyring_format())?;
        Ok(Self(bytes))
    }

    /// Key bytes
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Derive a key from `password` with PBKDF2-HMAC-SHA256.
    pub fn derive(password: &str, salt: &[u8]) -> Self {
        let mut key = [0u8; KEY_SIZE];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            PBKDF2_ITERATIONS,
            salt,
            password.as_bytes(),
            &mut key,
        );
        Self(key)
    }

    /// Overwrite the key bytes with zeros
    pub fn wipe(&mut self) {
        wipe_bytes(&mut self.0);
    }

    /// Whether the key has been wiped
    pub fn is_wiped(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// User key of a tunnel user, derived from its password
pub fn user_key(password: &str) -> SecretKey {
    SecretKey::derive(password, USER_PASSWORD_SALT)
}

/// Device authentication code, derived from the device password
pub fn device_authentication_code(password: &str) -> SecretKey {
    SecretKey::derive(password, DEVICE_AUTHENTICATION_SALT)
}

fn keyed(key: &[u8], parts: &[&[u8]]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| KnxError::authentication_failed())?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac)
}

/// HMAC-SHA256 over the concatenated `parts`, truncated to 16 bytes
pub fn handshake_mac(key: &SecretKey, parts: &[&[u8]]) -> Result<[u8; MAC_SIZE]> {
    let digest = keyed(key.as_bytes(), parts)?.finalize().into_bytes();
    let mut mac = [0u8; MAC_SIZE];
    mac.copy_from_slice(&digest[..MAC_SIZE]);
    Ok(mac)
}

/// Constant-time check of a truncated handshake MAC
pub fn verify_handshake_mac(key: &SecretKey, parts: &[&[u8]], tag: &[u8]) -> Result<()> {
    if tag.len() != MAC_SIZE {
        return Err(KnxError::authentication_failed());
    }
    keyed(key.as_bytes(), parts)?
        .verify_truncated_left(tag)
        .map_err(|_| KnxError::authentication_failed())
}

/// Per-direction keys of an established session
#[derive(Debug, Clone)]
pub struct SessionKeys {
    /// Protects client → server frames
    pub client_to_server: SecretKey,
    /// Protects server → client frames
    pub server_to_client: SecretKey,
}

impl SessionKeys {
    /// Derive both keys from the X25519 shared secret.
    ///
    /// Material is HMAC-SHA256(user key, shared ‖ client public ‖ server
    /// public); the first half protects client frames, the second half
    /// server frames.
    pub fn derive(
        user_key: &SecretKey,
        shared_secret: &[u8],
        client_public: &[u8],
        server_public: &[u8],
    ) -> Result<Self> {
        let mut material = keyed(
            user_key.as_bytes(),
            &[shared_secret, client_public, server_public],
        )?
        .finalize()
        .into_bytes();

        let mut client_to_server = [0u8; KEY_SIZE];
        let mut server_to_client = [0u8; KEY_SIZE];
        client_to_server.copy_from_slice(&material[..KEY_SIZE]);
        server_to_client.copy_from_slice(&material[KEY_SIZE..]);
        wipe_bytes(material.as_mut_slice());

        Ok(Self {
            client_to_server: SecretKey(client_to_server),
            server_to_client: SecretKey(server_to_client),
        })
    }

    /// Wipe both keys
    pub fn wipe(&mut self) {
        self.client_to_server.wipe();
        self.server_to_client.wipe();
    }
}
