//! Password-protected keyring files.
//!
//! ## File Format
//!
//! ```text
//! ┌──────────────┬───────────┬────────────┬──────────────────────────────┐
//! │ "KNXKEYS1"   │ Salt (16) │ Nonce (12) │ AES-128-GCM(bincode record)  │
//! └──────────────┴───────────┴────────────┴──────────────────────────────┘
//! ```
//!
//! The file key is PBKDF2-HMAC-SHA256 of the keyring password with the salt.
//! A keyring is read-only once loaded. One keyring per process can be
//! installed as the default installation.

use std::collections::BTreeMap;
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use once_cell::sync::OnceCell;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::error::{KnxError, Result};
use crate::knx_log;
use crate::protocol::secure::SERIAL_SIZE;
use crate::secure::keys::{wipe_bytes, SecretKey};
use crate::secure::SecureCredentials;

const MAGIC: &[u8; 8] = b"KNXKEYS1";
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const PREFIX_SIZE: usize = MAGIC.len() + SALT_SIZE + NONCE_SIZE;

static DEFAULT_INSTALLATION: OnceCell<Keyring> = OnceCell::new();

/// Identifies one entry of a keyring
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyId {
    /// Backbone key of the installation
    Backbone,
    /// Key of a secured group address
    Group(GroupAddress),
    /// Device authentication code of a KNXnet/IP server
    DeviceAuthentication(IndividualAddress),
    /// Key of tunnel user `user_id` on the interfaces of server `device`
    Interface { device: IndividualAddress, user_id: u8 },
}

#[derive(Serialize, Deserialize)]
struct KeyringRecord {
    entries: Vec<(KeyId, Vec<u8>)>,
}

/// Key material of one installation
#[derive(Default)]
pub struct Keyring {
    entries: BTreeMap<KeyId, Vec<u8>>,
}

impl core::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Keyring")
            .field("ids", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for Keyring {
    fn drop(&mut self) {
        for key in self.entries.values_mut() {
            wipe_bytes(key);
        }
    }
}

impl Keyring {
    /// Empty keyring
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry (builder style, before saving)
    #[must_use]
    pub fn with_key(mut self, id: KeyId, key: &[u8]) -> Self {
        self.entries.insert(id, key.to_vec());
        self
    }

    /// Key material stored under `id`
    pub fn get(&self, id: &KeyId) -> Option<&[u8]> {
        self.entries.get(id).map(Vec::as_slice)
    }

    /// Stored ids in order
    pub fn ids(&self) -> impl Iterator<Item = &KeyId> {
        self.entries.keys()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the keyring has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decrypt a keyring from its file contents.
    ///
    /// # Errors
    ///
    /// A keyring error if the bytes are not a keyring or the password is
    /// wrong.
    pub fn from_bytes(bytes: &[u8], password: &str) -> Result<Self> {
        if bytes.len() < PREFIX_SIZE || !bytes.starts_with(MAGIC) {
            return Err(KnxError::keyring_format());
        }
        let salt = &bytes[MAGIC.len()..MAGIC.len() + SALT_SIZE];
        let nonce = &bytes[MAGIC.len() + SALT_SIZE..PREFIX_SIZE];

        let file_key = SecretKey::derive(password, salt);
        let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(file_key.as_bytes()));
        let mut plain = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: &bytes[PREFIX_SIZE..],
                    aad: &bytes[..MAGIC.len() + SALT_SIZE],
                },
            )
            .map_err(|_| KnxError::keyring_password())?;

        let record: core::result::Result<KeyringRecord, _> = bincode::deserialize(&plain);
        wipe_bytes(&mut plain);
        let record = record.map_err(|_| KnxError::keyring_format())?;

        let keyring = Self {
            entries: record.entries.into_iter().collect(),
        };
        knx_log!(info, "Loaded keyring with {} entries", keyring.len());
        Ok(keyring)
    }

    /// Encrypt the keyring under `password` with a fresh salt and nonce.
    pub fn to_bytes(&self, password: &str) -> Result<Vec<u8>> {
        let rng = SystemRandom::new();
        let mut prefix = [0u8; PREFIX_SIZE];
        prefix[..MAGIC.len()].copy_from_slice(MAGIC);
        rng.fill(&mut prefix[MAGIC.len()..])
            .map_err(|_| KnxError::keyring_format())?;

        let mut record = KeyringRecord {
            entries: self.entries.iter().map(|(id, key)| (*id, key.clone())).collect(),
        };
        let mut plain = bincode::serialize(&record).map_err(|_| KnxError::keyring_format())?;
        for (_, key) in &mut record.entries {
            wipe_bytes(key);
        }

        let file_key = SecretKey::derive(password, &prefix[MAGIC.len()..MAGIC.len() + SALT_SIZE]);
        let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(file_key.as_bytes()));
        let sealed = cipher.encrypt(
            Nonce::from_slice(&prefix[MAGIC.len() + SALT_SIZE..]),
            Payload {
                msg: &plain,
                aad: &prefix[..MAGIC.len() + SALT_SIZE],
            },
        );
        wipe_bytes(&mut plain);
        let sealed = sealed.map_err(|_| KnxError::keyring_format())?;

        let mut bytes = Vec::with_capacity(PREFIX_SIZE + sealed.len());
        bytes.extend_from_slice(&prefix);
        bytes.extend_from_slice(&sealed);
        Ok(bytes)
    }

    /// Load and decrypt a keyring file
    pub fn load(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(KnxError::keyring_io)?;
        Self::from_bytes(&bytes, password)
    }

    /// Encrypt and write a keyring file
    pub fn save(&self, path: impl AsRef<Path>, password: &str) -> Result<()> {
        std::fs::write(path, self.to_bytes(password)?).map_err(KnxError::keyring_io)
    }
}

/// Install the process-wide default keyring.
///
/// # Errors
///
/// `InvalidState` if a default installation was already set.
pub fn use_default_installation(keyring: Keyring) -> Result<()> {
    DEFAULT_INSTALLATION
        .set(keyring)
        .map_err(|_| KnxError::InvalidState)
}

/// The process-wide default keyring, if one was installed
pub fn default_installation() -> Option<&'static Keyring> {
    DEFAULT_INSTALLATION.get()
}

impl SecureCredentials {
    /// Credentials for tunnel user `user_id` of server `device`, taken from
    /// `keyring`.
    pub fn from_keyring(
        keyring: &Keyring,
        device: IndividualAddress,
        user_id: u8,
        serial: [u8; SERIAL_SIZE],
    ) -> Result<Self> {
        let device_code = keyring
            .get(&KeyId::DeviceAuthentication(device))
            .ok_or_else(KnxError::keyring_missing_key)?;
        let user_key = keyring
            .get(&KeyId::Interface { device, user_id })
            .ok_or_else(KnxError::keyring_missing_key)?;
        Self::new(
            user_id,
            SecretKey::from_slice(user_key)?,
            SecretKey::from_slice(device_code)?,
            serial,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Keyring {
        Keyring::new()
            .with_key(KeyId::Backbone, &[0xBB; 16])
            .with_key(KeyId::Group(GroupAddress::from(0x0803)), &[0x01; 16])
            .with_key(KeyId::DeviceAuthentication(IndividualAddress::from(0x11FF)), &[0xDA; 16])
            .with_key(
                KeyId::Interface {
                    device: IndividualAddress::from(0x11FF),
                    user_id: 2,
                },
                &[0x42; 16],
            )
    }

    #[test]
    fn test_round_trip_preserves_entries() {
        let bytes = sample().to_bytes("keyring-password").unwrap();
        assert!(bytes.starts_with(MAGIC));
        let loaded = Keyring::from_bytes(&bytes, "keyring-password").unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.get(&KeyId::Backbone), Some(&[0xBB; 16][..]));
        let other_user = KeyId::Interface {
            device: IndividualAddress::from(0x11FF),
            user_id: 3,
        };
        assert_eq!(loaded.get(&other_user), None);
    }

    #[test]
    fn test_wrong_password() {
        let bytes = sample().to_bytes("right").unwrap();
        let err = Keyring::from_bytes(&bytes, "wrong").unwrap_err();
        assert!(matches!(err, KnxError::Keyring(ref e) if e.is_wrong_password()));
    }

    #[test]
    fn test_not_a_keyring() {
        assert!(Keyring::from_bytes(b"KNXKEYS0", "x").unwrap_err().is_keyring_error());
        assert!(Keyring::from_bytes(&[0; 64], "x").unwrap_err().is_keyring_error());
    }

    #[test]
    fn test_credentials_from_keyring() {
        let keyring = sample();
        let device = IndividualAddress::from(0x11FF);
        let credentials = SecureCredentials::from_keyring(&keyring, device, 2, [0; 6]).unwrap();
        assert_eq!(credentials.user_key.as_bytes(), &[0x42; 16]);
        let err = SecureCredentials::from_keyring(&keyring, device, 9, [0; 6]).unwrap_err();
        assert!(matches!(err, KnxError::Keyring(ref e) if e.is_missing_key()));
    }

    #[test]
    fn test_users_belong_to_their_interface() {
        let first = IndividualAddress::from(0x11FF);
        let second = IndividualAddress::from(0x12FF);
        let keyring = Keyring::new()
            .with_key(KeyId::DeviceAuthentication(first), &[0xDA; 16])
            .with_key(KeyId::DeviceAuthentication(second), &[0xDB; 16])
            .with_key(KeyId::Interface { device: first, user_id: 2 }, &[0x42; 16])
            .with_key(KeyId::Interface { device: second, user_id: 2 }, &[0x24; 16]);
        let loaded = Keyring::from_bytes(&keyring.to_bytes("pw").unwrap(), "pw").unwrap();
        assert_eq!(loaded.len(), 4);

        let credentials = SecureCredentials::from_keyring(&loaded, first, 2, [0; 6]).unwrap();
        assert_eq!(credentials.user_key.as_bytes(), &[0x42; 16]);
        assert_eq!(credentials.device_authentication_code.as_bytes(), &[0xDA; 16]);

        let credentials = SecureCredentials::from_keyring(&loaded, second, 2, [0; 6]).unwrap();
        assert_eq!(credentials.user_key.as_bytes(), &[0x24; 16]);
        assert_eq!(credentials.device_authentication_code.as_bytes(), &[0xDB; 16]);
    }

    #[test]
    fn test_user_of_other_device_is_missing() {
        let keyring = Keyring::new()
            .with_key(KeyId::DeviceAuthentication(IndividualAddress::from(0x12FF)), &[0xDB; 16])
            .with_key(
                KeyId::Interface {
                    device: IndividualAddress::from(0x11FF),
                    user_id: 2,
                },
                &[0x42; 16],
            );
        let err = SecureCredentials::from_keyring(&keyring, IndividualAddress::from(0x12FF), 2, [0; 6]).unwrap_err();
        assert!(matches!(err, KnxError::Keyring(ref e) if e.is_missing_key()));
    }

    #[test]
    fn test_default_installation_once() {
        use_default_installation(sample()).unwrap();
        assert!(default_installation().is_some());
        assert!(matches!(use_default_installation(Keyring::new()), Err(KnxError::InvalidState)));
        assert_eq!(default_installation().map(Keyring::len), Some(4));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Keyring::load("/nonexistent/installation.keys", "x").unwrap_err();
        assert!(err.is_keyring_error());
    }
}
