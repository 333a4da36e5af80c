//! Link configuration.
//!
//! [`LinkConfig`] can be built in code or read from `KEY=VALUE` text, one
//! entry per line:
//!
//! ```text
//! KNX_MEDIUM=tunneling
//! KNX_INDIVIDUAL_ADDRESS=1.1.250
//! KNX_USER_ID=2
//! KNX_USER_PASSWORD=user-secret
//! KNX_DEVICE_PASSWORD=device-secret
//! KNX_SERIAL=00FA12345678
//! KNX_CONNECT_TIMEOUT_MS=5000
//! KNX_RESPONSE_TIMEOUT_MS=3000
//! KNX_KEEP_ALIVE_INTERVAL_MS=60000
//! KNX_KEEP_ALIVE_TIMEOUT_MS=10000
//! ```
//!
//! Passwords are turned into keys as soon as their line is read; the
//! configuration never holds them.

use core::str::FromStr;
use core::time::Duration;

use crate::addressing::IndividualAddress;
use crate::error::{KnxError, Result};
use crate::knx_log;
use crate::protocol::secure::SERIAL_SIZE;
use crate::secure::keys::{self, SecretKey};
use crate::secure::SecureCredentials;

/// How the link reaches the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Medium {
    /// KNXnet/IP tunneling (point-to-point with a server)
    #[default]
    Tunneling,
    /// KNXnet/IP routing (multicast, no connection)
    Routing,
}

impl FromStr for Medium {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tunneling" | "tunnelling" | "tunnel" => Ok(Self::Tunneling),
            "routing" | "router" => Ok(Self::Routing),
            _ => Err(KnxError::invalid_config("KNX_MEDIUM")),
        }
    }
}

/// Settings of a [`NetworkLink`](crate::link::NetworkLink)
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Tunneling or routing
    pub medium: Medium,
    /// Source address used until the server assigns one
    pub individual_address: IndividualAddress,
    /// Secure session credentials; `None` for a plain link
    pub security: Option<SecureCredentials>,
    /// Bound for each handshake and connect step
    pub connect_timeout: Duration,
    /// Bound for read responses
    pub response_timeout: Duration,
    /// Period of keep-alive requests
    pub keep_alive_interval: Duration,
    /// Bound for a keep-alive acknowledgment
    pub keep_alive_timeout: Duration,
    /// Capacity of the event channel
    pub event_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            medium: Medium::Tunneling,
            individual_address: IndividualAddress::from(0xFFFF),
            security: None,
            connect_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(3),
            keep_alive_interval: Duration::from_secs(60),
            keep_alive_timeout: Duration::from_secs(10),
            event_capacity: 64,
        }
    }
}

impl LinkConfig {
    /// Plain tunneling with default timeouts
    pub fn tunneling() -> Self {
        Self::default()
    }

    /// Routing with default timeouts
    pub fn routing() -> Self {
        Self {
            medium: Medium::Routing,
            ..Self::default()
        }
    }

    /// Set the source address
    #[must_use]
    pub fn with_individual_address(mut self, address: IndividualAddress) -> Self {
        self.individual_address = address;
        self
    }

    /// Run the link over a secure session
    #[must_use]
    pub fn with_security(mut self, credentials: SecureCredentials) -> Self {
        self.security = Some(credentials);
        self
    }

    /// Set the connect and handshake timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read response timeout
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set keep-alive period and acknowledgment timeout
    #[must_use]
    pub fn with_keep_alive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.keep_alive_interval = interval;
        self.keep_alive_timeout = timeout;
        self
    }

    /// Set the event channel capacity
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Whether a secure session will be established
    pub fn is_secure(&self) -> bool {
        self.security.is_some()
    }

    /// Parse `KEY=VALUE` lines on top of the defaults.
    ///
    /// Blank lines and lines starting with `#` are skipped; unknown keys are
    /// ignored with a warning. Security is enabled when a user password is
    /// present and then requires the device password too.
    ///
    /// # Errors
    ///
    /// A configuration error naming the first key whose value is invalid, or
    /// the number of a line without `=`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut user_id: u8 = 1;
        let mut user_key: Option<SecretKey> = None;
        let mut device_code: Option<SecretKey> = None;
        let mut serial = [0u8; SERIAL_SIZE];

        for (number, line) in text.lines().map(str::trim).enumerate() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            // Name the line, never its text: it may hold a password
            let Some((key, value)) = line.split_once('=') else {
                return Err(KnxError::invalid_config(&format!("line {}", number + 1)));
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "KNX_MEDIUM" => config.medium = value.parse()?,
                "KNX_INDIVIDUAL_ADDRESS" => {
                    config.individual_address = value.parse().map_err(|_| KnxError::invalid_config(key))?;
                }
                "KNX_USER_ID" => user_id = value.parse().map_err(|_| KnxError::invalid_config(key))?,
                "KNX_USER_PASSWORD" => user_key = Some(keys::user_key(value)),
                "KNX_DEVICE_PASSWORD" => device_code = Some(keys::device_authentication_code(value)),
                "KNX_SERIAL" => serial = parse_serial(value).ok_or_else(|| KnxError::invalid_config(key))?,
                "KNX_CONNECT_TIMEOUT_MS" => config.connect_timeout = parse_millis(key, value)?,
                "KNX_RESPONSE_TIMEOUT_MS" => config.response_timeout = parse_millis(key, value)?,
                "KNX_KEEP_ALIVE_INTERVAL_MS" => config.keep_alive_interval = parse_millis(key, value)?,
                "KNX_KEEP_ALIVE_TIMEOUT_MS" => config.keep_alive_timeout = parse_millis(key, value)?,
                _ => knx_log!(warn, "Ignoring unknown configuration key {}", key),
            }
        }

        match (user_key, device_code) {
            (Some(user_key), Some(device_code)) => {
                let credentials = SecureCredentials::new(user_id, user_key, device_code, serial)
                    .map_err(|_| KnxError::invalid_config("KNX_USER_ID"))?;
                config.security = Some(credentials);
            }
            (Some(_), None) => return Err(KnxError::invalid_config("KNX_DEVICE_PASSWORD")),
            (None, Some(_)) => return Err(KnxError::invalid_config("KNX_USER_PASSWORD")),
            (None, None) => {}
        }
        Ok(config)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| KnxError::invalid_config(key))
}

/// Serial number as 12 hex digits, optionally separated by `:`
fn parse_serial(value: &str) -> Option<[u8; SERIAL_SIZE]> {
    let digits: String = value.chars().filter(|c| *c != ':').collect();
    if digits.len() != 2 * SERIAL_SIZE {
        return None;
    }
    let mut serial = [0u8; SERIAL_SIZE];
    for (i, byte) in serial.iter_mut().enumerate() {
        *byte = u8::from_str_radix(digits.get(2 * i..2 * i + 2)?, 16).ok()?;
    }
    Some(serial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.medium, Medium::Tunneling);
        assert!(!config.is_secure());
        assert_eq!(config.response_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_parse_plain() {
        let config = LinkConfig::parse(
            "# plain tunnel\nKNX_MEDIUM=routing\nKNX_INDIVIDUAL_ADDRESS=1.1.7\n\nKNX_RESPONSE_TIMEOUT_MS=250\n",
        )
        .unwrap();
        assert_eq!(config.medium, Medium::Routing);
        assert_eq!(config.individual_address.to_string(), "1.1.7");
        assert_eq!(config.response_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_secure() {
        let config = LinkConfig::parse(
            "KNX_USER_ID=3\nKNX_USER_PASSWORD=user\nKNX_DEVICE_PASSWORD=device\nKNX_SERIAL=00:FA:12:34:56:78",
        )
        .unwrap();
        let security = config.security.unwrap();
        assert_eq!(security.user_id, 3);
        assert_eq!(security.serial, [0x00, 0xFA, 0x12, 0x34, 0x56, 0x78]);
        assert_eq!(security.user_key.as_bytes(), keys::user_key("user").as_bytes());
    }

    #[test]
    fn test_parse_errors_name_key() {
        let err = LinkConfig::parse("KNX_CONNECT_TIMEOUT_MS=soon").unwrap_err();
        assert!(matches!(err, KnxError::Config(ref e) if e.key() == "KNX_CONNECT_TIMEOUT_MS"));
        assert!(LinkConfig::parse("KNX_MEDIUM=usb").is_err());
        assert!(LinkConfig::parse("KNX_USER_PASSWORD=only-half").is_err());
        assert!(LinkConfig::parse("KNX_SERIAL=123").is_err());
        assert!(LinkConfig::parse("no separator").is_err());
    }

    #[test]
    fn test_malformed_line_is_not_echoed() {
        let text = "KNX_MEDIUM=tunneling\nKNX_USER_PASSWORD hunter2\n";
        let err = LinkConfig::parse(text).unwrap_err();
        assert!(matches!(err, KnxError::Config(ref e) if e.key() == "line 2"));
        assert!(!err.to_string().contains("hunter2"));
        assert!(!format!("{err:?}").contains("hunter2"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        assert!(LinkConfig::parse("WIFI_NETWORK=home").is_ok());
    }
}
