//! KNX Individual Address.
//!
//! Individual addresses identify one physical device on the bus.
//! Format: Area.Line.Device (e.g., 1.1.5)
//! - Area: 0-15 (4 bits)
//! - Line: 0-15 (4 bits)
//! - Device: 0-255 (8 bits)

use crate::error::{KnxError, Result};
use core::fmt;
use serde::{Deserialize, Serialize};

/// KNX Individual Address (Area.Line.Device)
///
/// ```
/// use knx_link::IndividualAddress;
///
/// let addr = IndividualAddress::new(1, 1, 5)?;
/// assert_eq!(addr.to_string(), "1.1.5");
/// assert_eq!(addr, "1.1.5".parse()?);
/// # Ok::<(), knx_link::KnxError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub struct IndividualAddress {
    raw: u16,
}

impl IndividualAddress {
    /// Maximum area value (4 bits)
    pub const MAX_AREA: u8 = 15;
    /// Maximum line value (4 bits)
    pub const MAX_LINE: u8 = 15;

    /// Create an address from its components.
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self> {
        if area > Self::MAX_AREA || line > Self::MAX_LINE {
            return Err(KnxError::address_out_of_range());
        }
        let raw = (u16::from(area) << 12) | (u16::from(line) << 8) | u16::from(device);
        Ok(Self { raw })
    }

    /// Raw 16-bit value.
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Area component (0-15).
    #[inline(always)]
    pub const fn area(self) -> u8 {
        ((self.raw >> 12) & 0x0F) as u8
    }

    /// Line component (0-15).
    #[inline(always)]
    pub const fn line(self) -> u8 {
        ((self.raw >> 8) & 0x0F) as u8
    }

    /// Device component (0-255).
    #[inline(always)]
    pub const fn device(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Big-endian wire representation.
    #[inline]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.raw.to_be_bytes()
    }

    /// Read an address from the first two bytes of `buf`.
    pub fn from_slice(buf: &[u8]) -> Result<Self> {
        match buf {
            [hi, lo, ..] => Ok(Self::from(u16::from_be_bytes([*hi, *lo]))),
            _ => Err(KnxError::invalid_frame()),
        }
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl From<u16> for IndividualAddress {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<IndividualAddress> for u16 {
    #[inline(always)]
    fn from(addr: IndividualAddress) -> u16 {
        addr.raw
    }
}

impl core::str::FromStr for IndividualAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.').map(|p| p.parse::<u8>().ok());
        let (Some(Some(area)), Some(Some(line)), Some(Some(device)), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(KnxError::invalid_individual_address());
        };
        Self::new(area, line, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_valid() {
        let addr = IndividualAddress::new(1, 2, 3).unwrap();
        assert_eq!(addr.raw(), 0x1203);
        assert_eq!((addr.area(), addr.line(), addr.device()), (1, 2, 3));
    }

    #[test]
    fn test_new_invalid() {
        assert!(IndividualAddress::new(16, 0, 0).is_err());
        assert!(IndividualAddress::new(0, 16, 0).is_err());
    }

    #[test]
    fn test_display_and_parse() {
        let addr: IndividualAddress = "15.15.255".parse().unwrap();
        assert_eq!(addr.raw(), 0xFFFF);
        assert_eq!(addr.to_string(), "15.15.255");
    }

    #[test]
    fn test_from_str_invalid() {
        for input in ["", "1.2", "1.2.3.4", "a.b.c", "16.0.0", "1.1.256"] {
            assert!(input.parse::<IndividualAddress>().is_err(), "{input} should fail");
        }
    }
}
