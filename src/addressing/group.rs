//! KNX Group Address.
//!
//! Group addresses name a communication object shared by any number of
//! devices. Two notations exist for the same 16-bit value:
//! - 3-level: Main/Middle/Sub (e.g., 1/0/3), the common ETS style
//! - 2-level: Main/Sub (e.g., 1/3)
//!
//! Bit layout: `MMMMM III SSSSSSSS` (main 5 bits, middle 3 bits, sub 8 bits);
//! the 2-level form uses the low 11 bits as one sub group.

use crate::error::{KnxError, Result};
use core::fmt;
use serde::{Deserialize, Serialize};

/// KNX Group Address.
///
/// Equality, ordering and hashing are defined on the encoded 16-bit value,
/// so `1/0/3` and `1/3` are the same address.
///
/// # Examples
///
/// ```
/// use knx_link::GroupAddress;
///
/// let addr = GroupAddress::new(1, 0, 3)?;
/// assert_eq!(addr.to_string(), "1/0/3");
/// assert_eq!(addr.to_string_2level(), "1/3");
///
/// let parsed: GroupAddress = "1/3".parse()?;
/// assert_eq!(parsed, addr);
/// # Ok::<(), knx_link::KnxError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub struct GroupAddress {
    raw: u16,
}

impl GroupAddress {
    /// Maximum main group value (5 bits)
    pub const MAX_MAIN: u8 = 31;
    /// Maximum middle group value (3 bits)
    pub const MAX_MIDDLE: u8 = 7;
    /// Maximum sub value for 2-level format (11 bits)
    pub const MAX_SUB_2LEVEL: u16 = 2047;

    /// Create a 3-level address (main 0-31, middle 0-7, sub 0-255).
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self> {
        if main > Self::MAX_MAIN || middle > Self::MAX_MIDDLE {
            return Err(KnxError::address_out_of_range());
        }
        let raw = (u16::from(main) << 11) | (u16::from(middle) << 8) | u16::from(sub);
        Ok(Self { raw })
    }

    /// Create a 2-level address (main 0-31, sub 0-2047).
    pub fn new_2level(main: u8, sub: u16) -> Result<Self> {
        if main > Self::MAX_MAIN || sub > Self::MAX_SUB_2LEVEL {
            return Err(KnxError::address_out_of_range());
        }
        Ok(Self {
            raw: (u16::from(main) << 11) | sub,
        })
    }

    /// Raw 16-bit value.
    #[inline(always)]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Main group (0-31).
    #[inline(always)]
    pub const fn main(self) -> u8 {
        ((self.raw >> 11) & 0x1F) as u8
    }

    /// Middle group of the 3-level form (0-7).
    #[inline(always)]
    pub const fn middle(self) -> u8 {
        ((self.raw >> 8) & 0x07) as u8
    }

    /// Sub group of the 3-level form (0-255).
    #[inline(always)]
    pub const fn sub(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Sub group of the 2-level form (0-2047).
    #[inline(always)]
    pub const fn sub_2level(self) -> u16 {
        self.raw & 0x07FF
    }

    /// Format as 2-level string (Main/Sub).
    pub fn to_string_2level(&self) -> heapless::String<16> {
        use core::fmt::Write;
        let mut s = heapless::String::new();
        // "31/2047" always fits into 16 bytes
        let _ = write!(s, "{}/{}", self.main(), self.sub_2level());
        s
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

impl From<u16> for GroupAddress {
    #[inline(always)]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<GroupAddress> for u16 {
    #[inline(always)]
    fn from(addr: GroupAddress) -> u16 {
        addr.raw
    }
}

impl fmt::Display for GroupAddress {
    /// 3-level notation
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main(), self.middle(), self.sub())
    }
}

impl core::str::FromStr for GroupAddress {
    type Err = KnxError;

    /// Accepts both `main/middle/sub` and `main/sub`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('/').map(|p| p.parse::<u16>().ok());
        let main = parts.next().flatten();
        let second = parts.next().flatten();
        let third = parts.next();
        if parts.next().is_some() {
            return Err(KnxError::invalid_group_address());
        }

        let (Some(main), Some(second)) = (main, second) else {
            return Err(KnxError::invalid_group_address());
        };
        let main = u8::try_from(main).map_err(|_| KnxError::address_out_of_range())?;

        match third {
            None => Self::new_2level(main, second),
            Some(Some(sub)) => {
                let middle = u8::try_from(second).map_err(|_| KnxError::address_out_of_range())?;
                let sub = u8::try_from(sub).map_err(|_| KnxError::address_out_of_range())?;
                Self::new(main, middle, sub)
            }
            Some(None) => Err(KnxError::invalid_group_address()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_3level() {
        let addr = GroupAddress::new(1, 0, 3).unwrap();
        assert_eq!(addr.raw(), 0x0803);
        assert_eq!((addr.main(), addr.middle(), addr.sub()), (1, 0, 3));
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(GroupAddress::new(32, 0, 0).is_err());
        assert!(GroupAddress::new(0, 8, 0).is_err());
        assert!(GroupAddress::new_2level(0, 2048).is_err());
    }

    #[test]
    fn test_two_and_three_level_are_equal() {
        let three = GroupAddress::new(1, 2, 3).unwrap();
        let two = GroupAddress::new_2level(1, 0x203).unwrap();
        assert_eq!(three, two);
        assert_eq!(two.to_string(), "1/2/3");
        assert_eq!(three.to_string_2level(), "1/515");
    }

    #[test]
    fn test_from_str() {
        let addr: GroupAddress = "1/0/2".parse().unwrap();
        assert_eq!(addr, GroupAddress::new(1, 0, 2).unwrap());
        let addr: GroupAddress = " 4/1000 ".parse().unwrap();
        assert_eq!(addr.sub_2level(), 1000);
    }

    #[test]
    fn test_from_str_invalid() {
        for input in ["", "1", "1/2/3/4", "a/b/c", "32/0/0", "1/8/0", "1/2048", "1/0/256", "1//3"] {
            assert!(input.parse::<GroupAddress>().is_err(), "{input} should fail");
        }
    }

    #[test]
    fn test_wire_bytes() {
        let addr = GroupAddress::new(31, 7, 255).unwrap();
        assert_eq!(addr.to_bytes(), [0xFF, 0xFF]);
        assert_eq!(GroupAddress::from_slice(&[0x08, 0x03, 0x00]).unwrap(), GroupAddress::from(0x0803));
        assert!(GroupAddress::from_slice(&[0x08]).is_err());
    }
}
