//! DPT 5.xxx - 8-bit Unsigned Value (1 byte)
//!
//! ## Common Subtypes
//!
//! - **5.001** - Percentage (0-100%), scaled onto 0-255
//! - **5.003** - Angle (0-360°), scaled onto 0-255
//! - **5.004** - Percentage 0-255
//! - **5.005** - Ratio (0-255)
//! - **5.006** - Tariff (0-254)
//! - **5.010** - Counter pulses (0-255)

use crate::dpt::{asdu_from, expect_len, Asdu, DptDecode, DptEncode};
use crate::error::{KnxError, Result};

/// DPT 5.xxx 8-bit unsigned types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt5 {
    /// DPT 5.001 - Percentage (0-100%)
    Percentage,
    /// DPT 5.003 - Angle (0-360°)
    Angle,
    /// DPT 5.004 - Percentage 0-255 (0-255)
    PercentU8,
    /// DPT 5.005 - Ratio (0-255)
    Ratio,
    /// DPT 5.006 - Tariff (0-254)
    Tariff,
    /// DPT 5.010 - Counter pulses (0-255)
    Counter,
}

impl Dpt5 {
    /// Look up a subtype by its sub number.
    pub fn from_subtype(sub: u16) -> Option<Self> {
        match sub {
            1 => Some(Dpt5::Percentage),
            3 => Some(Dpt5::Angle),
            4 => Some(Dpt5::PercentU8),
            5 => Some(Dpt5::Ratio),
            6 => Some(Dpt5::Tariff),
            10 => Some(Dpt5::Counter),
            _ => None,
        }
    }

    /// Get the DPT identifier string (e.g., "5.001")
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt5::Percentage => "5.001",
            Dpt5::Angle => "5.003",
            Dpt5::PercentU8 => "5.004",
            Dpt5::Ratio => "5.005",
            Dpt5::Tariff => "5.006",
            Dpt5::Counter => "5.010",
        }
    }

    /// Get the unit string for this DPT
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt5::Percentage => "%",
            Dpt5::Angle => "°",
            Dpt5::Counter => "pulses",
            Dpt5::PercentU8 | Dpt5::Ratio | Dpt5::Tariff => "",
        }
    }

    /// Largest value in engineering units.
    pub const fn max(&self) -> u32 {
        match self {
            Dpt5::Percentage => 100,
            Dpt5::Angle => 360,
            Dpt5::Tariff => 254,
            Dpt5::PercentU8 | Dpt5::Ratio | Dpt5::Counter => 255,
        }
    }

    const fn is_scaled(&self) -> bool {
        matches!(self, Dpt5::Percentage | Dpt5::Angle)
    }
}

impl DptEncode<u32> for Dpt5 {
    fn encode(&self, value: u32) -> Result<Asdu> {
        let max = self.max();
        if value > max {
            return Err(KnxError::dpt_value_out_of_range());
        }
        let raw = if self.is_scaled() {
            // Round to the nearest raw step
            (value * 255 + max / 2) / max
        } else {
            value
        };
        asdu_from(&[raw as u8])
    }
}

impl DptDecode<u32> for Dpt5 {
    fn decode(&self, data: &[u8]) -> Result<u32> {
        expect_len(data, 1)?;
        let raw = u32::from(data[0]);
        if self.is_scaled() {
            Ok((raw * self.max() + 127) / 255)
        } else if raw > self.max() {
            Err(KnxError::dpt_value_out_of_range())
        } else {
            Ok(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_scaling() {
        assert_eq!(Dpt5::Percentage.encode(0).unwrap().as_slice(), &[0x00]);
        assert_eq!(Dpt5::Percentage.encode(75).unwrap().as_slice(), &[0xBF]);
        assert_eq!(Dpt5::Percentage.encode(100).unwrap().as_slice(), &[0xFF]);
        assert_eq!(Dpt5::Percentage.decode(&[0xBF]).unwrap(), 75);
        assert_eq!(Dpt5::Percentage.decode(&[0xFF]).unwrap(), 100);
    }

    #[test]
    fn test_angle_scaling() {
        assert_eq!(Dpt5::Angle.encode(180).unwrap().as_slice(), &[0x80]);
        assert_eq!(Dpt5::Angle.decode(&[0xFF]).unwrap(), 360);
    }

    #[test]
    fn test_range_checks() {
        assert!(Dpt5::Percentage.encode(101).is_err());
        assert!(Dpt5::Counter.encode(256).is_err());
        assert!(Dpt5::Tariff.encode(255).is_err());
        assert!(Dpt5::Tariff.decode(&[0xFF]).is_err());
        assert_eq!(Dpt5::Counter.decode(&[0xFF]).unwrap(), 255);
    }

    #[test]
    fn test_decode_invalid_length() {
        assert!(Dpt5::Counter.decode(&[]).is_err());
        assert!(Dpt5::Counter.decode(&[1, 2]).is_err());
    }
}
