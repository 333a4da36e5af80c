//! DPT 13.xxx - 32-bit Signed Value (4 bytes, big-endian two's complement)

use crate::dpt::{asdu_from, expect_len, Asdu, DptDecode, DptEncode};
use crate::error::Result;

/// DPT 13.xxx 32-bit signed types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt13 {
    /// DPT 13.001 - Counter pulses
    Counter,
    /// DPT 13.002 - Flow rate (m³/h)
    FlowRate,
    /// DPT 13.010 - Active energy (Wh)
    ActiveEnergy,
    /// DPT 13.011 - Apparent energy (VAh)
    ApparentEnergy,
    /// DPT 13.012 - Reactive energy (VArh)
    ReactiveEnergy,
    /// DPT 13.013 - Active energy (kWh)
    ActiveEnergyKwh,
    /// DPT 13.100 - Long delta time (s)
    LongDeltaTimeSec,
}

impl Dpt13 {
    /// Look up a subtype by its sub number.
    pub fn from_subtype(sub: u16) -> Option<Self> {
        match sub {
            1 => Some(Dpt13::Counter),
            2 => Some(Dpt13::FlowRate),
            10 => Some(Dpt13::ActiveEnergy),
            11 => Some(Dpt13::ApparentEnergy),
            12 => Some(Dpt13::ReactiveEnergy),
            13 => Some(Dpt13::ActiveEnergyKwh),
            100 => Some(Dpt13::LongDeltaTimeSec),
            _ => None,
        }
    }

    /// Get the DPT identifier string
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt13::Counter => "13.001",
            Dpt13::FlowRate => "13.002",
            Dpt13::ActiveEnergy => "13.010",
            Dpt13::ApparentEnergy => "13.011",
            Dpt13::ReactiveEnergy => "13.012",
            Dpt13::ActiveEnergyKwh => "13.013",
            Dpt13::LongDeltaTimeSec => "13.100",
        }
    }

    /// Get the unit string
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt13::Counter => "pulses",
            Dpt13::FlowRate => "m³/h",
            Dpt13::ActiveEnergy => "Wh",
            Dpt13::ApparentEnergy => "VAh",
            Dpt13::ReactiveEnergy => "VArh",
            Dpt13::ActiveEnergyKwh => "kWh",
            Dpt13::LongDeltaTimeSec => "s",
        }
    }
}

impl DptEncode<i32> for Dpt13 {
    fn encode(&self, value: i32) -> Result<Asdu> {
        asdu_from(&value.to_be_bytes())
    }
}

impl DptDecode<i32> for Dpt13 {
    fn decode(&self, data: &[u8]) -> Result<i32> {
        expect_len(data, 4)?;
        Ok(i32::from_be_bytes([data[0], data[1], data[2], data[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_energy() {
        let encoded = Dpt13::ActiveEnergy.encode(500_000).unwrap();
        assert_eq!(encoded.as_slice(), &[0x00, 0x07, 0xA1, 0x20]);
        assert_eq!(Dpt13::ActiveEnergy.decode(&encoded).unwrap(), 500_000);
    }

    #[test]
    fn test_negative_values() {
        assert_eq!(Dpt13::Counter.decode(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap(), -1);
        assert_eq!(Dpt13::Counter.encode(i32::MIN).unwrap().as_slice(), &[0x80, 0, 0, 0]);
    }

    #[test]
    fn test_decode_invalid_length() {
        assert!(Dpt13::Counter.decode(&[0, 0, 0]).unwrap_err().is_translation_error());
    }
}
