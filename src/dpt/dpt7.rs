//! DPT 7.xxx - 16-bit Unsigned Value (2 bytes, big-endian)
//!
//! Covers pulse counters, time periods, lengths, currents, brightness and
//! color temperature. All subtypes use the full 0-65535 range.

use crate::dpt::{asdu_from, expect_len, Asdu, DptDecode, DptEncode};
use crate::error::{KnxError, Result};

/// DPT 7.xxx 16-bit unsigned types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt7 {
    /// DPT 7.001 - Pulses
    Pulses,
    /// DPT 7.002 - Time period (ms)
    TimePeriodMs,
    /// DPT 7.005 - Time period (s)
    TimePeriodSec,
    /// DPT 7.006 - Time period (min)
    TimePeriodMin,
    /// DPT 7.007 - Time period (h)
    TimePeriodHr,
    /// DPT 7.011 - Length (mm)
    LengthMm,
    /// DPT 7.012 - Current (mA)
    CurrentMa,
    /// DPT 7.013 - Brightness (lux)
    Brightness,
    /// DPT 7.600 - Color temperature (K)
    ColorTemperature,
}

impl Dpt7 {
    /// Look up a subtype by its sub number.
    pub fn from_subtype(sub: u16) -> Option<Self> {
        match sub {
            1 => Some(Dpt7::Pulses),
            2 => Some(Dpt7::TimePeriodMs),
            5 => Some(Dpt7::TimePeriodSec),
            6 => Some(Dpt7::TimePeriodMin),
            7 => Some(Dpt7::TimePeriodHr),
            11 => Some(Dpt7::LengthMm),
            12 => Some(Dpt7::CurrentMa),
            13 => Some(Dpt7::Brightness),
            600 => Some(Dpt7::ColorTemperature),
            _ => None,
        }
    }

    /// Get the DPT identifier string
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt7::Pulses => "7.001",
            Dpt7::TimePeriodMs => "7.002",
            Dpt7::TimePeriodSec => "7.005",
            Dpt7::TimePeriodMin => "7.006",
            Dpt7::TimePeriodHr => "7.007",
            Dpt7::LengthMm => "7.011",
            Dpt7::CurrentMa => "7.012",
            Dpt7::Brightness => "7.013",
            Dpt7::ColorTemperature => "7.600",
        }
    }

    /// Get the unit string
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt7::Pulses => "pulses",
            Dpt7::TimePeriodMs => "ms",
            Dpt7::TimePeriodSec => "s",
            Dpt7::TimePeriodMin => "min",
            Dpt7::TimePeriodHr => "h",
            Dpt7::LengthMm => "mm",
            Dpt7::CurrentMa => "mA",
            Dpt7::Brightness => "lux",
            Dpt7::ColorTemperature => "K",
        }
    }
}

impl DptEncode<u32> for Dpt7 {
    fn encode(&self, value: u32) -> Result<Asdu> {
        let value = u16::try_from(value).map_err(|_| KnxError::dpt_value_out_of_range())?;
        asdu_from(&value.to_be_bytes())
    }
}

impl DptDecode<u32> for Dpt7 {
    fn decode(&self, data: &[u8]) -> Result<u32> {
        expect_len(data, 2)?;
        Ok(u32::from(u16::from_be_bytes([data[0], data[1]])))
    }
}
