//! DPT 9.xxx - 2-byte Float
//!
//! ## Format
//!
//! ```text
//! Byte 0: MEEE EMMM
//! Byte 1: MMMM MMMM
//!
//! E = Exponent (4 bits, 0-15)
//! M = Mantissa (12 bits two's complement, the top bit doubles as sign)
//!
//! Value = 0.01 * M * 2^E
//! ```
//!
//! Range -671088.64 to 670760.96. The encoding `0x7FFF` marks invalid data.

use crate::dpt::{asdu_from, expect_len, Asdu, DptDecode, DptEncode};
use crate::error::{KnxError, Result};

const INVALID_DATA: u16 = 0x7FFF;
const MANTISSA_MIN: f32 = -2048.0;
const MANTISSA_MAX: f32 = 2047.0;

/// DPT 9.xxx 2-byte float types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt9 {
    /// DPT 9.001 - Temperature (°C)
    Temperature,
    /// DPT 9.002 - Temperature difference (K)
    TemperatureDifference,
    /// DPT 9.004 - Illuminance (lux)
    Illuminance,
    /// DPT 9.005 - Wind speed (m/s)
    WindSpeed,
    /// DPT 9.006 - Pressure (Pa)
    Pressure,
    /// DPT 9.007 - Humidity (%)
    Humidity,
    /// DPT 9.008 - Air quality (ppm)
    AirQuality,
    /// DPT 9.020 - Voltage (mV)
    Voltage,
    /// DPT 9.021 - Current (mA)
    Current,
    /// DPT 9.024 - Power (kW)
    Power,
}

impl Dpt9 {
    /// Look up a subtype by its sub number.
    pub fn from_subtype(sub: u16) -> Option<Self> {
        match sub {
            1 => Some(Dpt9::Temperature),
            2 => Some(Dpt9::TemperatureDifference),
            4 => Some(Dpt9::Illuminance),
            5 => Some(Dpt9::WindSpeed),
            6 => Some(Dpt9::Pressure),
            7 => Some(Dpt9::Humidity),
            8 => Some(Dpt9::AirQuality),
            20 => Some(Dpt9::Voltage),
            21 => Some(Dpt9::Current),
            24 => Some(Dpt9::Power),
            _ => None,
        }
    }

    /// Get the DPT identifier string
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt9::Temperature => "9.001",
            Dpt9::TemperatureDifference => "9.002",
            Dpt9::Illuminance => "9.004",
            Dpt9::WindSpeed => "9.005",
            Dpt9::Pressure => "9.006",
            Dpt9::Humidity => "9.007",
            Dpt9::AirQuality => "9.008",
            Dpt9::Voltage => "9.020",
            Dpt9::Current => "9.021",
            Dpt9::Power => "9.024",
        }
    }

    /// Get the unit string
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt9::Temperature => "°C",
            Dpt9::TemperatureDifference => "K",
            Dpt9::Illuminance => "lux",
            Dpt9::WindSpeed => "m/s",
            Dpt9::Pressure => "Pa",
            Dpt9::Humidity => "%",
            Dpt9::AirQuality => "ppm",
            Dpt9::Voltage => "mV",
            Dpt9::Current => "mA",
            Dpt9::Power => "kW",
        }
    }
}

impl DptEncode<f32> for Dpt9 {
    fn encode(&self, value: f32) -> Result<Asdu> {
        if !value.is_finite() {
            return Err(KnxError::dpt_value_out_of_range());
        }

        // Smallest exponent whose mantissa fits into 12 bits
        let (exponent, mantissa) = (0u16..=15)
            .map(|e| (e, (value * 100.0 / f32::from(1u16 << e)).round()))
            .find(|(_, m)| (MANTISSA_MIN..=MANTISSA_MAX).contains(m))
            .ok_or_else(KnxError::dpt_value_out_of_range)?;

        let mantissa = mantissa as i16;
        let sign = if mantissa < 0 { 0x8000 } else { 0 };
        let raw = sign | (exponent << 11) | (mantissa as u16 & 0x07FF);
        asdu_from(&raw.to_be_bytes())
    }
}

impl DptDecode<f32> for Dpt9 {
    fn decode(&self, data: &[u8]) -> Result<f32> {
        expect_len(data, 2)?;
        let raw = u16::from_be_bytes([data[0], data[1]]);
        if raw == INVALID_DATA {
            return Err(KnxError::dpt_value_out_of_range());
        }

        let exponent = (raw >> 11) & 0x0F;
        let mut mantissa = i32::from(raw & 0x07FF);
        if raw & 0x8000 != 0 {
            mantissa -= 2048;
        }
        Ok(mantissa as f32 * f32::from(1u16 << exponent) / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_values() {
        assert_eq!(Dpt9::Temperature.decode(&[0x0C, 0xE2]).unwrap(), 25.0);
        assert_eq!(Dpt9::Temperature.decode(&[0x86, 0x70]).unwrap(), -4.0);
        assert_eq!(Dpt9::Temperature.decode(&[0x00, 0x00]).unwrap(), 0.0);
    }

    #[test]
    fn test_encode_known_values() {
        assert_eq!(Dpt9::Temperature.encode(-4.0).unwrap().as_slice(), &[0x86, 0x70]);
        assert_eq!(Dpt9::Temperature.encode(0.0).unwrap().as_slice(), &[0x00, 0x00]);
        let encoded = Dpt9::Temperature.encode(21.5).unwrap();
        assert_eq!(Dpt9::Temperature.decode(&encoded).unwrap(), 21.5);
    }

    #[test]
    fn test_range_limits() {
        assert!(Dpt9::Illuminance.encode(670_760.96).is_ok());
        assert!(Dpt9::Illuminance.encode(-671_088.64).is_ok());
        assert!(Dpt9::Illuminance.encode(700_000.0).is_err());
        assert!(Dpt9::Illuminance.encode(f32::NAN).is_err());
    }

    #[test]
    fn test_invalid_data_marker() {
        assert!(Dpt9::Temperature.decode(&[0x7F, 0xFF]).unwrap_err().is_translation_error());
    }

    #[test]
    fn test_decode_invalid_length() {
        assert!(Dpt9::Temperature.decode(&[0x0C]).is_err());
    }
}
