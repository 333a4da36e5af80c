//! KNX Datapoint Types (DPT)
//!
//! Translators between typed process values and the ASDU bytes carried in
//! group telegrams.
//!
//! ## Supported DPT Families
//!
//! - **DPT 1.xxx** - Boolean (1 bit, compact): switches, buttons, binary sensors
//! - **DPT 5.xxx** - 8-bit unsigned: percentages, angles, counters
//! - **DPT 7.xxx** - 16-bit unsigned: pulses, brightness, color temperature
//! - **DPT 9.xxx** - 2-byte float: temperature, illuminance, pressure
//! - **DPT 13.xxx** - 32-bit signed: energy, flow rate, long counters
//!
//! ## Usage
//!
//! ```
//! use knx_link::dpt::{self, DatapointType, DptValue};
//!
//! let asdu = dpt::encode(&DptValue::Float(21.5), "9.001")?;
//! assert_eq!(dpt::decode(&asdu, "9.001")?, DptValue::Float(21.5));
//!
//! let temperature = DatapointType::parse("9.001")?;
//! assert_eq!(temperature.format(&temperature.decode(&[0x0C, 0xE2])?), "25 °C");
//! # Ok::<(), knx_link::KnxError>(())
//! ```

use crate::error::{KnxError, Result};
use core::fmt;
use serde::{Deserialize, Serialize};

pub mod dpt1;
pub mod dpt13;
pub mod dpt5;
pub mod dpt7;
pub mod dpt9;

#[doc(inline)]
pub use dpt1::Dpt1;
#[doc(inline)]
pub use dpt13::Dpt13;
#[doc(inline)]
pub use dpt5::Dpt5;
#[doc(inline)]
pub use dpt7::Dpt7;
#[doc(inline)]
pub use dpt9::Dpt9;

/// Maximum ASDU length of a standard frame.
pub const MAX_ASDU_LEN: usize = 14;

/// Application service data unit (encoded datapoint value).
pub type Asdu = heapless::Vec<u8, MAX_ASDU_LEN>;

/// Build an [`Asdu`] from a byte slice.
pub(crate) fn asdu_from(bytes: &[u8]) -> Result<Asdu> {
    Asdu::from_slice(bytes).map_err(|_| KnxError::payload_too_large())
}

/// Encode a typed value into its KNX representation.
pub trait DptEncode<T> {
    /// Encode `value`, rejecting values outside the type's domain.
    fn encode(&self, value: T) -> Result<Asdu>;
}

/// Decode the KNX representation of a value.
pub trait DptDecode<T> {
    /// Decode `data`, which must have exactly the type's ASDU length.
    fn decode(&self, data: &[u8]) -> Result<T>;
}

/// A process value in its typed (decoded) form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DptValue {
    /// DPT 1.xxx
    Bool(bool),
    /// DPT 5.xxx and 7.xxx (in engineering units for scaled subtypes)
    Unsigned(u32),
    /// DPT 13.xxx
    Signed(i32),
    /// DPT 9.xxx
    Float(f32),
}

impl DptValue {
    /// Boolean content, if this is a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Unsigned content, if this is an unsigned value.
    pub fn as_unsigned(&self) -> Option<u32> {
        match self {
            Self::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    /// Signed content, if this is a signed value.
    pub fn as_signed(&self) -> Option<i32> {
        match self {
            Self::Signed(v) => Some(*v),
            _ => None,
        }
    }

    /// Float content, if this is a float value.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for DptValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f32> for DptValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

/// A supported datapoint type, identified by main and sub number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatapointType {
    /// DPT 1.xxx
    Boolean(Dpt1),
    /// DPT 5.xxx
    Unsigned8(Dpt5),
    /// DPT 7.xxx
    Unsigned16(Dpt7),
    /// DPT 9.xxx
    Float16(Dpt9),
    /// DPT 13.xxx
    Signed32(Dpt13),
}

impl DatapointType {
    /// Resolve a datapoint type identifier.
    ///
    /// Accepts the dotted form (`"9.001"`) and the ETS export form
    /// (`"DPST-9-1"`).
    pub fn parse(id: &str) -> Result<Self> {
        let (main, sub) = split_identifier(id.trim()).ok_or_else(KnxError::unsupported_dpt)?;
        let dpt = match main {
            1 => Dpt1::from_subtype(sub).map(Self::Boolean),
            5 => Dpt5::from_subtype(sub).map(Self::Unsigned8),
            7 => Dpt7::from_subtype(sub).map(Self::Unsigned16),
            9 => Dpt9::from_subtype(sub).map(Self::Float16),
            13 => Dpt13::from_subtype(sub).map(Self::Signed32),
            _ => None,
        };
        dpt.ok_or_else(KnxError::unsupported_dpt)
    }

    /// Dotted identifier, e.g. `"1.001"`.
    pub const fn identifier(&self) -> &'static str {
        match self {
            Self::Boolean(t) => t.identifier(),
            Self::Unsigned8(t) => t.identifier(),
            Self::Unsigned16(t) => t.identifier(),
            Self::Float16(t) => t.identifier(),
            Self::Signed32(t) => t.identifier(),
        }
    }

    /// Main number of the type family, e.g. `9` for `"9.001"`.
    pub const fn main_number(&self) -> u16 {
        match self {
            Self::Boolean(_) => 1,
            Self::Unsigned8(_) => 5,
            Self::Unsigned16(_) => 7,
            Self::Float16(_) => 9,
            Self::Signed32(_) => 13,
        }
    }

    /// Physical unit, empty when dimensionless.
    pub const fn unit(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "",
            Self::Unsigned8(t) => t.unit(),
            Self::Unsigned16(t) => t.unit(),
            Self::Float16(t) => t.unit(),
            Self::Signed32(t) => t.unit(),
        }
    }

    /// Whether the value travels inside the APCI octet (6 bits or less).
    pub const fn is_compact(&self) -> bool {
        matches!(self, Self::Boolean(_))
    }

    /// Exact ASDU length in bytes.
    pub const fn asdu_len(&self) -> usize {
        match self {
            Self::Boolean(_) | Self::Unsigned8(_) => 1,
            Self::Unsigned16(_) | Self::Float16(_) => 2,
            Self::Signed32(_) => 4,
        }
    }

    /// Value reported before anything has been written.
    pub const fn default_value(&self) -> DptValue {
        match self {
            Self::Boolean(_) => DptValue::Bool(false),
            Self::Unsigned8(_) | Self::Unsigned16(_) => DptValue::Unsigned(0),
            Self::Float16(_) => DptValue::Float(0.0),
            Self::Signed32(_) => DptValue::Signed(0),
        }
    }

    /// Encode a value; the variant must match the type family.
    pub fn encode(&self, value: &DptValue) -> Result<Asdu> {
        match (self, *value) {
            (Self::Boolean(t), DptValue::Bool(v)) => t.encode(v),
            (Self::Unsigned8(t), DptValue::Unsigned(v)) => t.encode(v),
            (Self::Unsigned16(t), DptValue::Unsigned(v)) => t.encode(v),
            (Self::Float16(t), DptValue::Float(v)) => t.encode(v),
            (Self::Signed32(t), DptValue::Signed(v)) => t.encode(v),
            _ => Err(KnxError::dpt_type_mismatch()),
        }
    }

    /// Decode an ASDU.
    pub fn decode(&self, data: &[u8]) -> Result<DptValue> {
        Ok(match self {
            Self::Boolean(t) => DptValue::Bool(t.decode(data)?),
            Self::Unsigned8(t) => DptValue::Unsigned(t.decode(data)?),
            Self::Unsigned16(t) => DptValue::Unsigned(t.decode(data)?),
            Self::Float16(t) => DptValue::Float(t.decode(data)?),
            Self::Signed32(t) => DptValue::Signed(t.decode(data)?),
        })
    }

    /// Human-readable rendering with unit, e.g. `"21.5 °C"` or `"on"`.
    pub fn format(&self, value: &DptValue) -> String {
        let number = match (self, value) {
            (Self::Boolean(t), DptValue::Bool(b)) => return t.label(*b).to_owned(),
            (_, DptValue::Bool(b)) => b.to_string(),
            (_, DptValue::Unsigned(v)) => v.to_string(),
            (_, DptValue::Signed(v)) => v.to_string(),
            (_, DptValue::Float(v)) => v.to_string(),
        };
        if self.unit().is_empty() {
            number
        } else {
            format!("{number} {}", self.unit())
        }
    }

    /// Parse a textual value; the unit suffix is optional.
    ///
    /// ```
    /// use knx_link::dpt::{DatapointType, DptValue};
    ///
    /// let t = DatapointType::parse("9.001")?;
    /// assert_eq!(t.parse_text("-4 °C")?, DptValue::Float(-4.0));
    /// # Ok::<(), knx_link::KnxError>(())
    /// ```
    pub fn parse_text(&self, text: &str) -> Result<DptValue> {
        let text = text.trim();
        let number = text
            .strip_suffix(self.unit())
            .filter(|_| !self.unit().is_empty())
            .unwrap_or(text)
            .trim();

        let value = match self {
            Self::Boolean(t) => DptValue::Bool(t.parse_label(number)?),
            Self::Unsigned8(_) | Self::Unsigned16(_) => {
                DptValue::Unsigned(number.parse().map_err(|_| KnxError::invalid_dpt_text())?)
            }
            Self::Float16(_) => {
                DptValue::Float(number.parse().map_err(|_| KnxError::invalid_dpt_text())?)
            }
            Self::Signed32(_) => {
                DptValue::Signed(number.parse().map_err(|_| KnxError::invalid_dpt_text())?)
            }
        };
        // Reject values the translator would refuse anyway
        self.encode(&value)?;
        Ok(value)
    }
}

impl fmt::Display for DatapointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl core::str::FromStr for DatapointType {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Encode `value` using the datapoint type named by `dpt_id`.
pub fn encode(value: &DptValue, dpt_id: &str) -> Result<Asdu> {
    DatapointType::parse(dpt_id)?.encode(value)
}

/// Decode `asdu` using the datapoint type named by `dpt_id`.
pub fn decode(asdu: &[u8], dpt_id: &str) -> Result<DptValue> {
    DatapointType::parse(dpt_id)?.decode(asdu)
}

fn split_identifier(id: &str) -> Option<(u16, u16)> {
    if let Some(rest) = id.strip_prefix("DPST-") {
        let (main, sub) = rest.split_once('-')?;
        return Some((main.parse().ok()?, sub.parse().ok()?));
    }
    let (main, sub) = id.split_once('.')?;
    Some((main.parse().ok()?, sub.parse().ok()?))
}

/// Require an exact ASDU length.
#[inline]
pub(crate) fn expect_len(data: &[u8], len: usize) -> Result<()> {
    if data.len() == len {
        Ok(())
    } else {
        Err(KnxError::invalid_asdu_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_identifiers() {
        assert_eq!(DatapointType::parse("1.001").unwrap(), DatapointType::Boolean(Dpt1::Switch));
        assert_eq!(DatapointType::parse("DPST-9-1").unwrap(), DatapointType::Float16(Dpt9::Temperature));
        assert_eq!("13.010".parse::<DatapointType>().unwrap().unit(), "Wh");
        assert!(DatapointType::parse("1.999").unwrap_err().is_translation_error());
        assert!(DatapointType::parse("232.600").is_err());
        assert!(DatapointType::parse("temperature").is_err());
    }

    #[test]
    fn test_type_mismatch_is_translation_error() {
        let err = encode(&DptValue::Float(1.0), "1.001").unwrap_err();
        assert!(err.is_translation_error());
        let err = encode(&DptValue::Signed(-1), "5.010").unwrap_err();
        assert!(err.is_translation_error());
    }

    #[test]
    fn test_temperature_translation() {
        let t = DatapointType::parse("9.001").unwrap();
        let value = t.decode(&[0x0C, 0xE2]).unwrap();
        assert_eq!(value, DptValue::Float(25.0));
        assert_eq!(t.format(&value), "25 °C");

        let minus_four = t.parse_text("-4 °C").unwrap();
        assert_eq!(t.encode(&minus_four).unwrap().as_slice(), &[0x86, 0x70]);
    }

    #[test]
    fn test_format_and_parse_text() {
        let switch = DatapointType::parse("1.001").unwrap();
        assert_eq!(switch.format(&DptValue::Bool(true)), "on");
        assert_eq!(switch.parse_text("off").unwrap(), DptValue::Bool(false));

        let percent = DatapointType::parse("5.001").unwrap();
        assert_eq!(percent.format(&DptValue::Unsigned(75)), "75 %");
        assert_eq!(percent.parse_text("100 %").unwrap(), DptValue::Unsigned(100));
        assert!(percent.parse_text("101").is_err());
        assert!(percent.parse_text("lots").is_err());
    }

    #[test]
    fn test_default_values() {
        assert_eq!(DatapointType::parse("1.001").unwrap().default_value(), DptValue::Bool(false));
        assert_eq!(DatapointType::parse("13.001").unwrap().default_value(), DptValue::Signed(0));
    }

    proptest! {
        #[test]
        fn prop_bool_round_trip(v: bool) {
            let asdu = encode(&DptValue::Bool(v), "1.001").unwrap();
            prop_assert_eq!(decode(&asdu, "1.001").unwrap(), DptValue::Bool(v));
        }

        #[test]
        fn prop_bool_rejects_other_lengths(data in proptest::collection::vec(any::<u8>(), 0..16)) {
            prop_assume!(data.len() != 1);
            let err = decode(&data, "1.001").unwrap_err();
            prop_assert!(err.is_translation_error());
        }

        #[test]
        fn prop_unsigned16_round_trip(v in 0u32..=65_535) {
            let asdu = encode(&DptValue::Unsigned(v), "7.001").unwrap();
            prop_assert_eq!(decode(&asdu, "7.001").unwrap(), DptValue::Unsigned(v));
        }
    }
}
