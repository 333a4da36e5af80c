//! DPT 1.xxx - Boolean (1-bit)
//!
//! Boolean datapoint types represent binary states (on/off, true/false, etc.).
//! The value is a single bit that travels compact inside the APCI octet, so
//! the ASDU is always exactly one byte holding `0` or `1`.
//!
//! ## Common Subtypes
//!
//! - **1.001** - Switch (off/on)
//! - **1.002** - Bool (false/true)
//! - **1.003** - Enable (disable/enable)
//! - **1.008** - UpDown (up/down)
//! - **1.009** - OpenClose (open/close)
//! - **1.010** - Start (stop/start)

use crate::dpt::{asdu_from, expect_len, Asdu, DptDecode, DptEncode};
use crate::error::{KnxError, Result};

/// DPT 1.xxx Boolean types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt1 {
    /// DPT 1.001 - Switch (off/on)
    Switch,
    /// DPT 1.002 - Bool (false/true)
    Bool,
    /// DPT 1.003 - Enable (disable/enable)
    Enable,
    /// DPT 1.004 - Ramp (no ramp/ramp)
    Ramp,
    /// DPT 1.005 - Alarm (no alarm/alarm)
    Alarm,
    /// DPT 1.006 - BinaryValue (low/high)
    BinaryValue,
    /// DPT 1.007 - Step (decrease/increase)
    Step,
    /// DPT 1.008 - UpDown (up/down)
    UpDown,
    /// DPT 1.009 - OpenClose (open/close)
    OpenClose,
    /// DPT 1.010 - Start (stop/start)
    Start,
    /// DPT 1.011 - State (inactive/active)
    State,
    /// DPT 1.012 - Invert (not inverted/inverted)
    Invert,
}

impl Dpt1 {
    const ALL: [Dpt1; 12] = [
        Dpt1::Switch,
        Dpt1::Bool,
        Dpt1::Enable,
        Dpt1::Ramp,
        Dpt1::Alarm,
        Dpt1::BinaryValue,
        Dpt1::Step,
        Dpt1::UpDown,
        Dpt1::OpenClose,
        Dpt1::Start,
        Dpt1::State,
        Dpt1::Invert,
    ];

    /// Look up a subtype by its sub number (`1` for 1.001).
    pub fn from_subtype(sub: u16) -> Option<Self> {
        let index = usize::from(sub).checked_sub(1)?;
        Self::ALL.get(index).copied()
    }

    /// Get the DPT identifier string
    pub const fn identifier(&self) -> &'static str {
        match self {
            Dpt1::Switch => "1.001",
            Dpt1::Bool => "1.002",
            Dpt1::Enable => "1.003",
            Dpt1::Ramp => "1.004",
            Dpt1::Alarm => "1.005",
            Dpt1::BinaryValue => "1.006",
            Dpt1::Step => "1.007",
            Dpt1::UpDown => "1.008",
            Dpt1::OpenClose => "1.009",
            Dpt1::Start => "1.010",
            Dpt1::State => "1.011",
            Dpt1::Invert => "1.012",
        }
    }

    /// Labels for the `false` and `true` states.
    pub const fn labels(&self) -> (&'static str, &'static str) {
        match self {
            Dpt1::Switch => ("off", "on"),
            Dpt1::Bool => ("false", "true"),
            Dpt1::Enable => ("disable", "enable"),
            Dpt1::Ramp => ("no ramp", "ramp"),
            Dpt1::Alarm => ("no alarm", "alarm"),
            Dpt1::BinaryValue => ("low", "high"),
            Dpt1::Step => ("decrease", "increase"),
            Dpt1::UpDown => ("up", "down"),
            Dpt1::OpenClose => ("open", "close"),
            Dpt1::Start => ("stop", "start"),
            Dpt1::State => ("inactive", "active"),
            Dpt1::Invert => ("not inverted", "inverted"),
        }
    }

    /// Label for a state.
    pub const fn label(&self, value: bool) -> &'static str {
        let (off, on) = self.labels();
        if value {
            on
        } else {
            off
        }
    }

    /// Parse a label, `0`/`1` or `false`/`true`.
    pub fn parse_label(&self, text: &str) -> Result<bool> {
        let (off, on) = self.labels();
        if text.eq_ignore_ascii_case(on) || text == "1" || text.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if text.eq_ignore_ascii_case(off) || text == "0" || text.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(KnxError::invalid_dpt_text())
        }
    }
}

impl DptEncode<bool> for Dpt1 {
    fn encode(&self, value: bool) -> Result<Asdu> {
        asdu_from(&[u8::from(value)])
    }
}

impl DptDecode<bool> for Dpt1 {
    fn decode(&self, data: &[u8]) -> Result<bool> {
        expect_len(data, 1)?;
        match data[0] {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(KnxError::dpt_value_out_of_range()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(Dpt1::Switch.encode(false).unwrap().as_slice(), &[0x00]);
        assert_eq!(Dpt1::Switch.encode(true).unwrap().as_slice(), &[0x01]);
    }

    #[test]
    fn test_decode() {
        assert!(!Dpt1::Switch.decode(&[0x00]).unwrap());
        assert!(Dpt1::Switch.decode(&[0x01]).unwrap());
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(Dpt1::Switch.decode(&[]).unwrap_err().is_translation_error());
        assert!(Dpt1::Switch.decode(&[0x00, 0x01]).unwrap_err().is_translation_error());
    }

    #[test]
    fn test_decode_rejects_out_of_range_bits() {
        let err = Dpt1::Switch.decode(&[0x02]).unwrap_err();
        assert!(matches!(err, KnxError::Translation(ref e) if e.is_out_of_range()));
    }

    #[test]
    fn test_subtypes() {
        assert_eq!(Dpt1::from_subtype(1), Some(Dpt1::Switch));
        assert_eq!(Dpt1::from_subtype(12), Some(Dpt1::Invert));
        assert_eq!(Dpt1::from_subtype(0), None);
        assert_eq!(Dpt1::from_subtype(13), None);
        for (i, dpt) in Dpt1::ALL.iter().enumerate() {
            assert_eq!(dpt.identifier(), format!("1.{:03}", i + 1));
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(Dpt1::UpDown.label(true), "down");
        assert!(Dpt1::OpenClose.parse_label("Open").is_ok_and(|v| !v));
        assert!(Dpt1::Switch.parse_label("maybe").is_err());
    }
}
