//! Common External Message Interface (cEMI) `L_Data` frames.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Message Code (1 byte)                    │
//! │ Additional Info Length (1 byte)          │
//! │ Additional Info (variable, skipped)      │
//! ├──────────────────────────────────────────┤
//! │ Control Field 1 (1 byte)                 │
//! │ Control Field 2 (1 byte)                 │
//! │ Source Address (2 bytes)                 │
//! │ Destination Address (2 bytes)            │
//! │ Length L (1 byte, octets after TPCI)     │
//! │ TPCI (1 byte) + APCI high bits           │
//! │ APCI low bits + compact data (1 byte)    │
//! │ Data (L - 1 bytes)                       │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Values of 6 bits or less travel compact in the low bits of the APCI
//! octet (`L = 1`); longer values follow the APCI octet.
//!
//! ## Example
//!
//! ```
//! use knx_link::protocol::cemi::{GroupService, LDataFrame};
//! use knx_link::{ga, IndividualAddress};
//!
//! let frame = LDataFrame::group(
//!     GroupService::Write,
//!     IndividualAddress::new(1, 1, 10)?,
//!     ga!(1/0/3),
//!     &[0x01],
//!     true,
//! )?;
//! let bytes = frame.encode()?;
//! assert_eq!(bytes, [0x11, 0x00, 0xBC, 0xE0, 0x11, 0x0A, 0x08, 0x03, 0x01, 0x00, 0x81]);
//! assert_eq!(LDataFrame::parse(&bytes)?, frame);
//! # Ok::<(), knx_link::KnxError>(())
//! ```

use crate::addressing::{GroupAddress, IndividualAddress};
use crate::dpt::{asdu_from, Asdu};
use crate::error::{KnxError, Result};
use crate::protocol::constants::{CEMIMessageCode, Priority};

/// Largest value that fits compact into the APCI octet
const COMPACT_MAX: u8 = 0x3F;

/// Control Field 1 of an `L_Data` frame
///
/// ```text
/// Bit 7: frame type (1 = standard)
/// Bit 5: repeat (1 = do not repeat)
/// Bit 4: system broadcast (1 = broadcast)
/// Bit 3-2: priority
/// Bit 1: acknowledge request
/// Bit 0: confirm (1 = error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField1 {
    raw: u8,
}

impl From<u8> for ControlField1 {
    #[inline(always)]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField1> for u8 {
    #[inline(always)]
    fn from(ctrl: ControlField1) -> u8 {
        ctrl.raw
    }
}

impl ControlField1 {
    /// Standard frame, do not repeat, broadcast, given priority
    pub const fn with_priority(priority: Priority) -> Self {
        Self {
            raw: 0x80 | 0x20 | 0x10 | (priority.to_u8() << 2),
        }
    }

    /// Check if frame is standard (true) or extended (false)
    #[inline(always)]
    pub const fn is_standard_frame(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Get priority
    #[inline(always)]
    pub const fn priority(self) -> Priority {
        Priority::from_u8((self.raw >> 2) & 0x03)
    }

    /// Check if confirm error flag is set
    #[inline(always)]
    pub const fn has_error(self) -> bool {
        (self.raw & 0x01) != 0
    }
}

impl Default for ControlField1 {
    /// 0xBC: standard frame, low priority
    #[inline]
    fn default() -> Self {
        Self::with_priority(Priority::Low)
    }
}

/// Control Field 2 of an `L_Data` frame
///
/// ```text
/// Bit 7: destination address type (1 = group)
/// Bit 6-4: hop count
/// Bit 3-0: extended frame format
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField2 {
    raw: u8,
}

impl From<u8> for ControlField2 {
    #[inline(always)]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField2> for u8 {
    #[inline(always)]
    fn from(ctrl: ControlField2) -> u8 {
        ctrl.raw
    }
}

impl ControlField2 {
    /// Create a new Control Field 2 (hop count is masked to 3 bits)
    pub const fn new(is_group: bool, hop_count: u8) -> Self {
        let group = if is_group { 0x80 } else { 0x00 };
        Self {
            raw: group | ((hop_count & 0x07) << 4),
        }
    }

    /// Check if destination is a group address
    #[inline(always)]
    pub const fn is_group_address(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Routing hop count
    #[inline(always)]
    pub const fn hop_count(self) -> u8 {
        (self.raw >> 4) & 0x07
    }
}

/// APCI (Application Layer Protocol Control Information), 10 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apci {
    /// `A_GroupValue_Read`
    GroupValueRead,
    /// `A_GroupValue_Response`
    GroupValueResponse,
    /// `A_GroupValue_Write`
    GroupValueWrite,
    /// Any other service, raw value with data bits cleared
    Other(u16),
}

impl Apci {
    /// Decode from the TPCI octet (bits 1-0) and APCI octet (bits 7-6).
    pub const fn from_bytes(tpci: u8, apci: u8) -> Self {
        match ((tpci as u16 & 0x03) << 8) | (apci as u16 & 0xC0) {
            0x000 => Self::GroupValueRead,
            0x040 => Self::GroupValueResponse,
            0x080 => Self::GroupValueWrite,
            other => Self::Other(other),
        }
    }

    /// Raw 10-bit value
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::GroupValueRead => 0x000,
            Self::GroupValueResponse => 0x040,
            Self::GroupValueWrite => 0x080,
            Self::Other(val) => val,
        }
    }
}

/// Group communication service of a telegram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupService {
    /// `A_GroupValue_Read`
    Read,
    /// `A_GroupValue_Response`
    Response,
    /// `A_GroupValue_Write`
    Write,
}

impl GroupService {
    /// APCI carrying this service
    pub const fn apci(self) -> Apci {
        match self {
            Self::Read => Apci::GroupValueRead,
            Self::Response => Apci::GroupValueResponse,
            Self::Write => Apci::GroupValueWrite,
        }
    }

    /// Service carried by `apci`, if it is a group value service
    pub const fn from_apci(apci: Apci) -> Option<Self> {
        match apci {
            Apci::GroupValueRead => Some(Self::Read),
            Apci::GroupValueResponse => Some(Self::Response),
            Apci::GroupValueWrite => Some(Self::Write),
            Apci::Other(_) => None,
        }
    }
}

/// Destination of an `L_Data` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Multicast to a group
    Group(GroupAddress),
    /// Point-to-point to one device
    Individual(IndividualAddress),
}

impl Destination {
    fn raw(self) -> u16 {
        match self {
            Self::Group(ga) => ga.raw(),
            Self::Individual(ia) => ia.raw(),
        }
    }
}

/// Owned cEMI `L_Data` frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LDataFrame {
    /// `L_Data.req`, `.ind` or `.con`
    pub message_code: CEMIMessageCode,
    /// Control field 1
    pub ctrl1: ControlField1,
    /// Control field 2
    pub ctrl2: ControlField2,
    /// Source address
    pub source: IndividualAddress,
    /// Destination address
    pub destination: Destination,
    /// Application service
    pub apci: Apci,
    /// Application data; for compact frames the 6-bit value
    pub data: Asdu,
    /// Whether `data` travels inside the APCI octet
    pub compact: bool,
}

impl LDataFrame {
    /// Bytes before the NPDU: ctrl1, ctrl2, source, destination, length
    const SERVICE_HEADER: usize = 7;

    /// Build an `L_Data.req` group telegram.
    ///
    /// `compact` requests the 6-bit encoding; `asdu` must then be empty (read)
    /// or a single byte not above `0x3F`.
    pub fn group(
        service: GroupService,
        source: IndividualAddress,
        destination: GroupAddress,
        asdu: &[u8],
        compact: bool,
    ) -> Result<Self> {
        if compact && (asdu.len() > 1 || asdu.first().is_some_and(|b| *b > COMPACT_MAX)) {
            return Err(KnxError::dpt_value_out_of_range());
        }
        Ok(Self {
            message_code: CEMIMessageCode::LDataReq,
            ctrl1: ControlField1::default(),
            ctrl2: ControlField2::new(true, 6),
            source,
            destination: Destination::Group(destination),
            apci: service.apci(),
            data: asdu_from(asdu)?,
            compact: compact || asdu.is_empty(),
        })
    }

    /// Same frame with another message code
    #[must_use]
    pub fn with_message_code(mut self, code: CEMIMessageCode) -> Self {
        self.message_code = code;
        self
    }

    /// Group service, if this is group communication
    pub fn group_service(&self) -> Option<GroupService> {
        match self.destination {
            Destination::Group(_) => GroupService::from_apci(self.apci),
            Destination::Individual(_) => None,
        }
    }

    /// Destination group address, if any
    pub fn destination_group(&self) -> Option<GroupAddress> {
        match self.destination {
            Destination::Group(ga) => Some(ga),
            Destination::Individual(_) => None,
        }
    }

    /// Encode into cEMI bytes (without additional info)
    pub fn encode(&self) -> Result<Vec<u8>> {
        let apci = self.apci.to_u16();
        let (low_bits, extra): (u8, &[u8]) = if self.compact {
            (self.data.first().copied().unwrap_or(0) & COMPACT_MAX, &[])
        } else {
            (0, &self.data)
        };

        let mut out = Vec::with_capacity(2 + Self::SERVICE_HEADER + 2 + extra.len());
        out.extend_from_slice(&[self.message_code.to_u8(), 0x00]);
        out.extend_from_slice(&[self.ctrl1.into(), self.ctrl2.into()]);
        out.extend_from_slice(&self.source.to_bytes());
        out.extend_from_slice(&self.destination.raw().to_be_bytes());
        out.push(1 + extra.len() as u8);
        out.push((apci >> 8) as u8 & 0x03);
        out.push((apci & 0xC0) as u8 | low_bits);
        out.extend_from_slice(extra);
        Ok(out)
    }

    /// Parse cEMI bytes, skipping additional info.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let [code, info_len, ..] = *data else {
            return Err(KnxError::invalid_frame());
        };
        let message_code = CEMIMessageCode::from_u8(code).ok_or_else(KnxError::invalid_message_code)?;
        let service = data
            .get(2 + usize::from(info_len)..)
            .ok_or_else(KnxError::invalid_frame)?;

        let [ctrl1, ctrl2, s_hi, s_lo, d_hi, d_lo, length, tpci, ref npdu @ ..] = *service else {
            return Err(KnxError::invalid_frame());
        };
        let ctrl2 = ControlField2::from(ctrl2);
        let destination_raw = u16::from_be_bytes([d_hi, d_lo]);
        let destination = if ctrl2.is_group_address() {
            Destination::Group(GroupAddress::from(destination_raw))
        } else {
            Destination::Individual(IndividualAddress::from(destination_raw))
        };

        // Octets after TPCI: APCI + data
        let length = usize::from(length);
        let npdu = npdu.get(..length).ok_or_else(KnxError::invalid_frame)?;
        let (apci, data, compact) = match npdu {
            // Transport control telegram without application data
            [] => (Apci::Other(u16::from(tpci & 0x03) << 8), Asdu::new(), true),
            [apci_byte] => {
                let apci = Apci::from_bytes(tpci, *apci_byte);
                let data = if apci == Apci::GroupValueRead {
                    Asdu::new()
                } else {
                    asdu_from(&[*apci_byte & COMPACT_MAX])?
                };
                (apci, data, true)
            }
            [apci_byte, rest @ ..] => (Apci::from_bytes(tpci, *apci_byte), asdu_from(rest)?, false),
        };

        Ok(Self {
            message_code,
            ctrl1: ControlField1::from(ctrl1),
            ctrl2,
            source: IndividualAddress::from(u16::from_be_bytes([s_hi, s_lo])),
            destination,
            apci,
            data,
            compact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> IndividualAddress {
        IndividualAddress::new(1, 1, 10).unwrap()
    }

    #[test]
    fn test_group_read_encoding() {
        let frame = LDataFrame::group(GroupService::Read, source(), GroupAddress::from(0x0802), &[], false).unwrap();
        let bytes = frame.encode().unwrap();
        assert_eq!(&bytes[8..], &[0x01, 0x00, 0x00]);
        let parsed = LDataFrame::parse(&bytes).unwrap();
        assert_eq!(parsed.group_service(), Some(GroupService::Read));
        assert!(parsed.data.is_empty());
    }

    #[test]
    fn test_non_compact_response() {
        let frame = LDataFrame::group(
            GroupService::Response,
            source(),
            GroupAddress::from(0x0001),
            &[0x0C, 0xE2],
            false,
        )
        .unwrap();
        let bytes = frame.encode().unwrap();
        assert_eq!(&bytes[8..], &[0x03, 0x00, 0x40, 0x0C, 0xE2]);
        let parsed = LDataFrame::parse(&bytes).unwrap();
        assert_eq!(parsed.group_service(), Some(GroupService::Response));
        assert_eq!(parsed.data.as_slice(), &[0x0C, 0xE2]);
        assert!(!parsed.compact);
    }

    #[test]
    fn test_compact_rejects_wide_values() {
        let result = LDataFrame::group(GroupService::Write, source(), GroupAddress::from(1), &[0x40], true);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_skips_additional_info() {
        let bytes = [
            0x29, 0x02, 0xAA, 0xBB, // L_Data.ind with 2 bytes additional info
            0xBC, 0xE0, 0x11, 0x05, 0x08, 0x03, 0x01, 0x00, 0x80,
        ];
        let parsed = LDataFrame::parse(&bytes).unwrap();
        assert_eq!(parsed.message_code, CEMIMessageCode::LDataInd);
        assert_eq!(parsed.source.to_string(), "1.1.5");
        assert_eq!(parsed.destination_group(), Some(GroupAddress::from(0x0803)));
        assert_eq!(parsed.group_service(), Some(GroupService::Write));
        assert_eq!(parsed.data.as_slice(), &[0x00]);
    }

    #[test]
    fn test_parse_rejects_truncated() {
        assert!(LDataFrame::parse(&[0x29]).is_err());
        assert!(LDataFrame::parse(&[0x29, 0x00, 0xBC, 0xE0, 0x11, 0x05, 0x08, 0x03, 0x03, 0x00, 0x80]).is_err());
        assert!(LDataFrame::parse(&[0x99, 0x00]).is_err());
    }

    #[test]
    fn test_individual_destination_has_no_group_service() {
        let bytes = [0x29, 0x00, 0xB0, 0x60, 0x11, 0x05, 0x11, 0x01, 0x01, 0x00, 0x80];
        let parsed = LDataFrame::parse(&bytes).unwrap();
        assert_eq!(parsed.group_service(), None);
        assert_eq!(parsed.destination_group(), None);
    }
}
