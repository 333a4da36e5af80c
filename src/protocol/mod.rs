//! KNXnet/IP protocol implementation.
//!
//! This module contains the wire structures and parsing logic for
//! KNXnet/IP frames, tunneling and secure session services, and cEMI
//! `L_Data` telegrams. Nothing here performs I/O.

pub mod cemi;
pub mod constants;
pub mod frame;
pub mod secure;
pub mod services;
pub mod tunnel;

pub use cemi::{Destination, GroupService, LDataFrame};
pub use constants::*;
pub use frame::*;
pub use services::*;
