#![doc = include_str!("../README.md")]

//! ## Crate Layout
//!
//! - [`addressing`] - individual and group addresses
//! - [`dpt`] - datapoint type translators
//! - [`protocol`] - cEMI, KNXnet/IP and KNX IP Secure frames, tunnel state machine
//! - [`secure`] - key derivation, secure sessions, keyrings
//! - [`net`] - transport abstraction and an in-process transport
//! - [`link`] - [`NetworkLink`](link::NetworkLink), decoded telegrams over a transport
//! - [`process`] - [`ProcessCommunicator`], typed group reads and writes
//! - [`device`] - datapoint model and device service logic
//! - [`config`] - link configuration

pub mod addressing;
pub mod config;
pub mod device;
pub mod dpt;
pub mod error;
pub mod link;
pub mod net;
pub mod process;
pub mod protocol;
pub mod secure;

// Macro modules (must be declared before use)
#[macro_use]
pub mod macros;
#[macro_use]
pub mod logging;

// Re-export commonly used types
#[doc(inline)]
pub use addressing::{GroupAddress, IndividualAddress};
#[doc(inline)]
pub use config::LinkConfig;
#[doc(inline)]
pub use dpt::{DatapointType, DptValue};
#[doc(inline)]
pub use error::{KnxError, Result};
#[doc(inline)]
pub use link::NetworkLink;
#[doc(inline)]
pub use process::ProcessCommunicator;
