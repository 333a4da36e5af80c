//! KNX addressing.
//!
//! - Individual addresses for physical devices (Area.Line.Device)
//! - Group addresses for shared datapoints (Main/Middle/Sub or Main/Sub)

pub mod group;
pub mod individual;

pub use group::GroupAddress;
pub use individual::IndividualAddress;
