//! Unified logging macro for the crate.
//!
//! All internal logging goes through [`knx_log!`](crate::knx_log), which
//! forwards to the `log` facade. Records keep the module path as their
//! target, so applications can filter link, session and process traffic
//! independently (`RUST_LOG=knx_link::secure=debug`).
//!
//! # Usage
//!
//! ```rust
//! use knx_link::knx_log;
//!
//! knx_log!(info, "Connection established");
//! knx_log!(debug, "Received {} bytes", 42);
//! ```
//!
//! Key material and passwords must never be passed to this macro.

/// Unified logging macro over the `log` crate.
///
/// Accepts the level as the first token (`trace`, `debug`, `info`, `warn`,
/// `error`) followed by the usual format arguments.
#[macro_export]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { ::log::info!($($arg)*) };
    (debug, $($arg:tt)*) => { ::log::debug!($($arg)*) };
    (warn, $($arg:tt)*) => { ::log::warn!($($arg)*) };
    (error, $($arg:tt)*) => { ::log::error!($($arg)*) };
    (trace, $($arg:tt)*) => { ::log::trace!($($arg)*) };
}
