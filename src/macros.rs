//! Convenience macros for working with KNX addresses and process values.
//!
//! This module provides declarative macros that simplify common KNX operations
//! and make code more readable and concise.

/// Creates a [`GroupAddress`](crate::addressing::GroupAddress) from 3-level notation.
///
/// # Syntax
///
/// ```text
/// ga!(main/middle/sub)
/// ```
///
/// Where:
/// - `main`: Main group (0-31)
/// - `middle`: Middle group (0-7)
/// - `sub`: Sub group (0-255)
///
/// # Examples
///
/// ```
/// use knx_link::ga;
///
/// let light = ga!(1/0/3);
/// assert_eq!(light.to_string(), "1/0/3");
/// ```
///
/// # Compile-Time Validation
///
/// ```compile_fail
/// // main group > 31
/// let addr = knx_link::ga!(32/0/0);
/// ```
///
/// ```compile_fail
/// // middle group > 7
/// let addr = knx_link::ga!(1/8/0);
/// ```
#[macro_export]
macro_rules! ga {
    ($main:literal / $middle:literal / $sub:literal) => {{
        const _: () = {
            if $main > 31 {
                panic!("Main group must be 0-31");
            }
            if $middle > 7 {
                panic!("Middle group must be 0-7");
            }
            if $sub > 255 {
                panic!("Sub group must be 0-255");
            }
        };

        // MMMMMIII SSSSSSSS (5 bits main, 3 bits middle, 8 bits sub)
        const RAW: u16 = (($main & 0x1F) << 11) | (($middle & 0x07) << 8) | ($sub & 0xFF);
        $crate::addressing::GroupAddress::from(RAW)
    }};
}

/// Writes a value to a group address given in inline 3-level notation.
///
/// Expands to `ProcessCommunicator::write` and therefore returns a future.
///
/// ```no_run
/// # async fn demo(pc: &knx_link::ProcessCommunicator) -> knx_link::Result<()> {
/// use knx_link::{knx_write, DptValue};
///
/// knx_write!(pc, 1/0/3, DptValue::Bool(true), "1.001").await?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! knx_write {
    ($pc:expr, $main:literal / $middle:literal / $sub:literal, $value:expr, $dpt:expr) => {
        $pc.write($crate::ga!($main / $middle / $sub), &$value, $dpt)
    };
}

/// Reads a value from a group address given in inline 3-level notation.
///
/// ```no_run
/// # async fn demo(pc: &knx_link::ProcessCommunicator) -> knx_link::Result<()> {
/// use knx_link::knx_read;
///
/// let temperature = knx_read!(pc, 1/2/10, "9.001").await?;
/// # let _ = temperature;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! knx_read {
    ($pc:expr, $main:literal / $middle:literal / $sub:literal, $dpt:expr) => {
        $pc.read($crate::ga!($main / $middle / $sub), $dpt)
    };
}
