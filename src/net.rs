//! Transports carrying KNXnet/IP frames.
//!
//! Physical drivers (TCP sockets, USB, serial lines) live outside this
//! crate and plug in through [`transport::Transport`]. An in-process
//! implementation is provided for tests and simulations.

pub mod memory;
pub mod transport;

pub use memory::MemoryTransport;
pub use transport::Transport;
