//! Domain types and the ports adapters implement.

pub mod client;
pub mod ports;
pub mod process;
pub mod receipt;
pub mod transaction;
