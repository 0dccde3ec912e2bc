//! Samplers for the Linux `/proc` filesystem.
//!
//! CPU and uptime feed the auxiliary report line and the interval
//! computation.

pub mod parser;
pub mod system;

pub use system::{CollectError, SystemCollector};
