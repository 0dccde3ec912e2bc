//! lviostat-core - statistics engine behind the `lviostat` report tool.
//!
//! Provides:
//! - `dmstats` - device-mapper statistics regions (create, read, delete)
//! - `lvm` - logical volume metadata resolution and caching
//! - `storage` - counter samples and the two-slot sample store
//! - `rates` - iostat-style metric derivation from counter deltas
//! - `collector` - one sampling round (dm-stats, `/proc/stat`, `/proc/uptime`, allocator totals)
//! - `report` - textual report rendering
//! - `scheduler` - the timed report loop
//! - `config` - validated report configuration

pub mod collector;
pub mod config;
pub mod dmstats;
pub mod error;
pub mod lvm;
pub mod rates;
pub mod report;
pub mod scheduler;
pub mod storage;

pub use error::Error;
