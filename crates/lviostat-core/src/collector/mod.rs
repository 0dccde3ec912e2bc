//! Sample collection.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        SampleCollector                        │
//! │  ┌──────────────────┐  ┌─────────────────┐  ┌──────────────┐  │
//! │  │  RegionManager   │  │ SystemCollector │  │ memory line  │  │
//! │  │  - @stats_print  │  │ - /proc/stat    │  │ - allocated  │  │
//! │  │  - counter lines │  │ - /proc/uptime  │  │ - resident   │  │
//! │  └────────┬─────────┘  └────────┬────────┘  └──────┬───────┘  │
//! │   ┌───────▼───────┐      ┌──────▼─────┐     ┌──────▼───────┐  │
//! │   │ StatsFacility │      │ FileSystem │     │ MemorySource │  │
//! │   └───────┬───────┘      └──────┬─────┘     └──────┬───────┘  │
//! └───────────┼─────────────────────┼──────────────────┼──────────┘
//!   DmSetup / MockFacility    RealFs / MockFs   jemalloc / MockAllocator
//! ```
//!
//! # Usage
//!
//! ```
//! use lviostat_core::collector::{MockAllocator, MockFacility, MockFs, SampleCollector};
//! use lviostat_core::dmstats::{Partition, RegionManager, RegionRange};
//! use lviostat_core::storage::{SampleStore, Slot};
//!
//! let mut facility = MockFacility::new();
//! facility.add_device("vg0-lv0", 2048);
//! let mut regions = RegionManager::new(facility, "lviostat");
//! regions.create_region("vg0-lv0", RegionRange::Whole, Partition::Single).unwrap();
//!
//! let mut collector = SampleCollector::new(
//!     MockFs::typical_system(),
//!     "/proc",
//!     MockAllocator::default(),
//! );
//! let mut store = SampleStore::new();
//! collector.collect(&mut regions, &mut store, Slot::Current).unwrap();
//! assert_eq!(store.slot(Slot::Current).len(), 1);
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod mock;
pub mod procfs;
pub mod traits;

pub use collector::{CollectorTiming, SampleCollector};
pub use mock::{MockAllocator, MockFacility, MockFs};
pub use procfs::CollectError;
pub use traits::{FileSystem, MemorySource, RealFs};
