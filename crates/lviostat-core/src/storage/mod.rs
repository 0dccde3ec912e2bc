//! Sample data model and the double-buffered store.

pub mod model;
pub mod store;

pub use model::{AreaId, CounterSample, CpuSample, MemSample, UptimeSample};
pub use store::{MissingSampleError, RegionId, SampleSet, SampleStore, Slot};
