//! Test doubles for the external collaborators.
//!
//! - [`MockFs`] - in-memory `/proc`
//! - [`MockFacility`] - in-memory dm-stats with failure injection
//! - [`MockAllocator`] - fixed allocator totals

mod allocator;
mod facility;
mod filesystem;

pub use allocator::MockAllocator;
pub use facility::MockFacility;
pub use filesystem::MockFs;
