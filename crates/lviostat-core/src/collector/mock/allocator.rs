//! Fixed allocator totals for tests.

use crate::collector::procfs::CollectError;
use crate::collector::traits::MemorySource;
use crate::storage::model::MemSample;

/// [`MemorySource`] returning preset totals, or failing on demand.
#[derive(Debug, Clone, Default)]
pub struct MockAllocator {
    pub allocated: u64,
    pub resident: u64,
    pub fail: bool,
}

impl MockAllocator {
    pub fn new(allocated: u64, resident: u64) -> Self {
        Self {
            allocated,
            resident,
            fail: false,
        }
    }
}

impl MemorySource for MockAllocator {
    fn sample(&mut self) -> Result<MemSample, CollectError> {
        if self.fail {
            return Err(CollectError::Allocator("epoch refresh failed".to_string()));
        }
        Ok(MemSample {
            allocated: self.allocated,
            resident: self.resident,
        })
    }
}
