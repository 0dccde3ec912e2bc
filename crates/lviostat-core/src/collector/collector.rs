//! One sampling round.
//!
//! The `SampleCollector` reads every area of every registered region plus
//! the CPU, allocator and uptime samples, and writes them into one slot of
//! the [`SampleStore`].

use std::time::{Duration, Instant};

use tracing::debug;

use crate::collector::procfs::SystemCollector;
use crate::collector::traits::{FileSystem, MemorySource};
use crate::dmstats::{RegionManager, StatsFacility};
use crate::error::Error;
use crate::storage::store::{RegionId, SampleStore, Slot};

/// Timing information of the last round.
#[derive(Debug, Clone, Default)]
pub struct CollectorTiming {
    /// Total round time.
    pub total: Duration,
    /// Time spent in dm-stats reads.
    pub regions: Duration,
    /// Number of areas read.
    pub areas: usize,
}

/// Collects complete sample sets.
pub struct SampleCollector<F: FileSystem> {
    system: SystemCollector<F>,
    memory: Box<dyn MemorySource>,
    last_timing: Option<CollectorTiming>,
}

impl<F: FileSystem> SampleCollector<F> {
    /// Creates a new collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    /// * `memory` - Allocator statistics behind the memory line
    pub fn new(
        fs: F,
        proc_path: impl Into<String>,
        memory: impl MemorySource + 'static,
    ) -> Self {
        Self {
            system: SystemCollector::new(fs, proc_path),
            memory: Box::new(memory),
            last_timing: None,
        }
    }

    pub fn system_mut(&mut self) -> &mut SystemCollector<F> {
        &mut self.system
    }

    /// Returns timing information from the last successful round.
    pub fn last_timing(&self) -> Option<&CollectorTiming> {
        self.last_timing.as_ref()
    }

    /// Fills `slot` with a fresh sample set.
    ///
    /// The slot is cleared first. Any failure aborts the round: a partial
    /// sample set cannot produce a consistent interval.
    pub fn collect<S: StatsFacility>(
        &mut self,
        regions: &mut RegionManager<S>,
        store: &mut SampleStore,
        slot: Slot,
    ) -> Result<(), Error> {
        let total_start = Instant::now();
        let mut timing = CollectorTiming::default();

        store.clear(slot);

        let uptime = self.system.collect_uptime()?;

        let targets: Vec<(String, RegionId)> = regions
            .regions()
            .iter()
            .map(|r| (r.device.clone(), r.id))
            .collect();

        let start = Instant::now();
        for (device, region) in targets {
            for sample in regions.list_areas(&device, region)? {
                store.write(slot, &device, region, sample);
                timing.areas += 1;
            }
        }
        timing.regions = start.elapsed();

        let cpu = self.system.collect_cpu()?;
        let mem = self.memory.sample()?;

        let set = store.slot_mut(slot);
        set.uptime = Some(uptime);
        set.cpu = Some(cpu);
        set.mem = Some(mem);

        timing.total = total_start.elapsed();
        debug!(
            "Collected {} area(s) into {} slot in {:?} (dm-stats {:?})",
            timing.areas, slot, timing.total, timing.regions
        );
        self.last_timing = Some(timing);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockAllocator, MockFacility, MockFs};
    use crate::collector::procfs::CollectError;
    use crate::dmstats::{Partition, RegionRange};
    use crate::storage::model::{AreaId, MemSample};

    fn setup() -> (
        SampleCollector<MockFs>,
        RegionManager<MockFacility>,
        SampleStore,
    ) {
        let mut facility = MockFacility::new();
        facility.add_device("vg0-a", 1000);
        facility.add_device("vg0-b", 500);
        let mut regions = RegionManager::new(facility, "lviostat");
        regions
            .create_region("vg0-a", RegionRange::Whole, Partition::AreaCount(2))
            .unwrap();
        regions
            .create_region("vg0-b", RegionRange::Whole, Partition::Single)
            .unwrap();
        (
            SampleCollector::new(
                MockFs::typical_system(),
                "/proc",
                MockAllocator::new(4 << 20, 6 << 20),
            ),
            regions,
            SampleStore::new(),
        )
    }

    #[test]
    fn test_collect_fills_one_slot() {
        let (mut collector, mut regions, mut store) = setup();

        collector
            .collect(&mut regions, &mut store, Slot::Previous)
            .unwrap();

        let set = store.slot(Slot::Previous);
        assert_eq!(set.len(), 3);
        assert_eq!(set.device_area_count("vg0-a"), 2);
        assert_eq!(set.uptime.unwrap().ticks, 1_000_000);
        assert!(set.cpu.is_some());
        assert_eq!(
            set.mem,
            Some(MemSample {
                allocated: 4 << 20,
                resident: 6 << 20
            })
        );
        assert!(store.slot(Slot::Current).is_empty());
        assert_eq!(collector.last_timing().unwrap().areas, 3);

        assert!(
            store
                .read(Slot::Previous, "vg0-a", 0, &AreaId::new(500, 500))
                .is_ok()
        );
    }

    #[test]
    fn test_area_read_failure_fails_round() {
        let (mut collector, mut regions, mut store) = setup();
        let mut broken = MockFacility::new();
        broken.fail_print = true;
        broken.add_device("vg0-a", 1000);
        let mut broken_regions = RegionManager::new(broken, "lviostat");
        broken_regions
            .create_region("vg0-a", RegionRange::Whole, Partition::Single)
            .unwrap();

        assert!(matches!(
            collector.collect(&mut broken_regions, &mut store, Slot::Current),
            Err(Error::Registration(_))
        ));

        // the healthy manager still works with the same collector
        collector
            .collect(&mut regions, &mut store, Slot::Current)
            .unwrap();
    }

    #[test]
    fn test_allocator_failure_fails_round() {
        let (_, mut regions, mut store) = setup();
        let mut collector = SampleCollector::new(
            MockFs::typical_system(),
            "/proc",
            MockAllocator {
                fail: true,
                ..MockAllocator::default()
            },
        );

        let err = collector
            .collect(&mut regions, &mut store, Slot::Current)
            .unwrap_err();
        assert!(matches!(err, Error::Collect(CollectError::Allocator(_))));
        assert!(store.slot(Slot::Current).mem.is_none());
    }

    #[test]
    fn test_missing_uptime_fails_round() {
        let (mut collector, mut regions, mut store) = setup();
        collector.system_mut().fs_mut().remove_file("/proc/uptime");

        assert!(matches!(
            collector.collect(&mut regions, &mut store, Slot::Current),
            Err(Error::Collect(_))
        ));
    }
}
