//! Two-slot sample store.
//!
//! Each slot maps device → region → area → [`CounterSample`] and carries the
//! CPU, memory and uptime samples taken in the same round. `swap()` only
//! flips an index; samples are never copied or mutated by it.

use std::collections::BTreeMap;
use std::fmt;

use crate::storage::model::{AreaId, CounterSample, CpuSample, MemSample, UptimeSample};

/// Identifier of a dm-stats region as returned by `@stats_create`.
pub type RegionId = u64;

/// Which of the two buffers an operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Current,
    Previous,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Current => write!(f, "current"),
            Slot::Previous => write!(f, "previous"),
        }
    }
}

/// Requested area has no sample in the given slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSampleError {
    pub slot: Slot,
    pub device: String,
    pub region: RegionId,
    pub area: AreaId,
}

impl fmt::Display for MissingSampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no {} sample for {} region {} area {}",
            self.slot, self.device, self.region, self.area
        )
    }
}

impl std::error::Error for MissingSampleError {}

type RegionSamples = BTreeMap<RegionId, BTreeMap<AreaId, CounterSample>>;

/// Everything captured in one sampling round.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    /// Devices in first-write order.
    devices: Vec<(String, RegionSamples)>,
    pub cpu: Option<CpuSample>,
    pub mem: Option<MemSample>,
    pub uptime: Option<UptimeSample>,
}

impl SampleSet {
    fn device_mut(&mut self, device: &str) -> &mut RegionSamples {
        let idx = match self.devices.iter().position(|(name, _)| name == device) {
            Some(idx) => idx,
            None => {
                self.devices.push((device.to_string(), BTreeMap::new()));
                self.devices.len() - 1
            }
        };
        &mut self.devices[idx].1
    }

    fn get(&self, device: &str, region: RegionId, area: &AreaId) -> Option<&CounterSample> {
        self.devices
            .iter()
            .find(|(name, _)| name == device)
            .and_then(|(_, regions)| regions.get(&region))
            .and_then(|areas| areas.get(area))
    }

    /// Number of area samples held.
    pub fn len(&self) -> usize {
        self.devices
            .iter()
            .flat_map(|(_, regions)| regions.values())
            .map(|areas| areas.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates samples in report order: devices by insertion, regions by id,
    /// areas by start offset.
    pub fn iter(&self) -> impl Iterator<Item = (&str, RegionId, &CounterSample)> {
        self.devices.iter().flat_map(|(device, regions)| {
            regions.iter().flat_map(move |(region, areas)| {
                areas
                    .values()
                    .map(move |sample| (device.as_str(), *region, sample))
            })
        })
    }

    /// Number of (region, area) pairs recorded for a device.
    pub fn device_area_count(&self, device: &str) -> usize {
        self.devices
            .iter()
            .find(|(name, _)| name == device)
            .map(|(_, regions)| regions.values().map(|a| a.len()).sum())
            .unwrap_or(0)
    }

    fn clear(&mut self) {
        self.devices.clear();
        self.cpu = None;
        self.mem = None;
        self.uptime = None;
    }
}

/// Double-buffered store of samples.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    slots: [SampleSet; 2],
    current: usize,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self, slot: Slot) -> usize {
        match slot {
            Slot::Current => self.current,
            Slot::Previous => self.current ^ 1,
        }
    }

    /// Returns the whole sample set of a slot.
    pub fn slot(&self, slot: Slot) -> &SampleSet {
        &self.slots[self.index(slot)]
    }

    /// Mutable access to a slot, used for the auxiliary samples.
    pub fn slot_mut(&mut self, slot: Slot) -> &mut SampleSet {
        let idx = self.index(slot);
        &mut self.slots[idx]
    }

    /// Inserts or overwrites a sample, creating intermediate maps as needed.
    pub fn write(&mut self, slot: Slot, device: &str, region: RegionId, sample: CounterSample) {
        self.slot_mut(slot)
            .device_mut(device)
            .entry(region)
            .or_default()
            .insert(sample.area, sample);
    }

    /// Reads one area sample from a slot.
    pub fn read(
        &self,
        slot: Slot,
        device: &str,
        region: RegionId,
        area: &AreaId,
    ) -> Result<&CounterSample, MissingSampleError> {
        self.slot(slot)
            .get(device, region, area)
            .ok_or_else(|| MissingSampleError {
                slot,
                device: device.to_string(),
                region,
                area: *area,
            })
    }

    /// Flips current and previous.
    pub fn swap(&mut self) {
        self.current ^= 1;
    }

    /// Drops every sample held by a slot.
    pub fn clear(&mut self, slot: Slot) {
        self.slot_mut(slot).clear();
    }
}
