//! Region lifecycle: creation, reading and teardown.

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::ConfigurationError;
use crate::dmstats::parser::{RegionEntry, parse_print_output, parse_region_list};
use crate::dmstats::{RegistrationError, StatsFacility};
use crate::error::Error;
use crate::lvm::VolumeInfo;
use crate::storage::model::{AreaId, CounterSample};
use crate::storage::store::RegionId;

/// Address range of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionRange {
    /// The whole device (`-` in dm-stats syntax).
    Whole,
    /// `length` sectors starting at `start`.
    Span { start: u64, length: u64 },
}

impl fmt::Display for RegionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionRange::Whole => write!(f, "-"),
            RegionRange::Span { start, length } => write!(f, "{}+{}", start, length),
        }
    }
}

/// How a region is divided into areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Partition {
    /// One area covering the region.
    #[default]
    Single,
    /// Areas of a fixed size in sectors; the last one may be short.
    AreaSize(u64),
    /// A fixed number of areas of (nearly) equal length.
    AreaCount(u64),
}

impl Partition {
    /// Builds a partition from the raw `--area-size`/`--area-count` pair,
    /// where zero means "not requested".
    pub fn from_request(area_size: u64, area_count: u64) -> Result<Self, ConfigurationError> {
        match (area_size, area_count) {
            (0, 0) => Ok(Partition::Single),
            (size, 0) => Ok(Partition::AreaSize(size)),
            (0, count) => Ok(Partition::AreaCount(count)),
            _ => Err(ConfigurationError::new(
                "area size and area count are mutually exclusive",
            )),
        }
    }

    /// The `step` argument of `@stats_create` for this partition.
    pub fn step_arg(&self, range: RegionRange) -> String {
        match (self, range) {
            (Partition::Single, RegionRange::Span { length, .. }) => length.to_string(),
            (Partition::Single, RegionRange::Whole) => "/1".to_string(),
            (Partition::AreaSize(size), _) => size.to_string(),
            (Partition::AreaCount(count), _) => format!("/{}", count),
        }
    }

    /// Area layout of a region of `length` sectors starting at `start`.
    ///
    /// Area counts larger than the region length are clamped so that every
    /// area covers at least one sector. Remainder sectors of a count
    /// partition go one each to the leading areas.
    pub fn areas(&self, start: u64, length: u64) -> Vec<AreaId> {
        if length == 0 {
            return Vec::new();
        }

        match *self {
            Partition::Single | Partition::AreaSize(0) | Partition::AreaCount(0) => {
                vec![AreaId::new(start, length)]
            }
            Partition::AreaSize(size) => {
                let mut areas = Vec::with_capacity(length.div_ceil(size) as usize);
                let mut offset = 0;
                while offset < length {
                    let len = size.min(length - offset);
                    areas.push(AreaId::new(start + offset, len));
                    offset += len;
                }
                areas
            }
            Partition::AreaCount(count) => {
                let count = count.min(length);
                let base = length / count;
                let remainder = length % count;
                let mut areas = Vec::with_capacity(count as usize);
                let mut offset = start;
                for i in 0..count {
                    let len = if i < remainder { base + 1 } else { base };
                    areas.push(AreaId::new(offset, len));
                    offset += len;
                }
                areas
            }
        }
    }

    /// Areas dm-stats actually creates for [`Partition::step_arg`].
    ///
    /// The kernel turns `/N` into a step of `ceil(L/N)`, so a count
    /// partition can end up with fewer than `N` areas (9 sectors split `/6`
    /// gives 5 areas of 2, 2, 2, 2 and 1 sectors).
    pub fn kernel_areas(&self, start: u64, length: u64) -> Vec<AreaId> {
        match *self {
            Partition::AreaCount(count) if count > 0 => {
                Partition::AreaSize(length.div_ceil(count)).areas(start, length)
            }
            _ => self.areas(start, length),
        }
    }
}

/// A region registered by this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: RegionId,
    pub device: String,
    pub range: RegionRange,
    pub partition: Partition,
}

/// Creates, reads and deletes regions, remembering every region it created
/// so that [`RegionManager::teardown`] can remove them.
pub struct RegionManager<S: StatsFacility> {
    facility: S,
    program_id: String,
    regions: Vec<Region>,
}

impl<S: StatsFacility> RegionManager<S> {
    /// Creates a manager tagging its regions with `program_id`.
    pub fn new(facility: S, program_id: impl Into<String>) -> Self {
        Self {
            facility,
            program_id: program_id.into(),
            regions: Vec::new(),
        }
    }

    /// Returns the underlying facility.
    pub fn facility(&self) -> &S {
        &self.facility
    }

    pub fn facility_mut(&mut self) -> &mut S {
        &mut self.facility
    }

    /// Regions currently registered, in creation order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Registers a region. Nothing is recorded when the facility rejects it.
    pub fn create_region(
        &mut self,
        device: &str,
        range: RegionRange,
        partition: Partition,
    ) -> Result<RegionId, RegistrationError> {
        let id = self
            .facility
            .create(device, range, partition, &self.program_id)?;

        if let RegionRange::Span { start, length } = range {
            debug!(
                "{} region {}: expecting {} area(s)",
                device,
                id,
                partition.kernel_areas(start, length).len()
            );
        }
        info!(
            "Created region {} on {} (range {}, step {})",
            id,
            device,
            range,
            partition.step_arg(range)
        );

        self.regions.push(Region {
            id,
            device: device.to_string(),
            range,
            partition,
        });
        Ok(id)
    }

    /// Registers the regions of one volume: one per segment when
    /// `segment_level` is set, otherwise one covering the whole device.
    pub fn create_for_volume(
        &mut self,
        volume: &VolumeInfo,
        segment_level: bool,
        partition: Partition,
    ) -> Result<Vec<RegionId>, RegistrationError> {
        if !segment_level {
            let id = self.create_region(&volume.dm_name, RegionRange::Whole, partition)?;
            return Ok(vec![id]);
        }

        volume
            .segments
            .iter()
            .map(|seg| {
                self.create_region(
                    &volume.dm_name,
                    RegionRange::Span {
                        start: seg.start,
                        length: seg.length,
                    },
                    partition,
                )
            })
            .collect()
    }

    /// Reads the current counters of every area of a region, sorted by start.
    pub fn list_areas(
        &mut self,
        device: &str,
        region: RegionId,
    ) -> Result<Vec<CounterSample>, Error> {
        let output = self.facility.print(device, region, false)?;
        Ok(parse_print_output(&output)?)
    }

    /// Lists regions on a device owned by this program id.
    pub fn list_regions(&mut self, device: &str) -> Result<Vec<RegionEntry>, Error> {
        let output = self.facility.list(device, &self.program_id)?;
        Ok(parse_region_list(&output)?)
    }

    /// Deletes a region created by this manager.
    ///
    /// Failures are logged and swallowed. Deleting a region that is not (or
    /// no longer) registered is a no-op.
    pub fn delete_region(&mut self, device: &str, region: RegionId) {
        let Some(pos) = self
            .regions
            .iter()
            .position(|r| r.id == region && r.device == device)
        else {
            debug!("Region {} on {} already deleted", region, device);
            return;
        };
        self.regions.remove(pos);

        match self.facility.delete(device, region) {
            Ok(()) => info!("Deleted region {} on {}", region, device),
            Err(e) => warn!("Failed to delete region {} on {}: {}", region, device, e),
        }
    }

    /// Deletes every registered region, best effort, without retries.
    pub fn teardown(&mut self) {
        if self.regions.is_empty() {
            return;
        }
        debug!("Tearing down {} region(s)", self.regions.len());

        let regions: Vec<(String, RegionId)> = self
            .regions
            .iter()
            .map(|r| (r.device.clone(), r.id))
            .collect();
        for (device, id) in regions {
            self.delete_region(&device, id);
        }
    }
}
