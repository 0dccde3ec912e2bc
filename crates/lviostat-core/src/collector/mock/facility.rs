//! In-memory dm-stats facility for tests.
//!
//! Behaves like the kernel side of `dmsetup message @stats_*`: devices have
//! a size, regions get increasing ids per device, areas follow the kernel's
//! step rounding ([`Partition::kernel_areas`]) and `print` renders the same
//! counter lines the kernel does. Individual operations can be told to fail.

use std::collections::{BTreeMap, HashMap};

use crate::dmstats::{Partition, RegionRange, RegistrationError, StatsFacility};
use crate::storage::model::CounterSample;
use crate::storage::store::RegionId;

#[derive(Debug, Clone)]
struct MockRegion {
    program_id: String,
    step: String,
    start: u64,
    length: u64,
    areas: Vec<CounterSample>,
}

/// Scriptable [`StatsFacility`].
#[derive(Debug, Clone, Default)]
pub struct MockFacility {
    /// Device sizes in sectors.
    devices: HashMap<String, u64>,
    regions: BTreeMap<(String, RegionId), MockRegion>,
    next_id: HashMap<String, RegionId>,

    pub fail_create: bool,
    pub fail_print: bool,
    pub fail_delete: bool,
    /// Emit area lines in descending start order.
    pub reverse_output: bool,
    /// Append the read/write service-time pair to every line.
    pub service_times: bool,
    /// Answer `print` with a truncated counter line.
    pub malformed_output: bool,
    /// Every `(device, region)` passed to `delete`, successful or not.
    pub delete_attempts: Vec<(String, RegionId)>,
}

impl MockFacility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device of `size` sectors.
    pub fn add_device(&mut self, name: &str, size: u64) {
        self.devices.insert(name.to_string(), size);
    }

    /// Regions currently registered, as `(device, id)`.
    pub fn registered(&self) -> Vec<(String, RegionId)> {
        self.regions.keys().cloned().collect()
    }

    /// Applies `f` to every area of a region.
    pub fn update_counters(
        &mut self,
        device: &str,
        region: RegionId,
        mut f: impl FnMut(&mut CounterSample),
    ) {
        if let Some(r) = self.regions.get_mut(&(device.to_string(), region)) {
            r.areas.iter_mut().for_each(&mut f);
        }
    }

    /// Applies `f` to every area of every region of a device.
    pub fn update_device(&mut self, device: &str, mut f: impl FnMut(&mut CounterSample)) {
        for ((dev, _), r) in self.regions.iter_mut() {
            if dev == device {
                r.areas.iter_mut().for_each(&mut f);
            }
        }
    }

    fn format_line(&self, s: &CounterSample) -> String {
        let mut line = format!(
            "{} {} {} {} {} {} {} {} {} {} {} {}",
            s.area,
            s.rd_ios,
            s.rd_merges,
            s.rd_sectors,
            s.rd_ticks,
            s.wr_ios,
            s.wr_merges,
            s.wr_sectors,
            s.wr_ticks,
            s.ios_in_progress,
            s.tot_ticks,
            s.rq_ticks
        );
        if self.service_times {
            line.push_str(&format!(
                " {} {}",
                s.rd_service_ms.unwrap_or(s.rd_ticks),
                s.wr_service_ms.unwrap_or(s.wr_ticks)
            ));
        }
        line
    }
}

impl StatsFacility for MockFacility {
    fn create(
        &mut self,
        device: &str,
        range: RegionRange,
        partition: Partition,
        program_id: &str,
    ) -> Result<RegionId, RegistrationError> {
        if self.fail_create {
            return Err(RegistrationError::new("create", device, "Invalid argument"));
        }
        let size = *self
            .devices
            .get(device)
            .ok_or_else(|| RegistrationError::new("create", device, "No such device"))?;

        let (start, length) = match range {
            RegionRange::Whole => (0, size),
            RegionRange::Span { start, length } => (start, length),
        };
        if length == 0 || start + length > size {
            return Err(RegistrationError::new("create", device, "Invalid range"));
        }

        let id = self.next_id.entry(device.to_string()).or_insert(0);
        let region = *id;
        *id += 1;

        let areas = partition
            .kernel_areas(start, length)
            .into_iter()
            .map(|area| CounterSample {
                area,
                ..CounterSample::default()
            })
            .collect();
        self.regions.insert(
            (device.to_string(), region),
            MockRegion {
                program_id: program_id.to_string(),
                step: partition.step_arg(range),
                start,
                length,
                areas,
            },
        );
        Ok(region)
    }

    fn list(&mut self, device: &str, program_id: &str) -> Result<String, RegistrationError> {
        let mut out = String::new();
        for ((dev, id), r) in &self.regions {
            if dev == device && r.program_id == program_id {
                out.push_str(&format!(
                    "{}: {}+{} {} {} -\n",
                    id, r.start, r.length, r.step, r.program_id
                ));
            }
        }
        Ok(out)
    }

    fn print(
        &mut self,
        device: &str,
        region: RegionId,
        clear: bool,
    ) -> Result<String, RegistrationError> {
        if self.fail_print {
            return Err(RegistrationError::new("print", device, "Input/output error"));
        }
        let key = (device.to_string(), region);
        let r = self
            .regions
            .get(&key)
            .ok_or_else(|| RegistrationError::new("print", device, "No such region"))?;

        if self.malformed_output {
            return Ok(format!("{}+{} 1 0 8\n", r.start, r.length));
        }

        let mut lines: Vec<String> = r.areas.iter().map(|s| self.format_line(s)).collect();
        if self.reverse_output {
            lines.reverse();
        }

        if clear && let Some(r) = self.regions.get_mut(&key) {
            for area in &mut r.areas {
                *area = CounterSample {
                    area: area.area,
                    ..CounterSample::default()
                };
            }
        }

        let mut out = lines.join("\n");
        out.push('\n');
        Ok(out)
    }

    fn delete(&mut self, device: &str, region: RegionId) -> Result<(), RegistrationError> {
        self.delete_attempts.push((device.to_string(), region));
        if self.fail_delete {
            return Err(RegistrationError::new("delete", device, "Device or resource busy"));
        }
        self.regions
            .remove(&(device.to_string(), region))
            .map(|_| ())
            .ok_or_else(|| RegistrationError::new("delete", device, "No such region"))
    }
}
