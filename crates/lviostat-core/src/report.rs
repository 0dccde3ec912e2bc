//! Text report rendering.
//!
//! A report round consists of an optional timestamp, an optional `avg-cpu`
//! block, an optional memory block and the device table, followed by a blank
//! line. Column layout follows `iostat` so existing parsers keep working.
//!
//! An area is reported only once both slots hold a sample for it; a region
//! registered after the previous slot was filled shows up one round later.

use std::io::Write;

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::config::{ReportConfig, ReportMode, Units};
use crate::error::Error;
use crate::rates::{CpuMetrics, DiskMetrics, derive_cpu, derive_disk};
use crate::storage::model::{AreaId, MemSample};
use crate::storage::store::{RegionId, SampleStore, Slot};

/// Outcome of one rendered round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rendered {
    /// Device rows written.
    pub rows: usize,
    /// Rows zeroed because counters went backwards.
    pub discontinuities: usize,
    /// Areas left out because the previous slot has no sample for them yet.
    pub pending: usize,
}

type HeaderFn<W> = fn(&mut W, Units) -> std::io::Result<()>;
type RowFn<W> = fn(&mut W, &str, &DiskMetrics, Units) -> std::io::Result<()>;

/// Renders report rounds from the two slots of a [`SampleStore`].
#[derive(Debug, Clone)]
pub struct Renderer {
    mode: ReportMode,
    units: Units,
    show_cpu: bool,
    show_devices: bool,
    show_memory: bool,
    timestamp: bool,
}

impl Renderer {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            mode: config.mode,
            units: config.units,
            show_cpu: config.show_cpu,
            show_devices: config.show_devices,
            show_memory: config.show_memory,
            timestamp: config.timestamp,
        }
    }

    /// Writes one round comparing the current slot against the previous one.
    ///
    /// `interval_ticks` is the already validated elapsed interval.
    pub fn render<W: Write>(
        &self,
        out: &mut W,
        store: &SampleStore,
        interval_ticks: u64,
        tick_rate: u64,
        now: DateTime<Local>,
    ) -> Result<Rendered, Error> {
        let curr = store.slot(Slot::Current);
        let prev = store.slot(Slot::Previous);
        let mut rendered = Rendered::default();

        if self.timestamp {
            writeln!(out, "{}", format_timestamp(now))?;
        }

        if self.show_cpu
            && let (Some(c), Some(p)) = (&curr.cpu, &prev.cpu)
        {
            write_cpu(out, &derive_cpu(c, p, interval_ticks))?;
        }

        if self.show_memory
            && let Some(mem) = &curr.mem
        {
            write_memory(out, mem)?;
        }

        if self.show_devices {
            let (header, row) = match self.mode {
                ReportMode::Basic => (
                    write_basic_header as HeaderFn<W>,
                    write_basic_row as RowFn<W>,
                ),
                ReportMode::Extended => (
                    write_extended_header as HeaderFn<W>,
                    write_extended_row as RowFn<W>,
                ),
            };

            header(out, self.units)?;
            for (device, region, sample) in curr.iter() {
                let label = row_label(device, region, &sample.area, curr.device_area_count(device));
                let previous = match store.read(Slot::Previous, device, region, &sample.area) {
                    Ok(previous) => previous,
                    Err(e) => {
                        debug!("{}: skipped until the next round ({})", label, e);
                        rendered.pending += 1;
                        continue;
                    }
                };
                let metrics = derive_disk(sample, previous, interval_ticks, tick_rate);
                if metrics.discontinuity {
                    warn!(
                        "{}: counters went backwards, reporting zero for this interval",
                        label
                    );
                    rendered.discontinuities += 1;
                }
                row(out, &label, &metrics, self.units)?;
                rendered.rows += 1;
            }
        }

        writeln!(out)?;
        out.flush()?;
        Ok(rendered)
    }
}

/// Device name, qualified with region and area start when the device is split.
pub fn row_label(device: &str, region: RegionId, area: &AreaId, device_areas: usize) -> String {
    if device_areas > 1 {
        format!("{}:{}:{}", device, region, area.start)
    } else {
        device.to_string()
    }
}

pub fn format_timestamp(now: DateTime<Local>) -> String {
    now.format("%m/%d/%Y %I:%M:%S %p").to_string()
}

fn write_cpu<W: Write>(out: &mut W, cpu: &CpuMetrics) -> std::io::Result<()> {
    writeln!(
        out,
        "avg-cpu:  %user   %nice %system %iowait  %steal   %idle"
    )?;
    writeln!(
        out,
        "        {:7.2} {:7.2} {:7.2} {:7.2} {:7.2} {:7.2}",
        cpu.user, cpu.nice, cpu.system, cpu.iowait, cpu.steal, cpu.idle
    )?;
    writeln!(out)
}

fn write_memory<W: Write>(out: &mut W, mem: &MemSample) -> std::io::Result<()> {
    writeln!(out, "mem-bytes:     allocated      resident")?;
    writeln!(out, "          {:>13} {:>13}", mem.allocated, mem.resident)?;
    writeln!(out)
}

fn write_basic_header<W: Write>(out: &mut W, units: Units) -> std::io::Result<()> {
    let u = units.basic_label();
    writeln!(
        out,
        "{:<16} {:>9} {:>13} {:>13} {:>11} {:>11}",
        "Device:",
        "tps",
        format!("{}_read/s", u),
        format!("{}_wrtn/s", u),
        format!("{}_read", u),
        format!("{}_wrtn", u)
    )
}

fn write_basic_row<W: Write>(
    out: &mut W,
    label: &str,
    m: &DiskMetrics,
    units: Units,
) -> std::io::Result<()> {
    let div = units.divisor();
    writeln!(
        out,
        "{:<16} {:>9.2} {:>13.2} {:>13.2} {:>11} {:>11}",
        label,
        m.tps,
        m.rd_sectors_s / div,
        m.wr_sectors_s / div,
        (m.rd_sectors_total as f64 / div) as u64,
        (m.wr_sectors_total as f64 / div) as u64
    )
}

fn write_extended_header<W: Write>(out: &mut W, units: Units) -> std::io::Result<()> {
    let u = units.extended_label();
    writeln!(
        out,
        "{:<16} {:>8} {:>8} {:>8} {:>8} {:>9} {:>9} {:>8} {:>8} {:>7} {:>7} {:>7} {:>6} {:>6}",
        "Device:",
        "rrqm/s",
        "wrqm/s",
        "r/s",
        "w/s",
        format!("r{}/s", u),
        format!("w{}/s", u),
        "avgrq-sz",
        "avgqu-sz",
        "await",
        "r_await",
        "w_await",
        "svctm",
        "%util"
    )
}

fn write_extended_row<W: Write>(
    out: &mut W,
    label: &str,
    m: &DiskMetrics,
    units: Units,
) -> std::io::Result<()> {
    let div = units.divisor();
    writeln!(
        out,
        "{:<16} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>9.2} {:>9.2} {:>8.2} {:>8.2} {:>7.2} {:>7.2} {:>7.2} {:>6.2} {:>6.2}",
        label,
        m.rd_merges_s,
        m.wr_merges_s,
        m.rd_ios_s,
        m.wr_ios_s,
        m.rd_sectors_s / div,
        m.wr_sectors_s / div,
        m.avg_request_size,
        m.avg_queue_size,
        m.await_ms,
        m.r_await_ms,
        m.w_await_ms,
        m.svctm_ms,
        m.util_percent()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::model::{CounterSample, CpuSample};
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 2, 15, 4, 5).unwrap()
    }

    fn sample(start: u64, length: u64, rd_ios: u64, rd_sectors: u64) -> CounterSample {
        CounterSample {
            area: AreaId::new(start, length),
            rd_ios,
            rd_sectors,
            tot_ticks: rd_ios * 10,
            ..CounterSample::default()
        }
    }

    /// One-device store with a 100-tick interval between the two slots.
    fn store() -> SampleStore {
        let mut store = SampleStore::new();
        store.write(Slot::Previous, "vg0-lv0", 0, sample(0, 2048, 100, 800));
        store.write(Slot::Current, "vg0-lv0", 0, sample(0, 2048, 150, 1200));
        for (slot, user) in [(Slot::Previous, 0), (Slot::Current, 50)] {
            store.slot_mut(slot).cpu = Some(CpuSample {
                user,
                idle: user,
                ncpus: 1,
                ..CpuSample::default()
            });
        }
        store
    }

    fn render(config: &ReportConfig, store: &SampleStore) -> (String, Rendered) {
        let mut out = Vec::new();
        let rendered = Renderer::new(config)
            .render(&mut out, store, 100, 100, now())
            .unwrap();
        (String::from_utf8(out).unwrap(), rendered)
    }

    #[test]
    fn test_basic_report() {
        let (text, rendered) = render(&ReportConfig::default(), &store());

        assert_eq!(rendered.rows, 1);
        assert!(text.contains("avg-cpu:  %user"));
        assert!(text.contains("  50.00"));
        assert!(text.contains("Blk_read/s"));
        let row = text
            .lines()
            .find(|l| l.starts_with("vg0-lv0"))
            .unwrap();
        let cols: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(cols, vec!["vg0-lv0", "50.00", "400.00", "0.00", "1200", "0"]);
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn test_extended_report_in_kilobytes() {
        let config = ReportConfig {
            mode: ReportMode::Extended,
            units: Units::Kilobytes,
            show_cpu: false,
            ..ReportConfig::default()
        };
        let (text, _) = render(&config, &store());

        assert!(!text.contains("avg-cpu"));
        let header = text.lines().next().unwrap();
        assert!(header.contains("rkB/s"));
        assert!(header.ends_with("%util"));

        let cols: Vec<&str> = text.lines().nth(1).unwrap().split_whitespace().collect();
        // r/s, rkB/s, avgrq-sz, await, svctm, %util
        assert_eq!(cols[3], "50.00");
        assert_eq!(cols[5], "200.00");
        assert_eq!(cols[7], "8.00");
        assert_eq!(cols[9], "0.00");
        assert_eq!(cols[12], "10.00");
        assert_eq!(cols[13], "50.00");
    }

    #[test]
    fn test_split_device_rows_are_qualified() {
        let mut store = store();
        store.write(Slot::Previous, "vg0-lv0", 0, sample(2048, 2048, 0, 0));
        store.write(Slot::Current, "vg0-lv0", 0, sample(2048, 2048, 0, 0));

        let (text, rendered) = render(&ReportConfig::default(), &store);

        assert_eq!(rendered.rows, 2);
        assert!(text.contains("vg0-lv0:0:0 "));
        assert!(text.contains("vg0-lv0:0:2048 "));
    }

    #[test]
    fn test_discontinuity_renders_zero_row() {
        let mut store = SampleStore::new();
        store.write(Slot::Previous, "vg0-lv0", 0, sample(0, 2048, 500, 4000));
        store.write(Slot::Current, "vg0-lv0", 0, sample(0, 2048, 2, 16));
        let config = ReportConfig {
            show_cpu: false,
            ..ReportConfig::default()
        };

        let (text, rendered) = render(&config, &store);

        assert_eq!(rendered.discontinuities, 1);
        let cols: Vec<&str> = text.lines().nth(1).unwrap().split_whitespace().collect();
        assert_eq!(cols, vec!["vg0-lv0", "0.00", "0.00", "0.00", "16", "0"]);
    }

    #[test]
    fn test_area_without_previous_sample_is_skipped() {
        let mut store = store();
        store.write(Slot::Current, "vg0-lv0", 1, sample(0, 100, 1, 1));
        store.write(Slot::Current, "vg0-lv1", 0, sample(0, 10, 1, 1));

        let (text, rendered) = render(&ReportConfig::default(), &store);

        assert_eq!(rendered.rows, 1);
        assert_eq!(rendered.pending, 2);
        let rows: Vec<&str> = text.lines().filter(|l| l.starts_with("vg0-")).collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].starts_with("vg0-lv0:0:0 "));
        assert!(!text.contains("vg0-lv1"));

        // once both slots hold the new areas they are reported
        store.swap();
        store.clear(Slot::Current);
        store.write(Slot::Current, "vg0-lv0", 0, sample(0, 2048, 200, 1600));
        store.write(Slot::Current, "vg0-lv0", 1, sample(0, 100, 2, 2));
        store.write(Slot::Current, "vg0-lv1", 0, sample(0, 10, 3, 3));
        let (text, rendered) = render(&ReportConfig::default(), &store);
        assert_eq!((rendered.rows, rendered.pending), (3, 0));
        assert!(text.contains("vg0-lv0:1:0 "));
        assert!(text.lines().any(|l| l.starts_with("vg0-lv1 ")));
    }

    #[test]
    fn test_timestamp_and_memory() {
        let mut store = store();
        store.slot_mut(Slot::Current).mem = Some(MemSample {
            allocated: 3_145_728,
            resident: 8_388_608,
        });
        let config = ReportConfig {
            timestamp: true,
            show_memory: true,
            show_cpu: false,
            show_devices: false,
            ..ReportConfig::default()
        };

        let (text, rendered) = render(&config, &store);

        assert_eq!(rendered.rows, 0);
        assert_eq!(text.lines().next().unwrap(), "01/02/2024 03:04:05 PM");
        assert!(text.lines().nth(1).unwrap().starts_with("mem-bytes:"));
        let mem: Vec<&str> = text.lines().nth(2).unwrap().split_whitespace().collect();
        assert_eq!(mem, vec!["3145728", "8388608"]);
    }

    #[test]
    fn test_row_label() {
        let area = AreaId::new(512, 512);
        assert_eq!(row_label("vg0-lv0", 3, &area, 1), "vg0-lv0");
        assert_eq!(row_label("vg0-lv0", 3, &area, 2), "vg0-lv0:3:512");
    }
}
