//! Raw samples captured each interval.
//!
//! All counters are stored exactly as reported by their source; deltas and
//! rates are computed later in [`crate::rates`].

use std::fmt;

/// Position of an area inside its device, in 512-byte sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AreaId {
    pub start: u64,
    pub length: u64,
}

impl AreaId {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// Last sector covered by the area (inclusive).
    pub fn end(&self) -> u64 {
        (self.start + self.length).saturating_sub(1)
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.start, self.length)
    }
}

/// Counters of one dm-stats area at one point in time.
///
/// Source: one line of `@stats_print <region_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CounterSample {
    pub area: AreaId,

    /// Reads completed.
    pub rd_ios: u64,
    /// Reads merged.
    pub rd_merges: u64,
    /// Sectors read.
    pub rd_sectors: u64,
    /// Milliseconds spent reading.
    pub rd_ticks: u64,

    /// Writes completed.
    pub wr_ios: u64,
    /// Writes merged.
    pub wr_merges: u64,
    /// Sectors written.
    pub wr_sectors: u64,
    /// Milliseconds spent writing.
    pub wr_ticks: u64,

    /// I/Os currently in flight. A gauge, not a counter.
    pub ios_in_progress: u64,
    /// Milliseconds spent doing I/O.
    pub tot_ticks: u64,
    /// Weighted milliseconds spent doing I/O.
    pub rq_ticks: u64,

    /// Total read service time in ms (newer kernels only).
    pub rd_service_ms: Option<u64>,
    /// Total write service time in ms (newer kernels only).
    pub wr_service_ms: Option<u64>,
}

impl CounterSample {
    /// Reads plus writes completed.
    pub fn nr_ios(&self) -> u64 {
        self.rd_ios + self.wr_ios
    }
}

/// Aggregate CPU time counters from the `cpu` line of `/proc/stat` (ticks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuSample {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    /// Number of per-CPU lines seen.
    pub ncpus: u32,
}

/// Allocator byte totals of this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemSample {
    /// Bytes handed out to the application.
    pub allocated: u64,
    /// Bytes in physically resident allocator pages.
    pub resident: u64,
}

/// System uptime from `/proc/uptime`, converted to ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct UptimeSample {
    pub ticks: u64,
}
