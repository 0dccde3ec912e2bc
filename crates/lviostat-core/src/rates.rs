//! Metric derivation from two successive samples.
//!
//! All formulas follow the classic `iostat` arithmetic so that existing
//! parsers of its output keep working: every counter delta is scaled as
//! `delta * tick_rate / interval_ticks`, utilization is kept in the raw
//! per-mille form and divided by 10 only for display.
//!
//! Functions here are pure; callers decide what to log.

use crate::storage::model::{CounterSample, CpuSample};

/// Clock ticks per second (USER_HZ). Standard value for Linux.
pub const TICK_RATE: u64 = 100;

// ---------------------------------------------------------------------------
// Delta helpers
// ---------------------------------------------------------------------------

/// Compute u64 delta, returning `None` on counter regression (stats reset).
pub fn delta(curr: u64, prev: u64) -> Option<u64> {
    (curr >= prev).then_some(curr - prev)
}

/// Scales a counter delta to a per-second rate.
pub fn rate(delta: u64, interval_ticks: u64, tick_rate: u64) -> f64 {
    delta as f64 * tick_rate as f64 / interval_ticks as f64
}

// ---------------------------------------------------------------------------
// Interval validation
// ---------------------------------------------------------------------------

/// Result of [`check_interval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalCheck {
    /// Interval to compute with (never zero).
    pub ticks: u64,
    /// Sampling happened later than expected.
    pub delayed: bool,
}

/// Validates the elapsed interval between two samples.
///
/// Zero becomes one tick. Anything beyond `expected_ticks + 1` is flagged as
/// delayed but returned unchanged.
pub fn check_interval(elapsed_ticks: u64, expected_ticks: u64) -> IntervalCheck {
    IntervalCheck {
        ticks: elapsed_ticks.max(1),
        delayed: elapsed_ticks > expected_ticks + 1,
    }
}

// ---------------------------------------------------------------------------
// Device metrics
// ---------------------------------------------------------------------------

/// Counter deltas of one area over one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterDeltas {
    pub rd_ios: u64,
    pub rd_merges: u64,
    pub rd_sectors: u64,
    pub rd_ticks: u64,
    pub wr_ios: u64,
    pub wr_merges: u64,
    pub wr_sectors: u64,
    pub wr_ticks: u64,
    pub tot_ticks: u64,
    pub rq_ticks: u64,
}

impl CounterDeltas {
    /// Computes deltas; `None` when any monotonic counter went backwards.
    pub fn between(curr: &CounterSample, prev: &CounterSample) -> Option<Self> {
        Some(Self {
            rd_ios: delta(curr.rd_ios, prev.rd_ios)?,
            rd_merges: delta(curr.rd_merges, prev.rd_merges)?,
            rd_sectors: delta(curr.rd_sectors, prev.rd_sectors)?,
            rd_ticks: delta(curr.rd_ticks, prev.rd_ticks)?,
            wr_ios: delta(curr.wr_ios, prev.wr_ios)?,
            wr_merges: delta(curr.wr_merges, prev.wr_merges)?,
            wr_sectors: delta(curr.wr_sectors, prev.wr_sectors)?,
            wr_ticks: delta(curr.wr_ticks, prev.wr_ticks)?,
            tot_ticks: delta(curr.tot_ticks, prev.tot_ticks)?,
            rq_ticks: delta(curr.rq_ticks, prev.rq_ticks)?,
        })
    }

    pub fn nr_ios(&self) -> u64 {
        self.rd_ios + self.wr_ios
    }
}

/// Derived metrics of one area over one interval.
///
/// Sector values are in sectors; unit scaling happens at render time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiskMetrics {
    /// Transfers (reads + writes) per second.
    pub tps: f64,
    pub rd_merges_s: f64,
    pub wr_merges_s: f64,
    pub rd_ios_s: f64,
    pub wr_ios_s: f64,
    pub rd_sectors_s: f64,
    pub wr_sectors_s: f64,
    /// Average request size in sectors.
    pub avg_request_size: f64,
    pub avg_queue_size: f64,
    /// Average wait per I/O in ms.
    pub await_ms: f64,
    pub r_await_ms: f64,
    pub w_await_ms: f64,
    /// Average service time per I/O in ms.
    pub svctm_ms: f64,
    /// Utilization before the display divisor.
    pub util_raw: f64,
    /// Cumulative sectors read at the current sample.
    pub rd_sectors_total: u64,
    /// Cumulative sectors written at the current sample.
    pub wr_sectors_total: u64,
    /// Counters regressed; rates are zero for this interval.
    pub discontinuity: bool,
}

impl DiskMetrics {
    /// Utilization as shown in the `%util` column.
    pub fn util_percent(&self) -> f64 {
        self.util_raw / 10.0
    }
}

/// Derives device metrics from two samples of the same area.
pub fn derive_disk(
    curr: &CounterSample,
    prev: &CounterSample,
    interval_ticks: u64,
    tick_rate: u64,
) -> DiskMetrics {
    let totals = DiskMetrics {
        rd_sectors_total: curr.rd_sectors,
        wr_sectors_total: curr.wr_sectors,
        ..DiskMetrics::default()
    };

    let Some(d) = CounterDeltas::between(curr, prev) else {
        return DiskMetrics {
            discontinuity: true,
            ..totals
        };
    };

    let itv = interval_ticks.max(1);
    let r = |delta: u64| rate(delta, itv, tick_rate);
    let per_io = |value: u64, ios: u64| {
        if ios > 0 {
            value as f64 / ios as f64
        } else {
            0.0
        }
    };

    let tps = r(d.nr_ios());
    let util_raw = r(d.tot_ticks);

    DiskMetrics {
        tps,
        rd_merges_s: r(d.rd_merges),
        wr_merges_s: r(d.wr_merges),
        rd_ios_s: r(d.rd_ios),
        wr_ios_s: r(d.wr_ios),
        rd_sectors_s: r(d.rd_sectors),
        wr_sectors_s: r(d.wr_sectors),
        avg_request_size: per_io(d.rd_sectors + d.wr_sectors, d.nr_ios()),
        avg_queue_size: r(d.rq_ticks) / 1000.0,
        await_ms: per_io(d.rd_ticks + d.wr_ticks, d.nr_ios()),
        r_await_ms: per_io(d.rd_ticks, d.rd_ios),
        w_await_ms: per_io(d.wr_ticks, d.wr_ios),
        svctm_ms: if tps > 0.0 { util_raw / tps } else { 0.0 },
        util_raw,
        ..totals
    }
}

// ---------------------------------------------------------------------------
// CPU metrics
// ---------------------------------------------------------------------------

/// CPU time split in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CpuMetrics {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub iowait: f64,
    pub steal: f64,
    pub idle: f64,
}

/// `(curr - prev) / interval * 100`, zero when the counter went backwards.
pub fn scale_percent(prev: u64, curr: u64, interval: u64) -> f64 {
    match delta(curr, prev) {
        Some(d) => d as f64 / interval.max(1) as f64 * 100.0,
        None => 0.0,
    }
}

/// Derives CPU percentages over `interval_ticks` of wall-clock time.
///
/// The interval is multiplied by the online CPU count since `/proc/stat`
/// aggregates ticks over all CPUs. System time includes irq and softirq.
pub fn derive_cpu(curr: &CpuSample, prev: &CpuSample, interval_ticks: u64) -> CpuMetrics {
    let itv = interval_ticks.max(1) * u64::from(curr.ncpus.max(1));

    CpuMetrics {
        user: scale_percent(prev.user, curr.user, itv),
        nice: scale_percent(prev.nice, curr.nice, itv),
        system: scale_percent(
            prev.system + prev.irq + prev.softirq,
            curr.system + curr.irq + curr.softirq,
            itv,
        ),
        iowait: scale_percent(prev.iowait, curr.iowait, itv),
        steal: scale_percent(prev.steal, curr.steal, itv),
        idle: if curr.idle < prev.idle {
            0.0
        } else {
            scale_percent(prev.idle, curr.idle, itv)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::model::AreaId;

    fn sample() -> CounterSample {
        CounterSample {
            area: AreaId::new(0, 1000),
            ..CounterSample::default()
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn delta_regression_yields_none() {
        assert_eq!(delta(15, 10), Some(5));
        assert_eq!(delta(10, 10), Some(0));
        assert_eq!(delta(9, 10), None);
    }

    #[test]
    fn rate_of_read_ios() {
        // interval=5 ticks, tick_rate=100, rd_ios 10 -> 15
        let prev = CounterSample {
            rd_ios: 10,
            ..sample()
        };
        let curr = CounterSample {
            rd_ios: 15,
            ..sample()
        };
        let m = derive_disk(&curr, &prev, 5, 100);
        assert!(close(m.rd_ios_s, 100.0));
        assert!(close(rate(15 - 10, 5, 100), 100.0));
        assert!(close(m.tps, 100.0));
    }

    #[test]
    fn rate_is_exact_and_non_negative() {
        for (prev, curr, itv) in [(0u64, 0u64, 1u64), (5, 9, 3), (100, 1100, 250), (7, 7, 100)] {
            let r = rate(curr - prev, itv, TICK_RATE);
            assert!(r >= 0.0);
            assert!(close(r, (curr - prev) as f64 * 100.0 / itv as f64));
        }
    }

    #[test]
    fn utilization_display_divisor() {
        let prev = CounterSample {
            tot_ticks: 200,
            ..sample()
        };
        let curr = CounterSample {
            tot_ticks: 250,
            ..sample()
        };
        let m = derive_disk(&curr, &prev, 50, 100);
        assert!(close(m.util_raw, 100.0));
        assert!(close(m.util_percent(), 10.0));
    }

    #[test]
    fn zero_io_denominators_yield_zero() {
        let prev = sample();
        let curr = CounterSample {
            rd_ticks: 40,
            wr_ticks: 60,
            rd_sectors: 8,
            tot_ticks: 30,
            ..sample()
        };
        let m = derive_disk(&curr, &prev, 100, 100);
        assert_eq!(m.await_ms, 0.0);
        assert_eq!(m.r_await_ms, 0.0);
        assert_eq!(m.w_await_ms, 0.0);
        assert_eq!(m.avg_request_size, 0.0);
        assert_eq!(m.svctm_ms, 0.0);
        assert!(close(m.util_raw, 30.0));
    }

    #[test]
    fn wait_and_request_size() {
        let prev = sample();
        let curr = CounterSample {
            rd_ios: 4,
            rd_ticks: 20,
            rd_sectors: 32,
            wr_ios: 6,
            wr_ticks: 60,
            wr_sectors: 48,
            tot_ticks: 50,
            rq_ticks: 2000,
            ..sample()
        };
        let m = derive_disk(&curr, &prev, 100, 100);
        assert!(close(m.await_ms, 8.0));
        assert!(close(m.r_await_ms, 5.0));
        assert!(close(m.w_await_ms, 10.0));
        assert!(close(m.avg_request_size, 8.0));
        assert!(close(m.tps, 10.0));
        assert!(close(m.svctm_ms, 5.0));
        assert!(close(m.avg_queue_size, 2.0));
        assert_eq!(m.rd_sectors_total, 32);
    }

    #[test]
    fn counter_regression_is_a_discontinuity() {
        let prev = CounterSample {
            rd_ios: 100,
            wr_sectors: 800,
            ..sample()
        };
        let curr = CounterSample {
            rd_ios: 3,
            wr_sectors: 900,
            ..sample()
        };
        let m = derive_disk(&curr, &prev, 100, 100);
        assert!(m.discontinuity);
        assert_eq!(m.tps, 0.0);
        assert_eq!(m.wr_sectors_s, 0.0);
        assert_eq!(m.wr_sectors_total, 900);
    }

    #[test]
    fn in_flight_gauge_may_decrease() {
        let prev = CounterSample {
            ios_in_progress: 5,
            ..sample()
        };
        let curr = sample();
        assert!(!derive_disk(&curr, &prev, 100, 100).discontinuity);
    }

    #[test]
    fn zero_interval_is_guarded() {
        let check = check_interval(0, 100);
        assert_eq!(check.ticks, 1);
        assert!(!check.delayed);

        let m = derive_disk(
            &CounterSample {
                rd_ios: 1,
                ..sample()
            },
            &sample(),
            0,
            100,
        );
        assert!(m.rd_ios_s.is_finite());
    }

    #[test]
    fn delayed_interval_is_flagged_not_altered() {
        assert!(!check_interval(101, 100).delayed);
        let check = check_interval(102, 100);
        assert!(check.delayed);
        assert_eq!(check.ticks, 102);
    }

    #[test]
    fn cpu_percentages() {
        let prev = CpuSample {
            ncpus: 2,
            ..CpuSample::default()
        };
        let curr = CpuSample {
            user: 50,
            system: 20,
            irq: 5,
            softirq: 5,
            iowait: 10,
            idle: 110,
            ncpus: 2,
            ..CpuSample::default()
        };
        // 100 ticks of wall clock on 2 CPUs
        let m = derive_cpu(&curr, &prev, 100);
        assert!(close(m.user, 25.0));
        assert!(close(m.system, 15.0));
        assert!(close(m.iowait, 5.0));
        assert!(close(m.idle, 55.0));
        assert!(close(m.steal, 0.0));
    }

    #[test]
    fn cpu_idle_regression_is_zero() {
        let prev = CpuSample {
            idle: 1000,
            ncpus: 1,
            ..CpuSample::default()
        };
        let curr = CpuSample {
            idle: 10,
            user: 50,
            ncpus: 1,
            ..CpuSample::default()
        };
        let m = derive_cpu(&curr, &prev, 100);
        assert_eq!(m.idle, 0.0);
        assert!(close(m.user, 50.0));
        assert_eq!(scale_percent(10, 5, 100), 0.0);
    }
}
