//! The report loop.
//!
//! ```text
//! Idle ──► Sampling ──► Rendering ──► Waiting ──► Sampling ──► ...
//!   │                       │            │
//!   └───────────────────────┴────────────┴──────► Stopped (teardown)
//! ```
//!
//! `Idle` collects a baseline into the previous slot and waits for the first
//! tick. Every later tick swaps the slots and collects into the current one,
//! so each rendered round compares two consecutive samples. Cancellation,
//! count exhaustion and fatal errors all end in `Stopped`, which tears down
//! every region this process created.
//!
//! Ctrl-C also reaches a `dmsetup` or `lvs` child running at that moment,
//! so a failed external call observed after cancellation counts as an
//! interrupt rather than a fatal error.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::collector::{FileSystem, SampleCollector};
use crate::config::{ConfigurationError, ReportConfig};
use crate::dmstats::{RegionManager, StatsFacility};
use crate::error::Error;
use crate::lvm::{VolumeInfo, VolumeResolver};
use crate::rates::{TICK_RATE, check_interval};
use crate::report::Renderer;
use crate::storage::store::{SampleStore, Slot};

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Sampling,
    Rendering,
    Waiting,
    Stopped,
}

/// Outcome of waiting for the next interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Fire,
    Cancelled,
}

/// Source of interval ticks.
pub trait Ticker {
    /// Blocks until the next tick or until cancelled.
    fn wait(&mut self) -> Tick;

    /// Starts the schedule; the first tick is one interval from now.
    fn arm(&mut self) {}

    /// Cancellation requested outside of `wait`.
    fn is_cancelled(&self) -> bool {
        false
    }
}

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Wall-clock ticker with absolute deadlines.
///
/// Deadlines are `start + n * interval`, so time spent sampling and
/// rendering does not shift later ticks. Missed deadlines are skipped.
/// Sleeps in slices of at most 100 ms to notice the shutdown flag.
pub struct IntervalTicker {
    interval: Duration,
    next: Instant,
    running: Arc<AtomicBool>,
}

impl IntervalTicker {
    /// `running` is cleared by the signal handler to request shutdown.
    pub fn new(interval: Duration, running: Arc<AtomicBool>) -> Self {
        Self {
            interval,
            next: Instant::now() + interval,
            running,
        }
    }
}

impl Ticker for IntervalTicker {
    fn wait(&mut self) -> Tick {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Tick::Cancelled;
            }
            let now = Instant::now();
            if now >= self.next {
                while self.next <= now {
                    self.next += self.interval;
                }
                return Tick::Fire;
            }
            std::thread::sleep((self.next - now).min(SLEEP_SLICE));
        }
    }

    fn arm(&mut self) {
        self.next = Instant::now() + self.interval;
    }

    fn is_cancelled(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

/// Drives sampling and rendering at a fixed interval.
pub struct ReportScheduler<S: StatsFacility, F: FileSystem, T: Ticker, W: Write> {
    regions: RegionManager<S>,
    collector: SampleCollector<F>,
    store: SampleStore,
    renderer: Renderer,
    config: ReportConfig,
    ticker: T,
    out: W,
    state: State,
    remaining: Option<u64>,
    reports: u64,
}

impl<S: StatsFacility, F: FileSystem, T: Ticker, W: Write> ReportScheduler<S, F, T, W> {
    /// Creates a scheduler. The configuration is validated here so that a bad
    /// option is rejected before any region exists.
    pub fn new(
        config: ReportConfig,
        regions: RegionManager<S>,
        collector: SampleCollector<F>,
        ticker: T,
        out: W,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            renderer: Renderer::new(&config),
            remaining: config.count,
            regions,
            collector,
            store: SampleStore::new(),
            config,
            ticker,
            out,
            state: State::Idle,
            reports: 0,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Number of rounds rendered so far.
    pub fn reports(&self) -> u64 {
        self.reports
    }

    pub fn regions(&self) -> &RegionManager<S> {
        &self.regions
    }

    pub fn regions_mut(&mut self) -> &mut RegionManager<S> {
        &mut self.regions
    }

    pub fn collector_mut(&mut self) -> &mut SampleCollector<F> {
        &mut self.collector
    }

    pub fn ticker_mut(&mut self) -> &mut T {
        &mut self.ticker
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Resolves `names` and creates the regions of every resolved volume.
    ///
    /// Each name is resolved on its own so repeated lookups hit the cache;
    /// volumes reached through several names are registered once. Regions
    /// left behind by an earlier run with the same program id are reported
    /// but not touched. On failure every region created so far is removed.
    /// When interrupted, returns `Ok(0)` with the scheduler already stopped.
    pub fn register<R: VolumeResolver>(
        &mut self,
        resolver: &mut R,
        names: &[String],
    ) -> Result<usize, Error> {
        match self.register_volumes(resolver, names) {
            Err(e) if self.ticker.is_cancelled() => {
                info!("Interrupted during registration ({}), stopping", e);
                self.stop();
                Ok(0)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
            ok => ok,
        }
    }

    fn register_volumes<R: VolumeResolver>(
        &mut self,
        resolver: &mut R,
        names: &[String],
    ) -> Result<usize, Error> {
        let mut seen = HashSet::new();
        let mut volumes: Vec<VolumeInfo> = Vec::new();
        for name in names {
            for volume in resolver.resolve(std::slice::from_ref(name))? {
                if seen.insert(volume.dm_name.clone()) {
                    volumes.push(volume);
                } else {
                    debug!("{} already selected, skipping", volume.name);
                }
            }
        }

        for volume in &volumes {
            match self.regions.list_regions(&volume.dm_name) {
                Ok(existing) if !existing.is_empty() => warn!(
                    "{} already has {} region(s) tagged '{}' (ids {:?}); leaving them in place",
                    volume.dm_name,
                    existing.len(),
                    self.config.program_id,
                    existing.iter().map(|r| r.id).collect::<Vec<_>>()
                ),
                Ok(_) => {}
                Err(e) => debug!("Could not list regions on {}: {}", volume.dm_name, e),
            }

            let ids = self.regions.create_for_volume(
                volume,
                self.config.segment_level,
                self.config.partition,
            )?;
            info!(
                "Monitoring {} ({}, {} sectors) with {} region(s)",
                volume.name,
                volume.dm_name,
                volume.size(),
                ids.len()
            );
        }

        Ok(volumes.len())
    }

    /// Runs until the count is exhausted, the ticker is cancelled, or a fatal
    /// error occurs. Returns the number of rendered rounds.
    pub fn run(&mut self) -> Result<u64, Error> {
        info!(
            "Starting report loop: interval={}s, count={}",
            self.config.interval_secs,
            self.config
                .count
                .map_or_else(|| "unbounded".to_string(), |c| c.to_string())
        );
        while self.step()? != State::Stopped {}
        info!("Report loop finished after {} report(s)", self.reports);
        Ok(self.reports)
    }

    /// Performs one state transition.
    ///
    /// Entering `Stopped` always tears the regions down, whether by
    /// cancellation, count exhaustion or error.
    pub fn step(&mut self) -> Result<State, Error> {
        if self.state != State::Stopped && self.ticker.is_cancelled() {
            info!("Interrupted, stopping");
            self.stop();
            return Ok(State::Stopped);
        }

        match self.advance() {
            Ok(State::Stopped) => {
                self.stop();
                Ok(State::Stopped)
            }
            Ok(next) => {
                self.state = next;
                Ok(next)
            }
            Err(e) if self.ticker.is_cancelled() => {
                info!("Interrupted ({}), stopping", e);
                self.stop();
                Ok(State::Stopped)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<State, Error> {
        match self.state {
            State::Idle => {
                self.collector
                    .collect(&mut self.regions, &mut self.store, Slot::Previous)?;
                self.ticker.arm();
                Ok(match self.ticker.wait() {
                    Tick::Fire => State::Sampling,
                    Tick::Cancelled => State::Stopped,
                })
            }
            State::Sampling => {
                self.collector
                    .collect(&mut self.regions, &mut self.store, Slot::Current)?;
                Ok(State::Rendering)
            }
            State::Rendering => {
                self.render()?;
                self.reports += 1;
                if let Some(remaining) = &mut self.remaining {
                    *remaining = remaining.saturating_sub(1);
                    if *remaining == 0 {
                        return Ok(State::Stopped);
                    }
                }
                Ok(State::Waiting)
            }
            State::Waiting => Ok(match self.ticker.wait() {
                Tick::Fire => {
                    self.store.swap();
                    State::Sampling
                }
                Tick::Cancelled => State::Stopped,
            }),
            State::Stopped => Ok(State::Stopped),
        }
    }

    fn render(&mut self) -> Result<(), Error> {
        let ticks = |slot: Slot| self.store.slot(slot).uptime.map(|u| u.ticks);
        let elapsed = match (ticks(Slot::Current), ticks(Slot::Previous)) {
            (Some(curr), Some(prev)) => curr.saturating_sub(prev),
            _ => 0,
        };
        let expected = self.config.interval_ticks(TICK_RATE);
        let check = check_interval(elapsed, expected);
        if check.delayed {
            warn!(
                "Sampling delayed: {} ticks elapsed, expected {}",
                elapsed, expected
            );
        }

        let rendered = self.renderer.render(
            &mut self.out,
            &self.store,
            check.ticks,
            TICK_RATE,
            Local::now(),
        )?;
        debug!(
            "Rendered report {}: {} row(s), {} discontinuity(ies), {} pending, interval {} ticks",
            self.reports + 1,
            rendered.rows,
            rendered.discontinuities,
            rendered.pending,
            check.ticks
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.state = State::Stopped;
        self.regions.teardown();
    }

    fn fail(&mut self, e: &Error) {
        error!("{}", e);
        self.stop();
    }
}
