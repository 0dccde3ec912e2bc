//! lviostat - I/O statistics for LVM logical volumes.
//!
//! Registers device-mapper statistics regions on the selected volumes,
//! prints iostat-style reports at a fixed interval and removes the regions
//! again on exit.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::ffi::CStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use lviostat_core::Error;
use lviostat_core::collector::{CollectError, MemorySource, RealFs, SampleCollector};
use lviostat_core::config::{
    ConfigurationError, ReportConfig, ReportMode, Units, area_size_sectors, parse_size,
};
use lviostat_core::dmstats::{DmSetup, Partition, RegionManager};
use lviostat_core::lvm::{LvsResolver, MetadataCache};
use lviostat_core::scheduler::{IntervalTicker, ReportScheduler};
use lviostat_core::storage::MemSample;

/// Report I/O statistics for LVM logical volumes.
#[derive(Parser, Debug)]
#[command(
    name = "lviostat",
    about = "Report I/O statistics for LVM logical volumes",
    version
)]
struct Args {
    /// Volume groups or logical volumes to monitor (`vg` or `vg/lv`).
    volumes: Vec<String>,

    /// Seconds between reports.
    #[arg(short, long, default_value = "1")]
    interval: u64,

    /// Number of reports; runs until interrupted when omitted.
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Extended statistics (merges, IOPS, queue size, wait times, utilization).
    #[arg(short = 'x', long)]
    extended: bool,

    /// Show throughput in kilobytes.
    #[arg(short, long)]
    kilobytes: bool,

    /// Show throughput in megabytes.
    #[arg(short, long)]
    megabytes: bool,

    /// Show only the CPU utilization report.
    #[arg(short, long)]
    cpu: bool,

    /// Show only the device utilization report.
    #[arg(short, long)]
    devices: bool,

    /// Also show memory usage.
    #[arg(long)]
    mem: bool,

    /// Print a timestamp before each report.
    #[arg(short, long)]
    timestamp: bool,

    /// One region per LVM segment instead of one per volume.
    #[arg(long)]
    segments: bool,

    /// Split regions into areas of this size (e.g., "64M", "1G", "2048S").
    #[arg(long, value_parser = parse_size, default_value = "0")]
    area_size: u64,

    /// Split regions into this many areas.
    #[arg(long, default_value = "0")]
    area_count: u64,

    /// Owner tag attached to created regions.
    #[arg(long, default_value = "lviostat")]
    program_id: String,

    /// Seconds to reuse resolved volume metadata.
    #[arg(long, default_value = "60")]
    metadata_ttl: u64,

    /// Path to the dmsetup binary.
    #[arg(long, default_value = "dmsetup")]
    dmsetup: String,

    /// Path to the lvs binary.
    #[arg(long, default_value = "lvs")]
    lvs: String,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace). Default is warn level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Allocator totals read from jemalloc's `stats.*` counters.
struct JemallocStats;

impl JemallocStats {
    /// Refreshes jemalloc's statistics snapshot; `stats.*` reads are stale
    /// until the epoch is advanced.
    fn advance_epoch() -> Result<(), CollectError> {
        let mut epoch: u64 = 1;
        let mut current: u64 = 0;
        let mut len = std::mem::size_of::<u64>();
        // SAFETY: "epoch" is a read-write uint64_t control; both buffers are
        // u64 and `len` holds their size.
        let rc = unsafe {
            tikv_jemalloc_sys::mallctl(
                c"epoch".as_ptr().cast(),
                (&mut current as *mut u64).cast(),
                &mut len,
                (&mut epoch as *mut u64).cast(),
                std::mem::size_of::<u64>(),
            )
        };
        if rc != 0 {
            return Err(CollectError::Allocator(format!("epoch: mallctl returned {}", rc)));
        }
        Ok(())
    }

    fn read_size(name: &CStr) -> Result<u64, CollectError> {
        let mut value: usize = 0;
        let mut len = std::mem::size_of::<usize>();
        // SAFETY: `name` is a NUL-terminated size_t statistic; `value` is a
        // usize and `len` holds its size.
        let rc = unsafe {
            tikv_jemalloc_sys::mallctl(
                name.as_ptr().cast(),
                (&mut value as *mut usize).cast(),
                &mut len,
                std::ptr::null_mut(),
                0,
            )
        };
        if rc != 0 {
            return Err(CollectError::Allocator(format!(
                "{}: mallctl returned {}",
                name.to_string_lossy(),
                rc
            )));
        }
        Ok(value as u64)
    }
}

impl MemorySource for JemallocStats {
    fn sample(&mut self) -> Result<MemSample, CollectError> {
        Self::advance_epoch()?;
        Ok(MemSample {
            allocated: Self::read_size(c"stats.allocated")?,
            resident: Self::read_size(c"stats.resident")?,
        })
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is WARN so log lines stay out of the report. Logs go to stderr.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["lviostat", "lviostat_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Maps the command line onto a validated report configuration.
fn build_config(args: &Args) -> Result<ReportConfig, ConfigurationError> {
    // neither -c nor -d means both
    let (show_cpu, show_devices) = match (args.cpu, args.devices) {
        (false, false) => (true, true),
        flags => flags,
    };
    if show_devices && args.volumes.is_empty() {
        return Err(ConfigurationError::new("no volumes given"));
    }

    let config = ReportConfig {
        interval_secs: args.interval,
        count: args.count,
        mode: if args.extended {
            ReportMode::Extended
        } else {
            ReportMode::Basic
        },
        units: Units::from_flags(args.kilobytes, args.megabytes)?,
        show_cpu,
        show_devices,
        show_memory: args.mem,
        timestamp: args.timestamp,
        segment_level: args.segments,
        partition: Partition::from_request(area_size_sectors(args.area_size)?, args.area_count)?,
        program_id: args.program_id.clone(),
        metadata_ttl: Duration::from_secs(args.metadata_ttl),
    };
    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<u64, Error> {
    let config = build_config(&args).inspect_err(|e| error!("{}", e))?;
    debug!("Config: {:?}", config);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received interrupt signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut resolver = MetadataCache::new(LvsResolver::new(&args.lvs), config.metadata_ttl);
    let show_devices = config.show_devices;
    let interval = config.interval();

    let mut scheduler = ReportScheduler::new(
        config,
        RegionManager::new(DmSetup::new(&args.dmsetup), &args.program_id),
        SampleCollector::new(RealFs::new(), &args.proc_path, JemallocStats),
        IntervalTicker::new(interval, running),
        std::io::stdout(),
    )?;

    if show_devices {
        let volumes = scheduler.register(&mut resolver, &args.volumes)?;
        info!(
            "Registered {} volume(s), {} region(s)",
            volumes,
            scheduler.regions().regions().len()
        );
    }

    scheduler.run()
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);
    info!("lviostat {} starting", env!("CARGO_PKG_VERSION"));

    match run(args) {
        Ok(reports) => debug!("Exiting after {} report(s)", reports),
        Err(e) => std::process::exit(e.exit_code()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("lviostat").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = build_config(&parse(&["vg0/lv0"])).unwrap();
        assert_eq!(config.interval_secs, 1);
        assert_eq!(config.count, None);
        assert_eq!(config.mode, ReportMode::Basic);
        assert!(config.show_cpu && config.show_devices);
        assert_eq!(config.partition, Partition::Single);
    }

    #[test]
    fn test_extended_megabytes_with_count() {
        let config =
            build_config(&parse(&["-x", "-m", "-i", "5", "-n", "3", "--segments", "vg0"])).unwrap();
        assert_eq!(config.mode, ReportMode::Extended);
        assert_eq!(config.units, Units::Megabytes);
        assert_eq!(config.interval_secs, 5);
        assert_eq!(config.count, Some(3));
        assert!(config.segment_level);
    }

    #[test]
    fn test_cpu_only_needs_no_volumes() {
        let config = build_config(&parse(&["-c"])).unwrap();
        assert!(config.show_cpu);
        assert!(!config.show_devices);

        assert!(build_config(&parse(&[])).is_err());
    }

    #[test]
    fn test_area_options() {
        let config = build_config(&parse(&["--area-size", "1M", "vg0"])).unwrap();
        assert_eq!(config.partition, Partition::AreaSize(2048));

        let config = build_config(&parse(&["--area-count", "4", "vg0"])).unwrap();
        assert_eq!(config.partition, Partition::AreaCount(4));

        assert!(build_config(&parse(&["--area-size", "1M", "--area-count", "4", "vg0"])).is_err());
        assert!(build_config(&parse(&["--area-size", "1000", "vg0"])).is_err());
        assert!(
            Args::try_parse_from(["lviostat", "--area-size", "99999999999G", "vg0"]).is_err()
        );
    }

    #[test]
    fn test_jemalloc_stats_track_allocations() {
        let mut stats = JemallocStats;
        let buffer = vec![1u8; 8 << 20];

        let mem = stats.sample().unwrap();
        assert_eq!(buffer.len(), 8 << 20);
        assert!(mem.allocated >= 8 << 20);
        assert!(mem.resident > 0);
    }

    #[test]
    fn test_conflicting_options_rejected() {
        assert!(build_config(&parse(&["-k", "-m", "vg0"])).is_err());
        assert!(build_config(&parse(&["-i", "0", "vg0"])).is_err());
        assert!(build_config(&parse(&["-n", "0", "vg0"])).is_err());
    }
}
