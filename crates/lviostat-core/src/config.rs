//! Report configuration.
//!
//! The binary maps its command line onto [`ReportConfig`]; everything that
//! can be rejected is rejected by [`ReportConfig::validate`] before any
//! region is created.

use std::fmt;
use std::time::Duration;

use crate::dmstats::Partition;

/// Sector size used by dm-stats ranges.
pub const SECTOR_SIZE: u64 = 512;

/// Invalid or conflicting options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.message)
    }
}

impl std::error::Error for ConfigurationError {}

/// Column layout of device lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    /// Transfers per second, throughput and cumulative totals.
    #[default]
    Basic,
    /// Merges, IOPS, queue size, wait times and utilization.
    Extended,
}

/// Scaling applied to sector-based values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    #[default]
    Sectors,
    Kilobytes,
    Megabytes,
}

impl Units {
    /// Builds units from the `-k`/`-m` flags.
    pub fn from_flags(kilobytes: bool, megabytes: bool) -> Result<Self, ConfigurationError> {
        match (kilobytes, megabytes) {
            (true, true) => Err(ConfigurationError::new(
                "kilobyte and megabyte units are mutually exclusive",
            )),
            (true, false) => Ok(Units::Kilobytes),
            (false, true) => Ok(Units::Megabytes),
            (false, false) => Ok(Units::Sectors),
        }
    }

    /// Divisor turning a sector count into this unit.
    pub fn divisor(&self) -> f64 {
        match self {
            Units::Sectors => 1.0,
            Units::Kilobytes => 2.0,
            Units::Megabytes => 2048.0,
        }
    }

    /// Column prefix in basic mode ("Blk", "kB", "MB").
    pub fn basic_label(&self) -> &'static str {
        match self {
            Units::Sectors => "Blk",
            Units::Kilobytes => "kB",
            Units::Megabytes => "MB",
        }
    }

    /// Column infix in extended mode ("sec", "kB", "MB").
    pub fn extended_label(&self) -> &'static str {
        match self {
            Units::Sectors => "sec",
            Units::Kilobytes => "kB",
            Units::Megabytes => "MB",
        }
    }
}

/// Everything the report loop needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Seconds between reports.
    pub interval_secs: u64,
    /// Number of reports; `None` runs until interrupted.
    pub count: Option<u64>,
    pub mode: ReportMode,
    pub units: Units,
    pub show_cpu: bool,
    pub show_devices: bool,
    pub show_memory: bool,
    /// Print a timestamp before each report.
    pub timestamp: bool,
    /// One region per LVM segment instead of one per device.
    pub segment_level: bool,
    pub partition: Partition,
    /// Owner tag attached to created regions.
    pub program_id: String,
    /// How long resolved volume metadata may be reused.
    pub metadata_ttl: Duration,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            count: None,
            mode: ReportMode::Basic,
            units: Units::Sectors,
            show_cpu: true,
            show_devices: true,
            show_memory: false,
            timestamp: false,
            segment_level: false,
            partition: Partition::Single,
            program_id: "lviostat".to_string(),
            metadata_ttl: Duration::from_secs(60),
        }
    }
}

impl ReportConfig {
    /// Checks option combinations.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.interval_secs == 0 {
            return Err(ConfigurationError::new("interval must be at least 1 second"));
        }
        if self.count == Some(0) {
            return Err(ConfigurationError::new("count must be at least 1"));
        }
        if !self.show_cpu && !self.show_devices && !self.show_memory {
            return Err(ConfigurationError::new("nothing to report"));
        }
        if self.program_id.is_empty() || self.program_id.contains(char::is_whitespace) {
            return Err(ConfigurationError::new(format!(
                "invalid program id '{}'",
                self.program_id
            )));
        }
        if let Partition::AreaSize(0) | Partition::AreaCount(0) = self.partition {
            return Err(ConfigurationError::new("area size/count must be non-zero"));
        }
        Ok(())
    }

    /// Expected number of ticks between two samples.
    pub fn interval_ticks(&self, tick_rate: u64) -> u64 {
        self.interval_secs * tick_rate
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Parses a human-readable size string (e.g., "1G", "500M", "1024K") into bytes.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, multiplier) = if let Some(num) = s.strip_suffix(['G', 'g']) {
        (num, 1024 * 1024 * 1024)
    } else if let Some(num) = s.strip_suffix(['M', 'm']) {
        (num, 1024 * 1024)
    } else if let Some(num) = s.strip_suffix(['K', 'k']) {
        (num, 1024)
    } else if let Some(num) = s.strip_suffix(['S', 's']) {
        (num, SECTOR_SIZE)
    } else {
        (s, 1)
    };

    let n = num_str
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid size '{}': {}", s, e))?;
    n.checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' too large", s))
}

/// Converts an area size in bytes to sectors. Zero stays zero ("not requested").
pub fn area_size_sectors(bytes: u64) -> Result<u64, ConfigurationError> {
    if bytes % SECTOR_SIZE != 0 {
        return Err(ConfigurationError::new(format!(
            "area size {} is not a multiple of {} bytes",
            bytes, SECTOR_SIZE
        )));
    }
    Ok(bytes / SECTOR_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ReportConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_combinations() {
        let zero_interval = ReportConfig {
            interval_secs: 0,
            ..ReportConfig::default()
        };
        assert!(zero_interval.validate().is_err());

        let zero_count = ReportConfig {
            count: Some(0),
            ..ReportConfig::default()
        };
        assert!(zero_count.validate().is_err());

        let nothing = ReportConfig {
            show_cpu: false,
            show_devices: false,
            ..ReportConfig::default()
        };
        assert_eq!(
            nothing.validate().unwrap_err().message,
            "nothing to report"
        );

        let bad_id = ReportConfig {
            program_id: "two words".to_string(),
            ..ReportConfig::default()
        };
        assert!(bad_id.validate().is_err());
    }

    #[test]
    fn test_units_from_flags() {
        assert_eq!(Units::from_flags(false, false).unwrap(), Units::Sectors);
        assert_eq!(Units::from_flags(true, false).unwrap(), Units::Kilobytes);
        assert_eq!(Units::from_flags(false, true).unwrap(), Units::Megabytes);
        assert!(Units::from_flags(true, true).is_err());
    }

    #[test]
    fn test_unit_divisors() {
        assert_eq!(Units::Sectors.divisor(), 1.0);
        assert_eq!(Units::Kilobytes.divisor(), 2.0);
        assert_eq!(Units::Megabytes.divisor(), 2048.0);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("512K").unwrap(), 512 * 1024);
        assert_eq!(parse_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("8s").unwrap(), 8 * 512);
        assert!(parse_size("").is_err());
        assert!(parse_size("ten").is_err());
    }

    #[test]
    fn test_parse_size_overflow() {
        assert_eq!(
            parse_size("99999999999G").unwrap_err(),
            "size '99999999999G' too large"
        );
        assert!(parse_size("18446744073709551615K").is_err());
        assert_eq!(parse_size("18446744073709551615").unwrap(), u64::MAX);
        assert_eq!(parse_size("16777215G").unwrap(), 16777215 << 30);
    }

    #[test]
    fn test_area_size_sectors() {
        assert_eq!(area_size_sectors(0).unwrap(), 0);
        assert_eq!(area_size_sectors(1024 * 1024).unwrap(), 2048);
        assert!(area_size_sectors(1000).is_err());
    }

    #[test]
    fn test_interval_ticks() {
        let cfg = ReportConfig {
            interval_secs: 5,
            ..ReportConfig::default()
        };
        assert_eq!(cfg.interval_ticks(100), 500);
        assert_eq!(cfg.interval(), Duration::from_secs(5));
    }
}
