//! Parsers for `/proc` files.
//!
//! These are pure functions that parse the content of `/proc/stat` and
//! `/proc/uptime` into samples.

use crate::rates::TICK_RATE;
use crate::storage::model::{CpuSample, UptimeSample};

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parses `/proc/stat` into the aggregate CPU counters.
///
/// `ncpus` counts the `cpuN` lines.
pub fn parse_proc_stat(content: &str) -> Result<CpuSample, ParseError> {
    let mut sample: Option<CpuSample> = None;
    let mut ncpus = 0u32;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(name) = parts.first() else {
            continue;
        };

        if *name == "cpu" {
            let get_val =
                |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };
            sample = Some(CpuSample {
                user: get_val(1),
                nice: get_val(2),
                system: get_val(3),
                idle: get_val(4),
                iowait: get_val(5),
                irq: get_val(6),
                softirq: get_val(7),
                steal: get_val(8),
                ncpus: 0,
            });
        } else if name
            .strip_prefix("cpu")
            .is_some_and(|id| id.parse::<u32>().is_ok())
        {
            ncpus += 1;
        }
    }

    let mut sample = sample.ok_or_else(|| ParseError::new("missing aggregate cpu line"))?;
    sample.ncpus = ncpus.max(1);
    Ok(sample)
}

/// Parses `/proc/uptime` ("seconds.hundredths idle") into ticks.
pub fn parse_uptime(content: &str) -> Result<UptimeSample, ParseError> {
    let field = content
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::new("empty uptime"))?;

    let (secs, frac) = field.split_once('.').unwrap_or((field, "0"));
    let secs: u64 = secs
        .parse()
        .map_err(|_| ParseError::new(format!("invalid uptime '{}'", field)))?;
    // Only the first two fractional digits matter at 100 ticks per second.
    let frac_digits: String = frac.chars().chain("00".chars()).take(2).collect();
    let hundredths: u64 = frac_digits
        .parse()
        .map_err(|_| ParseError::new(format!("invalid uptime '{}'", field)))?;

    Ok(UptimeSample {
        ticks: secs * TICK_RATE + hundredths * TICK_RATE / 100,
    })
}
