//! Parsers for dm-stats message responses.
//!
//! Pure functions over the text returned by `@stats_print` and `@stats_list`,
//! testable with string inputs.

use std::fmt;

use crate::storage::model::{AreaId, CounterSample};
use crate::storage::store::RegionId;

/// Number of counters every area line carries.
const BASE_COUNTERS: usize = 11;
/// Counters on kernels that append total read/write service time.
const EXTENDED_COUNTERS: usize = 13;

/// A counter line that cannot be turned into a [`CounterSample`].
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedSampleError {
    pub line: String,
    pub reason: String,
}

impl MalformedSampleError {
    pub fn new(line: &str, reason: impl Into<String>) -> Self {
        Self {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MalformedSampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed counter line '{}': {}", self.line, self.reason)
    }
}

impl std::error::Error for MalformedSampleError {}

/// Parses a `start+length` token.
pub fn parse_area(token: &str) -> Option<AreaId> {
    let (start, length) = token.split_once('+')?;
    Some(AreaId::new(start.parse().ok()?, length.parse().ok()?))
}

/// Parses one `@stats_print` line.
///
/// Format: `start+length rd_ios rd_merges rd_sectors rd_ticks wr_ios wr_merges
/// wr_sectors wr_ticks in_progress tot_ticks rq_ticks [rd_service wr_service]`
pub fn parse_counter_line(line: &str) -> Result<CounterSample, MalformedSampleError> {
    let line = line.trim();
    let mut parts = line.split_whitespace();

    let area = parts
        .next()
        .and_then(parse_area)
        .ok_or_else(|| MalformedSampleError::new(line, "invalid area range"))?;

    let counters = parts
        .map(|s| s.parse::<u64>())
        .collect::<Result<Vec<u64>, _>>()
        .map_err(|e| MalformedSampleError::new(line, format!("invalid counter: {}", e)))?;

    if counters.len() != BASE_COUNTERS && counters.len() != EXTENDED_COUNTERS {
        return Err(MalformedSampleError::new(
            line,
            format!(
                "expected {} or {} counters, found {}",
                BASE_COUNTERS,
                EXTENDED_COUNTERS,
                counters.len()
            ),
        ));
    }

    Ok(CounterSample {
        area,
        rd_ios: counters[0],
        rd_merges: counters[1],
        rd_sectors: counters[2],
        rd_ticks: counters[3],
        wr_ios: counters[4],
        wr_merges: counters[5],
        wr_sectors: counters[6],
        wr_ticks: counters[7],
        ios_in_progress: counters[8],
        tot_ticks: counters[9],
        rq_ticks: counters[10],
        rd_service_ms: counters.get(11).copied(),
        wr_service_ms: counters.get(12).copied(),
    })
}

/// Parses a whole `@stats_print` response, ignoring blank lines.
///
/// Areas come back sorted by start offset; the facility's own ordering is not
/// relied upon.
pub fn parse_print_output(content: &str) -> Result<Vec<CounterSample>, MalformedSampleError> {
    let mut samples = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(parse_counter_line)
        .collect::<Result<Vec<_>, _>>()?;
    samples.sort_by_key(|s| s.area.start);
    Ok(samples)
}

/// One line of `@stats_list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionEntry {
    pub id: RegionId,
    pub range: AreaId,
    pub step: String,
    pub program_id: String,
    pub aux_data: String,
}

/// Parses a `@stats_list` response.
///
/// Format: `region_id: start+length step program_id aux_data`
pub fn parse_region_list(content: &str) -> Result<Vec<RegionEntry>, MalformedSampleError> {
    let mut entries = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();

        let id = parts
            .next()
            .and_then(|s| s.strip_suffix(':'))
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| MalformedSampleError::new(line, "invalid region id"))?;
        let range = parts
            .next()
            .and_then(parse_area)
            .ok_or_else(|| MalformedSampleError::new(line, "invalid region range"))?;
        let step = parts
            .next()
            .ok_or_else(|| MalformedSampleError::new(line, "missing step"))?;

        entries.push(RegionEntry {
            id,
            range,
            step: step.to_string(),
            program_id: parts.next().unwrap_or("-").to_string(),
            aux_data: parts.next().unwrap_or("-").to_string(),
        });
    }

    Ok(entries)
}
