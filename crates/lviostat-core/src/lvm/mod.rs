//! Logical volume metadata.
//!
//! Resolves user-supplied volume (`vg/lv`) or group (`vg`) names into
//! device-mapper device names and segment layouts. The production resolver
//! runs `lvs` with a JSON report; [`MetadataCache`] reuses results for a
//! bounded time.

mod cache;

use std::fmt;
use std::process::Command;

use serde::Deserialize;
use tracing::{debug, trace};

pub use cache::MetadataCache;

/// Volume or group resolution failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// `lvs` could not be run or exited with an error.
    Command(String),
    /// `lvs` output could not be parsed.
    Parse(String),
    /// A requested name matched no logical volume.
    NotFound(String),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::Command(msg) => write!(f, "lvs failed: {}", msg),
            MetadataError::Parse(msg) => write!(f, "cannot parse lvs report: {}", msg),
            MetadataError::NotFound(name) => write!(f, "no logical volume matches '{}'", name),
        }
    }
}

impl std::error::Error for MetadataError {}

/// A contiguous extent of a logical volume, in sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: u64,
    pub length: u64,
}

/// A resolved logical volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    /// `vg/lv` display name.
    pub name: String,
    /// Device-mapper device name.
    pub dm_name: String,
    /// Segments ordered by start.
    pub segments: Vec<Segment>,
}

impl VolumeInfo {
    /// Total size in sectors.
    pub fn size(&self) -> u64 {
        self.segments.iter().map(|s| s.length).sum()
    }
}

/// Resolves volume/group names to volumes.
pub trait VolumeResolver {
    /// Resolves every name; a name matching nothing is an error.
    fn resolve(&mut self, names: &[String]) -> Result<Vec<VolumeInfo>, MetadataError>;
}

/// Device-mapper name of `vg/lv`: hyphens inside each part are doubled and
/// the parts joined with a single hyphen.
pub fn dm_name(vg: &str, lv: &str) -> String {
    format!("{}-{}", vg.replace('-', "--"), lv.replace('-', "--"))
}

/// One row of the `lvs` segment report.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentRow {
    pub vg_name: String,
    pub lv_name: String,
    pub seg_start: String,
    pub seg_size: String,
}

#[derive(Debug, Deserialize)]
struct LvsReport {
    report: Vec<LvsReportSection>,
}

#[derive(Debug, Deserialize)]
struct LvsReportSection {
    #[serde(alias = "lv", default)]
    seg: Vec<SegmentRow>,
}

/// Parses the JSON written by `lvs --reportformat json`.
pub fn parse_lvs_json(content: &str) -> Result<Vec<SegmentRow>, MetadataError> {
    let report: LvsReport =
        serde_json::from_str(content).map_err(|e| MetadataError::Parse(e.to_string()))?;
    Ok(report.report.into_iter().flat_map(|s| s.seg).collect())
}

fn parse_sectors(value: &str, field: &str) -> Result<u64, MetadataError> {
    value
        .trim()
        .trim_end_matches(['s', 'S'])
        .parse()
        .map_err(|_| MetadataError::Parse(format!("invalid {} '{}'", field, value)))
}

/// Strips an optional `/dev/` prefix from a user-supplied name.
fn normalize_name(name: &str) -> &str {
    name.strip_prefix("/dev/").unwrap_or(name).trim_matches('/')
}

/// Groups segment rows into volumes, in the order volumes first appear,
/// and checks that every requested name matched at least one of them.
pub fn volumes_from_rows(
    names: &[String],
    rows: &[SegmentRow],
) -> Result<Vec<VolumeInfo>, MetadataError> {
    let mut volumes: Vec<VolumeInfo> = Vec::new();

    for row in rows {
        let segment = Segment {
            start: parse_sectors(&row.seg_start, "seg_start")?,
            length: parse_sectors(&row.seg_size, "seg_size")?,
        };
        let name = format!("{}/{}", row.vg_name, row.lv_name);
        match volumes.iter_mut().find(|v| v.name == name) {
            Some(volume) => volume.segments.push(segment),
            None => volumes.push(VolumeInfo {
                dm_name: dm_name(&row.vg_name, &row.lv_name),
                name,
                segments: vec![segment],
            }),
        }
    }

    for volume in &mut volumes {
        volume.segments.sort_by_key(|s| s.start);
    }

    for requested in names {
        let requested = normalize_name(requested);
        let matched = volumes.iter().any(|v| {
            v.name == requested
                || v.name
                    .split_once('/')
                    .is_some_and(|(vg, _)| vg == requested)
        });
        if !matched {
            return Err(MetadataError::NotFound(requested.to_string()));
        }
    }

    Ok(volumes)
}

/// [`VolumeResolver`] backed by the `lvs` command.
#[derive(Debug, Clone)]
pub struct LvsResolver {
    binary: String,
}

impl Default for LvsResolver {
    fn default() -> Self {
        Self::new("lvs")
    }
}

impl LvsResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl VolumeResolver for LvsResolver {
    fn resolve(&mut self, names: &[String]) -> Result<Vec<VolumeInfo>, MetadataError> {
        let targets: Vec<&str> = names.iter().map(|n| normalize_name(n)).collect();
        trace!("{} segment report for {:?}", self.binary, targets);

        let output = Command::new(&self.binary)
            .args([
                "--reportformat",
                "json",
                "--units",
                "s",
                "--nosuffix",
                "-o",
                "vg_name,lv_name,seg_start,seg_size",
            ])
            .args(&targets)
            .output()
            .map_err(|e| MetadataError::Command(format!("{}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MetadataError::Command(format!(
                "{} ({})",
                stderr.trim(),
                output.status
            )));
        }

        let rows = parse_lvs_json(&String::from_utf8_lossy(&output.stdout))?;
        let volumes = volumes_from_rows(names, &rows)?;
        debug!("Resolved {:?} to {} volume(s)", targets, volumes.len());
        Ok(volumes)
    }
}
