//! System collector for CPU, memory and uptime samples.

use std::path::Path;

use crate::collector::procfs::parser::{parse_proc_stat, parse_uptime};
use crate::collector::traits::FileSystem;
use crate::storage::model::{CpuSample, UptimeSample};

/// Error type for `/proc` collection failures.
#[derive(Debug)]
pub enum CollectError {
    /// I/O error reading a file.
    Io(String, std::io::Error),
    /// Parse error in a file.
    Parse(String, String),
    /// Allocator statistics could not be read.
    Allocator(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Io(path, e) => write!(f, "I/O error reading {}: {}", path, e),
            CollectError::Parse(path, msg) => write!(f, "parse error in {}: {}", path, msg),
            CollectError::Allocator(msg) => write!(f, "allocator statistics: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {}

/// Reads system-wide samples from `/proc/`.
pub struct SystemCollector<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> SystemCollector<F> {
    /// Creates a new system collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    /// Mutable access to the filesystem, used by tests to advance mock files.
    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    fn read(&self, name: &str) -> Result<(String, String), CollectError> {
        let path = format!("{}/{}", self.proc_path, name);
        let content = self
            .fs
            .read_to_string(Path::new(&path))
            .map_err(|e| CollectError::Io(path.clone(), e))?;
        Ok((path, content))
    }

    /// Collects aggregate CPU counters from `/proc/stat`.
    pub fn collect_cpu(&self) -> Result<CpuSample, CollectError> {
        let (path, content) = self.read("stat")?;
        parse_proc_stat(&content).map_err(|e| CollectError::Parse(path, e.message))
    }

    /// Collects uptime from `/proc/uptime`.
    pub fn collect_uptime(&self) -> Result<UptimeSample, CollectError> {
        let (path, content) = self.read("uptime")?;
        parse_uptime(&content).map_err(|e| CollectError::Parse(path, e.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn test_collect_from_typical_system() {
        let collector = SystemCollector::new(MockFs::typical_system(), "/proc");

        let cpu = collector.collect_cpu().unwrap();
        assert_eq!(cpu.user, 1000);
        assert_eq!(cpu.ncpus, 2);

        assert_eq!(collector.collect_uptime().unwrap().ticks, 1_000_000);
    }

    #[test]
    fn test_collect_reports_path() {
        let mut fs = MockFs::typical_system();
        fs.add_file("/proc/uptime", "garbage");
        fs.remove_file("/proc/stat");
        let collector = SystemCollector::new(fs, "/proc");

        let err = collector.collect_uptime().unwrap_err();
        assert!(err.to_string().contains("/proc/uptime"));
        assert!(matches!(
            collector.collect_cpu(),
            Err(CollectError::Io(path, _)) if path == "/proc/stat"
        ));
    }
}
