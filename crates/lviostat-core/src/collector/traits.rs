//! Seams of the sampling round: filesystem reads for `/proc` and the
//! allocator statistics behind the memory line.

use std::io;
use std::path::Path;

use crate::collector::procfs::CollectError;
use crate::storage::model::MemSample;

/// Read-only filesystem access used by the `/proc` samplers.
pub trait FileSystem {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// Source of the process allocator's byte totals.
pub trait MemorySource {
    /// Takes a fresh reading; counters must not be cached between calls.
    fn sample(&mut self) -> Result<MemSample, CollectError>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_fs_read_to_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uptime");
        std::fs::write(&path, "350735.47 234388.90\n").unwrap();

        let fs = RealFs::new();
        assert_eq!(fs.read_to_string(&path).unwrap(), "350735.47 234388.90\n");
    }

    #[test]
    fn test_real_fs_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFs::new();
        let err = fs.read_to_string(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
