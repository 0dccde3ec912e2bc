//! In-memory filesystem for testing the `/proc` samplers.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::collector::traits::FileSystem;

/// In-memory filesystem.
///
/// Stores file contents keyed by path; parent directories are implied.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, String>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Removes a file, simulating an unreadable source.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) {
        self.files.remove(path.as_ref());
    }

    /// A two-CPU machine with plausible `/proc/stat` and `/proc/uptime`
    /// under `/proc`.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();
        fs.set_proc_stat(1000, 10, 500, 8000, 100, 0);
        fs.set_uptime_ticks(1_000_000);
        fs
    }

    /// Writes a `/proc/stat` with the given aggregate counters split evenly
    /// over two CPUs.
    pub fn set_proc_stat(
        &mut self,
        user: u64,
        nice: u64,
        system: u64,
        idle: u64,
        iowait: u64,
        steal: u64,
    ) {
        let line = |name: &str, div: u64| {
            format!(
                "{} {} {} {} {} {} 0 0 {} 0 0\n",
                name,
                user / div,
                nice / div,
                system / div,
                idle / div,
                iowait / div,
                steal / div
            )
        };
        let mut content = line("cpu", 1);
        content.push_str(&line("cpu0", 2));
        content.push_str(&line("cpu1", 2));
        content.push_str("ctxt 123456\nbtime 1700000000\nprocesses 4242\n");
        self.add_file("/proc/stat", content);
    }

    /// Writes `/proc/uptime` so that it converts to `ticks`.
    pub fn set_uptime_ticks(&mut self, ticks: u64) {
        self.add_file(
            "/proc/uptime",
            format!("{}.{:02} 1234.56\n", ticks / 100, ticks % 100),
        );
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }
}
