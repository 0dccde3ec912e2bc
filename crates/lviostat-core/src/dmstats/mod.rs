//! Device-mapper statistics facility.
//!
//! The kernel exposes per-region I/O counters through `dmsetup message`
//! commands (`@stats_create`, `@stats_list`, `@stats_print`, `@stats_delete`).
//! [`StatsFacility`] abstracts those four operations so that region
//! bookkeeping can run against the real `dmsetup` binary or against
//! [`crate::collector::mock::MockFacility`] in tests.

pub mod parser;
pub mod region;

use std::fmt;
use std::process::Command;

use tracing::trace;

use crate::storage::store::RegionId;

pub use parser::{MalformedSampleError, RegionEntry};
pub use region::{Partition, Region, RegionManager, RegionRange};

/// A dm-stats operation rejected by the facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationError {
    pub operation: &'static str,
    pub device: String,
    pub message: String,
}

impl RegistrationError {
    pub fn new(operation: &'static str, device: &str, message: impl Into<String>) -> Self {
        Self {
            operation,
            device: device.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dm-stats {} on {} failed: {}",
            self.operation, self.device, self.message
        )
    }
}

impl std::error::Error for RegistrationError {}

/// The four dm-stats operations the report depends on.
pub trait StatsFacility {
    /// Registers a region and returns the id assigned by the facility.
    fn create(
        &mut self,
        device: &str,
        range: RegionRange,
        partition: Partition,
        program_id: &str,
    ) -> Result<RegionId, RegistrationError>;

    /// Returns the raw `@stats_list` response for regions owned by `program_id`.
    fn list(&mut self, device: &str, program_id: &str) -> Result<String, RegistrationError>;

    /// Returns the raw `@stats_print` response; `clear` resets the counters.
    fn print(
        &mut self,
        device: &str,
        region: RegionId,
        clear: bool,
    ) -> Result<String, RegistrationError>;

    /// Removes a region.
    fn delete(&mut self, device: &str, region: RegionId) -> Result<(), RegistrationError>;
}

/// [`StatsFacility`] backed by the `dmsetup` binary.
#[derive(Debug, Clone)]
pub struct DmSetup {
    binary: String,
}

impl Default for DmSetup {
    fn default() -> Self {
        Self::new("dmsetup")
    }
}

impl DmSetup {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Sends one `dmsetup message <device> 0 <args>` and returns stdout.
    fn message(
        &self,
        operation: &'static str,
        device: &str,
        args: &[&str],
    ) -> Result<String, RegistrationError> {
        trace!("{} message {} 0 {}", self.binary, device, args.join(" "));

        let output = Command::new(&self.binary)
            .arg("message")
            .arg(device)
            .arg("0")
            .args(args)
            .output()
            .map_err(|e| {
                RegistrationError::new(operation, device, format!("{}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RegistrationError::new(
                operation,
                device,
                format!("{} ({})", stderr.trim(), output.status),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl StatsFacility for DmSetup {
    fn create(
        &mut self,
        device: &str,
        range: RegionRange,
        partition: Partition,
        program_id: &str,
    ) -> Result<RegionId, RegistrationError> {
        let range_arg = range.to_string();
        let step_arg = partition.step_arg(range);
        let response = self.message(
            "create",
            device,
            &["@stats_create", &range_arg, &step_arg, program_id],
        )?;

        response.trim().parse().map_err(|_| {
            RegistrationError::new(
                "create",
                device,
                format!("unexpected response '{}'", response.trim()),
            )
        })
    }

    fn list(&mut self, device: &str, program_id: &str) -> Result<String, RegistrationError> {
        self.message("list", device, &["@stats_list", program_id])
    }

    fn print(
        &mut self,
        device: &str,
        region: RegionId,
        clear: bool,
    ) -> Result<String, RegistrationError> {
        let command = if clear {
            "@stats_print_clear"
        } else {
            "@stats_print"
        };
        self.message("print", device, &[command, &region.to_string()])
    }

    fn delete(&mut self, device: &str, region: RegionId) -> Result<(), RegistrationError> {
        self.message("delete", device, &["@stats_delete", &region.to_string()])
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_registration_error() {
        let mut dm = DmSetup::new("/nonexistent/dmsetup-12345");
        let err = dm.delete("vg0-lv0", 0).unwrap_err();
        assert_eq!(err.operation, "delete");
        assert_eq!(err.device, "vg0-lv0");
        assert!(err.to_string().contains("dm-stats delete on vg0-lv0 failed"));
    }
}
