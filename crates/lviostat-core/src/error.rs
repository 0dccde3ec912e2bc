//! Crate-level error type.
//!
//! Each module defines its own error; [`Error`] collects them for callers
//! that drive the whole report (the scheduler and the binary).

use std::fmt;

use crate::collector::CollectError;
use crate::config::ConfigurationError;
use crate::dmstats::{MalformedSampleError, RegistrationError};
use crate::lvm::MetadataError;
use crate::storage::MissingSampleError;

#[derive(Debug)]
pub enum Error {
    /// dm-stats create/read/delete failed.
    Registration(RegistrationError),
    /// Volume or group could not be resolved.
    Metadata(MetadataError),
    /// A counter line did not parse.
    MalformedSample(MalformedSampleError),
    /// An area was read from a slot that never sampled it.
    MissingSample(MissingSampleError),
    /// Invalid or conflicting options.
    Configuration(ConfigurationError),
    /// `/proc` CPU, memory or uptime sample could not be read.
    Collect(CollectError),
    /// Writing the report failed.
    Io(std::io::Error),
}

impl Error {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Registration(e) => write!(f, "{}", e),
            Error::Metadata(e) => write!(f, "{}", e),
            Error::MalformedSample(e) => write!(f, "{}", e),
            Error::MissingSample(e) => write!(f, "{}", e),
            Error::Configuration(e) => write!(f, "{}", e),
            Error::Collect(e) => write!(f, "{}", e),
            Error::Io(e) => write!(f, "output error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Registration(e) => Some(e),
            Error::Metadata(e) => Some(e),
            Error::MalformedSample(e) => Some(e),
            Error::MissingSample(e) => Some(e),
            Error::Configuration(e) => Some(e),
            Error::Collect(e) => Some(e),
            Error::Io(e) => Some(e),
        }
    }
}

impl From<RegistrationError> for Error {
    fn from(e: RegistrationError) -> Self {
        Error::Registration(e)
    }
}

impl From<MetadataError> for Error {
    fn from(e: MetadataError) -> Self {
        Error::Metadata(e)
    }
}

impl From<MalformedSampleError> for Error {
    fn from(e: MalformedSampleError) -> Self {
        Error::MalformedSample(e)
    }
}

impl From<MissingSampleError> for Error {
    fn from(e: MissingSampleError) -> Self {
        Error::MissingSample(e)
    }
}

impl From<ConfigurationError> for Error {
    fn from(e: ConfigurationError) -> Self {
        Error::Configuration(e)
    }
}

impl From<CollectError> for Error {
    fn from(e: CollectError) -> Self {
        Error::Collect(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
