//! Structured crash reports for failed remote create operations.
//!
//! A remote create failure is terminal: there is no retry and nothing is
//! written to the store. What the caller gets instead is a report carrying
//! enough context to diagnose the failure.

use std::fmt;
use std::path::PathBuf;

/// Diagnostic record of a failed provider-side operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    /// The provider-side error that caused the failure.
    pub cause: String,
    /// Which lifecycle phase failed.
    pub phase: &'static str,
    /// Driver the host was being created with.
    pub driver_name: String,
    /// Provider-specific log artifact, when the backend leaves one behind.
    pub log_file_path: Option<PathBuf>,
}

impl CrashReport {
    /// Build a report for a failed `Create`.
    pub fn for_create(
        cause: impl Into<String>,
        driver_name: impl Into<String>,
        log_file_path: Option<PathBuf>,
    ) -> Self {
        Self {
            cause: cause.into(),
            phase: "Create",
            driver_name: driver_name.into(),
            log_file_path,
        }
    }
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error during {} with driver {:?}: {}",
            self.phase, self.driver_name, self.cause
        )?;
        if let Some(path) = &self.log_file_path {
            write!(f, " (provider log: {})", path.display())?;
        }
        Ok(())
    }
}
