//! Machinist storage layout
//!
//! Defines the on-disk directory structure used for host metadata and
//! TLS material.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the storage root.
pub const STORAGE_PATH_ENV_VAR: &str = "MACHINIST_STORAGE_PATH";

/// Directory name used when no storage root is configured.
pub const DEFAULT_BASE_DIR_NAME: &str = ".machinist";

/// Root of the machinist state tree
#[derive(Debug, Clone)]
pub struct MachineDirs {
    /// Base storage directory (default: `$HOME/.machinist`)
    pub base: PathBuf,
}

impl Default for MachineDirs {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineDirs {
    /// Create with the configured default root: `$MACHINIST_STORAGE_PATH`,
    /// else `$HOME/.machinist`.
    pub fn new() -> Self {
        let base = env::var_os(STORAGE_PATH_ENV_VAR)
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_BASE_DIR_NAME)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_DIR_NAME));
        Self { base }
    }

    /// Create with a custom base directory (useful for testing)
    pub fn with_base(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    /// `<base>/machines` - all per-host directories
    pub fn machines_dir(&self) -> PathBuf {
        self.base.join("machines")
    }

    /// `<base>/machines/<name>` - one host's metadata and TLS material
    pub fn machine_dir(&self, name: &str) -> PathBuf {
        self.machines_dir().join(name)
    }

    /// `<base>/certs` - per-installation certificate authority directory
    pub fn cert_dir(&self) -> PathBuf {
        self.base.join("certs")
    }
}
