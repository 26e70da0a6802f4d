//! Host metadata persistence
//!
//! The store is the system of record for created hosts. A descriptor is
//! saved exactly once, after a successful remote create; there is no
//! rollback of the remote host if that save fails.

pub mod mock;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::MachinistError;
use crate::dirs::MachineDirs;
use crate::host::HostDescriptor;

/// Persistence boundary for host descriptors.
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Whether a host of this name is already recorded.
    async fn exists(&self, name: &str) -> Result<bool, MachinistError>;

    /// Persist the descriptor.
    async fn save(&self, host: &HostDescriptor) -> Result<(), MachinistError>;

    /// Root directory under which per-host state lives.
    fn machines_dir(&self) -> PathBuf;
}

/// Filesystem store: one directory per host with a `config.json` inside.
pub struct FileStore {
    machines_root: PathBuf,
}

impl FileStore {
    pub fn new(dirs: &MachineDirs) -> Self {
        Self {
            machines_root: dirs.machines_dir(),
        }
    }

    /// Store rooted at an explicit machines directory (useful for testing)
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            machines_root: root.as_ref().to_path_buf(),
        }
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.machines_root.join(name).join("config.json")
    }
}

#[async_trait]
impl HostStore for FileStore {
    async fn exists(&self, name: &str) -> Result<bool, MachinistError> {
        Ok(fs::try_exists(self.config_path(name)).await?)
    }

    async fn save(&self, host: &HostDescriptor) -> Result<(), MachinistError> {
        let machine_dir = self.machines_root.join(&host.name);
        fs::create_dir_all(&machine_dir).await?;

        let payload = serde_json::to_vec_pretty(host)?;
        fs::write(machine_dir.join("config.json"), payload).await?;

        debug!("host {:?} saved under {}", host.name, machine_dir.display());
        Ok(())
    }

    fn machines_dir(&self) -> PathBuf {
        self.machines_root.clone()
    }
}
