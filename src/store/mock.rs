//! Mock host store for testing

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::HostStore;
use crate::MachinistError;
use crate::host::HostDescriptor;

/// In-memory stand-in for the host store.
pub struct MockStore {
    existing: Vec<String>,
    machines_root: PathBuf,
    exists_error: Option<String>,
    save_error: Option<String>,
    saved: Arc<Mutex<Vec<HostDescriptor>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            existing: Vec::new(),
            machines_root: PathBuf::from("machines"),
            exists_error: None,
            save_error: None,
            saved: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Pretend a host of this name is already recorded.
    pub fn with_existing(mut self, name: &str) -> Self {
        self.existing.push(name.to_string());
        self
    }

    pub fn with_machines_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.machines_root = root.into();
        self
    }

    pub fn with_exists_error(mut self, error: &str) -> Self {
        self.exists_error = Some(error.to_string());
        self
    }

    pub fn with_save_error(mut self, error: &str) -> Self {
        self.save_error = Some(error.to_string());
        self
    }

    /// Every descriptor passed to `save`, in order.
    pub fn saved(&self) -> Vec<HostDescriptor> {
        self.saved.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostStore for MockStore {
    async fn exists(&self, name: &str) -> Result<bool, MachinistError> {
        if let Some(error) = &self.exists_error {
            return Err(MachinistError::Store(error.clone()));
        }
        Ok(self.existing.iter().any(|existing| existing == name))
    }

    async fn save(&self, host: &HostDescriptor) -> Result<(), MachinistError> {
        if let Some(error) = &self.save_error {
            return Err(MachinistError::Store(error.clone()));
        }
        self.saved.lock().unwrap().push(host.clone());
        Ok(())
    }

    fn machines_dir(&self) -> PathBuf {
        self.machines_root.clone()
    }
}
