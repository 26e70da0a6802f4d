//! Mock driver and plugin boundary for testing
//!
//! Builder-style test doubles that record every interaction crossing the
//! plugin boundary.
//!
//! # Example
//! ```
//! use machinist::drivers::mock::{MockDriver, MockPlugins};
//!
//! let plugins = MockPlugins::new(
//!     MockDriver::new()
//!         .with_name("null-provider")
//!         .with_create_error("quota exceeded"),
//! );
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Driver, DriverPlugins, IdentityBlob};
use crate::MachinistError;
use crate::flags::{FlagDescriptor, OptionBundle};

/// Everything a mock driver observed, shared across cloned handles.
#[derive(Debug, Default)]
pub struct MockDriverState {
    /// The bundle last applied through `set_config_from_flags`.
    pub applied: Option<OptionBundle>,
    pub config_calls: usize,
    pub create_calls: usize,
}

/// Configurable stand-in for a provider driver.
#[derive(Clone)]
pub struct MockDriver {
    name: &'static str,
    flags: Vec<FlagDescriptor>,
    userdata_flag: Option<String>,
    config_error: Option<String>,
    create_error: Option<String>,
    state: Arc<Mutex<MockDriverState>>,
}

impl MockDriver {
    /// Create a mock driver that succeeds at everything.
    pub fn new() -> Self {
        Self {
            name: "mock",
            flags: Vec::new(),
            userdata_flag: None,
            config_error: None,
            create_error: None,
            state: Arc::new(Mutex::new(MockDriverState::default())),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Set the flag schema the driver declares.
    pub fn with_flags(mut self, flags: Vec<FlagDescriptor>) -> Self {
        self.flags = flags;
        self
    }

    /// Expose a userdata flag under the given name.
    pub fn with_userdata_flag(mut self, flag: &str) -> Self {
        self.userdata_flag = Some(flag.to_string());
        self
    }

    /// Make `set_config_from_flags` fail.
    pub fn with_config_error(mut self, error: &str) -> Self {
        self.config_error = Some(error.to_string());
        self
    }

    /// Make the remote create fail.
    pub fn with_create_error(mut self, error: &str) -> Self {
        self.create_error = Some(error.to_string());
        self
    }

    /// Handle on the recorded interactions; shared by every clone of this
    /// driver, including handles given out by [`MockPlugins`].
    pub fn state(&self) -> Arc<Mutex<MockDriverState>> {
        Arc::clone(&self.state)
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn create_flags(&self) -> Vec<FlagDescriptor> {
        self.flags.clone()
    }

    fn set_config_from_flags(&mut self, options: &OptionBundle) -> Result<(), MachinistError> {
        let mut state = self.state.lock().unwrap();
        state.config_calls += 1;
        state.applied = Some(options.clone());

        match &self.config_error {
            Some(error) => Err(MachinistError::Driver(error.clone())),
            None => Ok(()),
        }
    }

    async fn create(&mut self) -> Result<(), MachinistError> {
        self.state.lock().unwrap().create_calls += 1;

        match &self.create_error {
            Some(error) => Err(MachinistError::Driver(error.clone())),
            None => Ok(()),
        }
    }

    fn userdata_flag_name(&self) -> Option<String> {
        self.userdata_flag.clone()
    }
}

/// Plugin boundary handing out clones of one mock driver.
pub struct MockPlugins {
    driver: MockDriver,
    new_host_error: Option<String>,
    calls: Arc<Mutex<Vec<(String, IdentityBlob)>>>,
}

impl MockPlugins {
    pub fn new(driver: MockDriver) -> Self {
        Self {
            driver,
            new_host_error: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make every `new_host` call fail.
    pub fn with_new_host_error(mut self, error: &str) -> Self {
        self.new_host_error = Some(error.to_string());
        self
    }

    /// Every `(driver_name, identity)` pair `new_host` was called with.
    pub fn new_host_calls(&self) -> Vec<(String, IdentityBlob)> {
        self.calls.lock().unwrap().clone()
    }
}

impl DriverPlugins for MockPlugins {
    fn new_host(
        &self,
        driver_name: &str,
        identity: &IdentityBlob,
    ) -> Result<Box<dyn Driver>, MachinistError> {
        self.calls
            .lock()
            .unwrap()
            .push((driver_name.to_string(), identity.clone()));

        match &self.new_host_error {
            Some(error) => Err(MachinistError::NewHostFailed(error.clone())),
            None => Ok(Box::new(self.driver.clone())),
        }
    }
}
