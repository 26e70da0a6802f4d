//! Provider driver plugin boundary
//!
//! A driver implements host lifecycle operations for one virtualization or
//! cloud backend. The boundary is schema-first: before a host is created,
//! the driver declares its configuration surface as [`FlagDescriptor`]s and
//! is later configured with a resolved [`OptionBundle`]. Transport to an
//! out-of-process plugin is a registry concern and out of scope here.

pub mod mock;
pub mod none;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::MachinistError;
use crate::flags::{FlagDescriptor, OptionBundle};

/// Machine name used for the bare schema-discovery handle in the outer
/// parsing pass.
pub const FLAG_LOOKUP_MACHINE_NAME: &str = "flag-lookup";

/// Minimal identity handed to a driver when a handle is instantiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityBlob {
    pub machine_name: String,
    pub store_path: PathBuf,
}

impl IdentityBlob {
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            machine_name: machine_name.into(),
            store_path: store_path.into(),
        }
    }

    /// Identity for a handle that only exists to report its flag schema.
    pub fn for_flag_lookup() -> Self {
        Self::new(FLAG_LOOKUP_MACHINE_NAME, PathBuf::new())
    }
}

/// One provider backend's host lifecycle operations.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Name of the backend this driver provisions.
    fn name(&self) -> &'static str;

    /// The configuration schema this driver accepts for create.
    fn create_flags(&self) -> Vec<FlagDescriptor>;

    /// Apply a resolved option bundle to the driver configuration.
    fn set_config_from_flags(&mut self, options: &OptionBundle) -> Result<(), MachinistError>;

    /// Provision the remote host.
    ///
    /// Blocking remote operation with no cancellation or timeout; a stuck
    /// provider stalls the whole invocation. Side effects on the provider
    /// side are irreversible from here.
    async fn create(&mut self) -> Result<(), MachinistError>;

    /// Name of the driver flag carrying a userdata/boot-configuration file
    /// path, for backends that support one.
    fn userdata_flag_name(&self) -> Option<String> {
        None
    }
}

/// Boundary through which driver handles are instantiated.
///
/// Implementations must surface every failure as
/// [`MachinistError::NewHostFailed`].
pub trait DriverPlugins: Send + Sync {
    fn new_host(
        &self,
        driver_name: &str,
        identity: &IdentityBlob,
    ) -> Result<Box<dyn Driver>, MachinistError>;
}

type DriverFactory = fn(IdentityBlob) -> Box<dyn Driver>;

/// In-process registry of the compiled-in drivers.
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Registry with every built-in driver.
    pub fn builtin() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register(none::DRIVER_NAME, |identity| {
            Box::new(none::NoneDriver::new(identity))
        });
        registry
    }

    pub fn register(&mut self, name: &str, factory: DriverFactory) {
        self.factories.insert(name.to_string(), factory);
    }
}

impl DriverPlugins for DriverRegistry {
    fn new_host(
        &self,
        driver_name: &str,
        identity: &IdentityBlob,
    ) -> Result<Box<dyn Driver>, MachinistError> {
        let factory = self.factories.get(driver_name).ok_or_else(|| {
            MachinistError::NewHostFailed(format!("unknown driver {driver_name:?}"))
        })?;
        debug!(
            "instantiating driver {:?} for machine {:?}",
            driver_name, identity.machine_name
        );
        Ok(factory(identity.clone()))
    }
}
