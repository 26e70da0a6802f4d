//! Driver for hosts that already run an engine
//!
//! The `none` driver performs no remote provisioning. It records the
//! endpoint of an existing engine so the host can be managed like any
//! other, and it is the default driver when none is selected.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Driver, IdentityBlob};
use crate::MachinistError;
use crate::flags::{FlagDescriptor, FlagValue, OptionBundle};

pub const DRIVER_NAME: &str = "none";

const URL_FLAG: &str = "none-url";
const ENGINE_PORT_FLAG: &str = "none-engine-port";
const DEFAULT_ENGINE_PORT: i64 = 2376;

pub struct NoneDriver {
    identity: IdentityBlob,
    url: String,
    engine_port: i64,
}

impl NoneDriver {
    pub fn new(identity: IdentityBlob) -> Self {
        Self {
            identity,
            url: String::new(),
            engine_port: DEFAULT_ENGINE_PORT,
        }
    }
}

#[async_trait]
impl Driver for NoneDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn create_flags(&self) -> Vec<FlagDescriptor> {
        vec![
            FlagDescriptor::String {
                name: URL_FLAG.to_string(),
                usage: "URL of the existing engine endpoint".to_string(),
                env_var: Some("MACHINIST_NONE_URL".to_string()),
                default: String::new(),
            },
            FlagDescriptor::Int {
                name: ENGINE_PORT_FLAG.to_string(),
                usage: "Port the engine listens on".to_string(),
                env_var: None,
                default: DEFAULT_ENGINE_PORT,
            },
        ]
    }

    fn set_config_from_flags(&mut self, options: &OptionBundle) -> Result<(), MachinistError> {
        self.url = options.string(URL_FLAG).unwrap_or_default().to_string();
        if let Some(port) = options.get(ENGINE_PORT_FLAG).and_then(FlagValue::as_int) {
            self.engine_port = port;
        }

        if self.url.is_empty() {
            return Err(MachinistError::Driver(format!(
                "--{URL_FLAG} is required when using the none driver"
            )));
        }
        Ok(())
    }

    async fn create(&mut self) -> Result<(), MachinistError> {
        debug!(
            "nothing to provision for machine {:?}",
            self.identity.machine_name
        );
        info!(
            "registered existing engine at {} (port {})",
            self.url, self.engine_port
        );
        Ok(())
    }
}
