//! Host descriptors and configuration options
//!
//! A [`HostDescriptor`] is assembled in memory by the create workflow,
//! submitted once to the provider driver, and persisted to the store on
//! success. It is never mutated after persistence.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Identity and configuration of one managed host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostDescriptor {
    pub name: String,
    pub driver_name: String,
    /// Provider-opaque configuration blob, exactly as handed to the driver.
    pub driver_config: serde_json::Value,
    pub options: HostOptions,
}

/// Post-create provisioning configuration.
///
/// A custom install script is mutually exclusive with the auth/engine/swarm
/// bundles: when one is supplied, provisioning is delegated entirely to the
/// script and the three bundles are cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostOptions {
    pub auth: Option<AuthOptions>,
    pub engine: Option<EngineOptions>,
    pub swarm: Option<SwarmOptions>,
    pub custom_install_script: Option<String>,
}

/// TLS material locations for one host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthOptions {
    pub cert_dir: PathBuf,
    pub ca_cert_path: PathBuf,
    pub ca_private_key_path: PathBuf,
    pub client_cert_path: PathBuf,
    pub client_key_path: PathBuf,
    pub server_cert_path: PathBuf,
    pub server_key_path: PathBuf,
    pub store_path: PathBuf,
    pub server_cert_sans: Vec<String>,
}

/// Container-engine installation and daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineOptions {
    pub arbitrary_flags: Vec<String>,
    pub env: Vec<String>,
    pub insecure_registry: Vec<String>,
    pub labels: Vec<String>,
    pub registry_mirror: Vec<String>,
    pub storage_driver: String,
    pub tls_verify: bool,
    pub install_url: String,
}

/// Swarm cluster membership configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmOptions {
    pub is_swarm: bool,
    pub image: String,
    pub agent: bool,
    pub master: bool,
    pub discovery: String,
    pub address: String,
    pub host: String,
    pub strategy: String,
    pub arbitrary_flags: Vec<String>,
    pub arbitrary_join_flags: Vec<String>,
    pub is_experimental: bool,
}

const MAX_HOSTNAME_LEN: usize = 63;

fn hostname_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9\-.]*$").unwrap())
}

/// Check a machine name against the hostname grammar: 1-63 characters,
/// leading alphanumeric, then alphanumerics, `-` and `.`.
pub fn validate_hostname(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_HOSTNAME_LEN && hostname_pattern().is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_hostnames() {
        assert!(validate_hostname("box1"));
        assert!(validate_hostname("Box-1.example.com"));
        assert!(validate_hostname("0"));
    }

    #[test]
    fn test_invalid_hostnames() {
        assert!(!validate_hostname(""));
        assert!(!validate_hostname("-leading-dash"));
        assert!(!validate_hostname(".leading-dot"));
        assert!(!validate_hostname("under_score"));
        assert!(!validate_hostname("has space"));
        assert!(!validate_hostname(&"a".repeat(64)));
    }

    #[test]
    fn test_options_default_to_empty() {
        let options = HostOptions::default();
        assert!(options.auth.is_none());
        assert!(options.custom_install_script.is_none());
    }
}
