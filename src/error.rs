//! Error types for machinist

use thiserror::Error;

use crate::crashreport::CrashReport;

/// Main error type for machinist operations
#[derive(Error, Debug)]
pub enum MachinistError {
    #[error("no machine name specified")]
    NoMachineName,

    #[error("invalid command line: found extra arguments {0:?}")]
    TooManyArguments(Vec<String>),

    #[error(
        "invalid hostname {0:?}: must be 1-63 characters, start with an alphanumeric \
         character and contain only alphanumerics, '-' and '.'"
    )]
    InvalidHostname(String),

    #[error("swarm discovery URL was in the wrong format: {0}")]
    InvalidSwarmDiscovery(String),

    #[error("provider declared a flag of an unrecognized kind")]
    UnsupportedFlagKind,

    #[error("duplicate flag name {0:?}")]
    DuplicateFlagName(String),

    #[error("error getting new host: {0}")]
    NewHostFailed(String),

    #[error("host {0:?} already exists")]
    HostAlreadyExists(String),

    #[error("could not alter cloud-init file: {0}")]
    UserdataRewriteFailed(#[source] Box<MachinistError>),

    #[error("existing userdata does not begin with '#!' or '#cloud-config'")]
    UnsupportedUserdataFormat,

    #[error("malformed cloud-config: {0}")]
    MalformedCloudConfig(String),

    #[error("error setting machine configuration from flags provided: {0}")]
    ConfigurationRejected(String),

    #[error("{0}")]
    CreateFailed(CrashReport),

    #[error("error attempting to save store: {0}")]
    PersistFailed(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Cli(#[from] clap::Error),
}
