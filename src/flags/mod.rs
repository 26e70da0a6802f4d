//! Provider flag schema negotiation
//!
//! The set of legal `create` flags depends on which driver is selected, but
//! the driver name itself comes from the same command line whose flags have
//! not yet been declared to the parser. The protocol here breaks that cycle
//! in two passes:
//!
//! 1. **Outer pass**: [`resolve_driver_name`] scans the raw argument list
//!    (no formal parsing) for `--driver`/`-d`, falling back to
//!    `MACHINIST_DRIVER` and then the built-in default. The resolved
//!    driver's [`FlagDescriptor`] schema is converted into concrete
//!    [`clap::Arg`]s with [`build_create_args`], after which the full
//!    command line is parsed exactly once.
//! 2. **Inner pass**: [`resolve_bundle`] turns the parse result back into an
//!    [`OptionBundle`], the typed name→value payload a driver is configured
//!    with.

use std::collections::{BTreeMap, BTreeSet};
use std::env;

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches};
use serde::{Deserialize, Serialize};

use crate::MachinistError;

/// Environment variable consulted when no `--driver` flag is given.
pub const DRIVER_ENV_VAR: &str = "MACHINIST_DRIVER";

/// Driver used when neither the command line nor the environment names one.
pub const DEFAULT_DRIVER: &str = "none";

/// Abstract schema entry for one configuration option a driver accepts.
///
/// Descriptors cross the plugin boundary as tagged wire values; a kind this
/// build does not know deserializes to [`FlagDescriptor::Unknown`] and is
/// rejected when converted to a concrete flag, never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlagDescriptor {
    Bool {
        name: String,
        usage: String,
        #[serde(default)]
        env_var: Option<String>,
    },
    Int {
        name: String,
        usage: String,
        #[serde(default)]
        env_var: Option<String>,
        default: i64,
    },
    String {
        name: String,
        usage: String,
        #[serde(default)]
        env_var: Option<String>,
        default: String,
    },
    StringList {
        name: String,
        usage: String,
        #[serde(default)]
        env_var: Option<String>,
        #[serde(default)]
        default: Vec<String>,
    },
    /// Any wire kind this build does not recognize.
    #[serde(other)]
    Unknown,
}

impl FlagDescriptor {
    /// Flag name, or `None` for [`FlagDescriptor::Unknown`].
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Bool { name, .. }
            | Self::Int { name, .. }
            | Self::String { name, .. }
            | Self::StringList { name, .. } => Some(name),
            Self::Unknown => None,
        }
    }

    /// Environment-variable alias, if declared.
    pub fn env_var(&self) -> Option<&str> {
        match self {
            Self::Bool { env_var, .. }
            | Self::Int { env_var, .. }
            | Self::String { env_var, .. }
            | Self::StringList { env_var, .. } => env_var.as_deref(),
            Self::Unknown => None,
        }
    }

    /// The declared default, as a runtime value.
    ///
    /// Bool flags always default to `false`.
    pub fn default_value(&self) -> Option<FlagValue> {
        match self {
            Self::Bool { .. } => Some(FlagValue::Bool(false)),
            Self::Int { default, .. } => Some(FlagValue::Int(*default)),
            Self::String { default, .. } => Some(FlagValue::String(default.clone())),
            Self::StringList { default, .. } => Some(FlagValue::List(default.clone())),
            Self::Unknown => None,
        }
    }

    /// Convert into the concrete command-line argument for this descriptor.
    pub fn to_arg(&self) -> Result<Arg, MachinistError> {
        let arg = match self {
            Self::Bool { name, usage, env_var } => with_env(
                Arg::new(name.clone())
                    .long(name.clone())
                    .help(usage.clone())
                    .action(ArgAction::SetTrue),
                env_var,
            ),
            Self::Int {
                name,
                usage,
                env_var,
                default,
            } => with_env(
                Arg::new(name.clone())
                    .long(name.clone())
                    .help(usage.clone())
                    .action(ArgAction::Set)
                    .value_parser(clap::value_parser!(i64))
                    .default_value(default.to_string()),
                env_var,
            ),
            Self::String {
                name,
                usage,
                env_var,
                default,
            } => {
                let mut arg = Arg::new(name.clone())
                    .long(name.clone())
                    .help(usage.clone())
                    .action(ArgAction::Set);
                if !default.is_empty() {
                    arg = arg.default_value(default.clone());
                }
                with_env(arg, env_var)
            }
            // List defaults are seeded into the option bundle rather than
            // the parser; see resolve_bundle.
            Self::StringList { name, usage, env_var, .. } => with_env(
                Arg::new(name.clone())
                    .long(name.clone())
                    .help(usage.clone())
                    .action(ArgAction::Append),
                env_var,
            ),
            Self::Unknown => return Err(MachinistError::UnsupportedFlagKind),
        };
        Ok(arg)
    }
}

fn with_env(arg: Arg, env_var: &Option<String>) -> Arg {
    match env_var {
        Some(var) => arg.env(var.clone()),
        None => arg,
    }
}

/// A runtime flag value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<String>),
}

impl FlagValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }
}

/// Name→value mapping sent across the plugin boundary to configure a host.
///
/// Keys are unique; the bundle carries one entry per provider flag plus
/// every shared create flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionBundle {
    values: BTreeMap<String, FlagValue>,
}

impl OptionBundle {
    pub fn insert(&mut self, name: impl Into<String>, value: FlagValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.values.get(name)
    }

    /// String value of `name`, if present and a string.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FlagValue::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Scan a raw argument list for an explicit driver selection.
///
/// Recognizes `--driver foo`, `-d foo`, `--driver=foo` and `-d=foo`. This
/// runs before any formal parsing, so it must not assume anything else
/// about the argument list.
pub fn scan_driver_flag(args: &[String]) -> Option<String> {
    for (i, arg) in args.iter().enumerate() {
        if arg == "--driver" || arg == "-d" {
            if let Some(value) = args.get(i + 1) {
                return Some(value.clone());
            }
        }
        if let Some(value) = arg
            .strip_prefix("--driver=")
            .or_else(|| arg.strip_prefix("-d="))
        {
            return Some(value.to_string());
        }
    }
    None
}

/// Resolve the driver name for this invocation: explicit flag, then the
/// `MACHINIST_DRIVER` environment variable, then the built-in default.
pub fn resolve_driver_name(args: &[String]) -> String {
    scan_driver_flag(args)
        .or_else(|| env::var(DRIVER_ENV_VAR).ok().filter(|value| !value.is_empty()))
        .unwrap_or_else(|| DEFAULT_DRIVER.to_string())
}

/// Convert the shared and provider flag sets into concrete arguments,
/// sorted by name for deterministic help output.
///
/// Flag names must be unique across both sets.
pub fn build_create_args(
    shared: &[FlagDescriptor],
    provider: &[FlagDescriptor],
) -> Result<Vec<Arg>, MachinistError> {
    let mut seen = BTreeSet::new();
    let mut args = Vec::with_capacity(shared.len() + provider.len());

    for descriptor in shared.iter().chain(provider) {
        let arg = descriptor.to_arg()?;
        if !seen.insert(arg.get_id().clone()) {
            return Err(MachinistError::DuplicateFlagName(
                arg.get_id().as_str().to_string(),
            ));
        }
        args.push(arg);
    }

    args.sort_by(|a, b| a.get_id().cmp(b.get_id()));
    Ok(args)
}

/// Inner pass: build the option bundle from the parse result.
///
/// Every flag is seeded with its declared default, then overlaid with the
/// parsed value. Scalar flags expose their current value generically; the
/// StringList variant is gated on an explicit was-it-set check so an
/// explicitly empty list is kept and an untouched one keeps its declared
/// default instead of a spurious parser value.
pub fn resolve_bundle(
    shared: &[FlagDescriptor],
    provider: &[FlagDescriptor],
    matches: &ArgMatches,
) -> OptionBundle {
    let mut bundle = OptionBundle::default();

    for descriptor in shared.iter().chain(provider) {
        let Some(name) = descriptor.name() else {
            continue;
        };
        if let Some(default) = descriptor.default_value() {
            bundle.insert(name, default);
        }

        match descriptor {
            FlagDescriptor::Bool { .. } => {
                bundle.insert(name, FlagValue::Bool(matches.get_flag(name)));
            }
            FlagDescriptor::Int { .. } => {
                if let Some(value) = matches.get_one::<i64>(name) {
                    bundle.insert(name, FlagValue::Int(*value));
                }
            }
            FlagDescriptor::String { .. } => {
                if let Some(value) = matches.get_one::<String>(name) {
                    bundle.insert(name, FlagValue::String(value.clone()));
                }
            }
            FlagDescriptor::StringList { .. } => {
                if matches.value_source(name) == Some(ValueSource::CommandLine) {
                    let values = matches
                        .get_many::<String>(name)
                        .map(|values| values.cloned().collect())
                        .unwrap_or_default();
                    bundle.insert(name, FlagValue::List(values));
                }
            }
            FlagDescriptor::Unknown => {}
        }
    }

    bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Command;

    fn string_flag(name: &str, default: &str, env_var: Option<&str>) -> FlagDescriptor {
        FlagDescriptor::String {
            name: name.to_string(),
            usage: format!("usage for {name}"),
            env_var: env_var.map(str::to_string),
            default: default.to_string(),
        }
    }

    #[test]
    fn test_bool_descriptor_to_arg() {
        let descriptor = FlagDescriptor::Bool {
            name: "fancy-mode".to_string(),
            usage: "Enable fancy mode".to_string(),
            env_var: Some("FANCY_MODE".to_string()),
        };

        let arg = descriptor.to_arg().unwrap();
        assert_eq!(arg.get_id().as_str(), "fancy-mode");
        assert_eq!(arg.get_env().and_then(|v| v.to_str()), Some("FANCY_MODE"));
        assert_eq!(arg.get_env().and_then(|v| v.to_str()), descriptor.env_var());
        assert_eq!(
            descriptor.default_value().and_then(|v| v.as_bool()),
            Some(false)
        );
    }

    #[test]
    fn test_int_descriptor_to_arg_preserves_default() {
        let descriptor = FlagDescriptor::Int {
            name: "cpu-count".to_string(),
            usage: "Number of CPUs".to_string(),
            env_var: Some("CPU_COUNT".to_string()),
            default: 2,
        };

        let arg = descriptor.to_arg().unwrap();
        assert_eq!(arg.get_id().as_str(), "cpu-count");
        assert_eq!(arg.get_env().and_then(|v| v.to_str()), Some("CPU_COUNT"));
        let defaults: Vec<_> = arg
            .get_default_values()
            .iter()
            .filter_map(|v| v.to_str())
            .collect();
        assert_eq!(defaults, vec!["2"]);
    }

    #[test]
    fn test_string_descriptor_to_arg_preserves_default() {
        let descriptor = string_flag("image", "ubuntu-24.04", Some("IMAGE"));

        let arg = descriptor.to_arg().unwrap();
        assert_eq!(arg.get_id().as_str(), "image");
        assert_eq!(arg.get_env().and_then(|v| v.to_str()), Some("IMAGE"));
        let defaults: Vec<_> = arg
            .get_default_values()
            .iter()
            .filter_map(|v| v.to_str())
            .collect();
        assert_eq!(defaults, vec!["ubuntu-24.04"]);
    }

    #[test]
    fn test_string_list_descriptor_to_arg() {
        let descriptor = FlagDescriptor::StringList {
            name: "open-port".to_string(),
            usage: "Ports to open".to_string(),
            env_var: None,
            default: vec!["80/tcp".to_string()],
        };

        let arg = descriptor.to_arg().unwrap();
        assert_eq!(arg.get_id().as_str(), "open-port");
        assert_eq!(
            descriptor
                .default_value()
                .as_ref()
                .and_then(FlagValue::as_list),
            Some(["80/tcp".to_string()].as_slice())
        );
    }

    #[test]
    fn test_unknown_descriptor_is_rejected() {
        let result = FlagDescriptor::Unknown.to_arg();
        assert!(matches!(result, Err(MachinistError::UnsupportedFlagKind)));
    }

    #[test]
    fn test_unknown_wire_kind_deserializes_to_unknown() {
        let raw = r#"{"kind": "float", "name": "ratio", "usage": "x"}"#;
        let descriptor: FlagDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(descriptor, FlagDescriptor::Unknown);
    }

    #[test]
    fn test_descriptor_wire_roundtrip() {
        let descriptor = string_flag("image", "ubuntu-24.04", Some("IMAGE"));
        let wire = serde_json::to_string(&descriptor).unwrap();
        assert!(wire.contains(r#""kind":"string""#));
        let back: FlagDescriptor = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn test_scan_driver_flag_forms() {
        let to_args = |args: &[&str]| args.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(
            scan_driver_flag(&to_args(&["machinist", "create", "--driver", "kvm", "box"])),
            Some("kvm".to_string())
        );
        assert_eq!(
            scan_driver_flag(&to_args(&["machinist", "create", "-d", "kvm", "box"])),
            Some("kvm".to_string())
        );
        assert_eq!(
            scan_driver_flag(&to_args(&["machinist", "create", "--driver=kvm", "box"])),
            Some("kvm".to_string())
        );
        assert_eq!(
            scan_driver_flag(&to_args(&["machinist", "create", "-d=kvm", "box"])),
            Some("kvm".to_string())
        );
        assert_eq!(scan_driver_flag(&to_args(&["machinist", "create", "box"])), None);
        assert_eq!(scan_driver_flag(&to_args(&["machinist", "create", "--driver"])), None);
    }

    #[test]
    fn test_build_create_args_sorted_and_unique() {
        let shared = vec![string_flag("zeta", "", None), string_flag("alpha", "", None)];
        let provider = vec![string_flag("middle", "", None)];

        let args = build_create_args(&shared, &provider).unwrap();
        let names: Vec<_> = args.iter().map(|a| a.get_id().as_str()).collect();
        assert_eq!(names, vec!["alpha", "middle", "zeta"]);
    }

    #[test]
    fn test_build_create_args_rejects_duplicates() {
        let shared = vec![string_flag("image", "", None)];
        let provider = vec![string_flag("image", "", None)];

        let result = build_create_args(&shared, &provider);
        assert!(matches!(
            result,
            Err(MachinistError::DuplicateFlagName(name)) if name == "image"
        ));
    }

    #[test]
    fn test_build_create_args_fails_on_unknown() {
        let provider = vec![string_flag("ok", "", None), FlagDescriptor::Unknown];
        let result = build_create_args(&[], &provider);
        assert!(matches!(result, Err(MachinistError::UnsupportedFlagKind)));
    }

    fn parse(provider: &[FlagDescriptor], argv: &[&str]) -> ArgMatches {
        let args = build_create_args(&[], provider).unwrap();
        let mut cmd = Command::new("create");
        for arg in args {
            cmd = cmd.arg(arg);
        }
        cmd.try_get_matches_from(argv).unwrap()
    }

    #[test]
    fn test_resolve_bundle_seeds_defaults() {
        let provider = vec![
            FlagDescriptor::Bool {
                name: "headless".to_string(),
                usage: "u".to_string(),
                env_var: None,
            },
            FlagDescriptor::Int {
                name: "memory".to_string(),
                usage: "u".to_string(),
                env_var: None,
                default: 1024,
            },
            string_flag("image", "ubuntu-24.04", None),
            FlagDescriptor::StringList {
                name: "open-port".to_string(),
                usage: "u".to_string(),
                env_var: None,
                default: vec!["80/tcp".to_string()],
            },
        ];

        let matches = parse(&provider, &["create"]);
        let bundle = resolve_bundle(&[], &provider, &matches);

        assert_eq!(bundle.len(), 4);
        assert_eq!(bundle.get("headless"), Some(&FlagValue::Bool(false)));
        assert_eq!(bundle.get("memory"), Some(&FlagValue::Int(1024)));
        assert_eq!(bundle.string("image"), Some("ubuntu-24.04"));
        // Untouched lists keep their declared default, not a parser value.
        assert_eq!(
            bundle.get("open-port"),
            Some(&FlagValue::List(vec!["80/tcp".to_string()]))
        );
    }

    #[test]
    fn test_resolve_bundle_overlays_command_line() {
        let provider = vec![
            FlagDescriptor::Bool {
                name: "headless".to_string(),
                usage: "u".to_string(),
                env_var: None,
            },
            FlagDescriptor::Int {
                name: "memory".to_string(),
                usage: "u".to_string(),
                env_var: None,
                default: 1024,
            },
            FlagDescriptor::StringList {
                name: "open-port".to_string(),
                usage: "u".to_string(),
                env_var: None,
                default: vec!["80/tcp".to_string()],
            },
        ];

        let matches = parse(
            &provider,
            &[
                "create",
                "--headless",
                "--memory",
                "4096",
                "--open-port",
                "8080/tcp",
                "--open-port",
                "9090/tcp",
            ],
        );
        let bundle = resolve_bundle(&[], &provider, &matches);

        assert_eq!(bundle.get("headless"), Some(&FlagValue::Bool(true)));
        assert_eq!(bundle.get("memory"), Some(&FlagValue::Int(4096)));
        assert_eq!(
            bundle.get("open-port"),
            Some(&FlagValue::List(vec![
                "8080/tcp".to_string(),
                "9090/tcp".to_string()
            ]))
        );
    }
}
