//! The `create` command
//!
//! Sequences the host-creation workflow: argument negotiation (outer
//! pass), fail-fast validation, driver delegation, optional userdata
//! rewriting and persistence. All validation happens before the first
//! remote or persistent mutation; a remote create failure is terminal and
//! surfaces as a structured crash report.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command};
use regex::Regex;
use tokio::fs;
use tracing::{debug, info};

use crate::MachinistError;
use crate::cloudinit;
use crate::crashreport::CrashReport;
use crate::dirs::{MachineDirs, STORAGE_PATH_ENV_VAR};
use crate::drivers::{DriverPlugins, IdentityBlob};
use crate::flags::{self, FlagDescriptor, FlagValue, OptionBundle};
use crate::host::{self, AuthOptions, EngineOptions, HostDescriptor, HostOptions, SwarmOptions};
use crate::store::HostStore;

/// Default engine installation script.
pub const DEFAULT_ENGINE_INSTALL_URL: &str = "https://get.docker.com";

/// Advisory pause after a failed remote create, giving the provider's
/// streamed log output a moment to drain.
const LOG_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// The static flag set every driver shares on `create`.
pub fn shared_create_flags() -> Vec<FlagDescriptor> {
    vec![
        FlagDescriptor::String {
            name: "driver".to_string(),
            usage: "Driver to create machine with".to_string(),
            env_var: Some(flags::DRIVER_ENV_VAR.to_string()),
            default: flags::DEFAULT_DRIVER.to_string(),
        },
        FlagDescriptor::String {
            name: "engine-install-url".to_string(),
            usage: "Custom URL to use for engine installation".to_string(),
            env_var: Some("MACHINIST_ENGINE_INSTALL_URL".to_string()),
            default: DEFAULT_ENGINE_INSTALL_URL.to_string(),
        },
        FlagDescriptor::StringList {
            name: "engine-opt".to_string(),
            usage: "Specify arbitrary flags to include with the created engine in the form flag=value"
                .to_string(),
            env_var: None,
            default: Vec::new(),
        },
        FlagDescriptor::StringList {
            name: "engine-insecure-registry".to_string(),
            usage: "Specify insecure registries to allow with the created engine".to_string(),
            env_var: None,
            default: Vec::new(),
        },
        FlagDescriptor::StringList {
            name: "engine-registry-mirror".to_string(),
            usage: "Specify registry mirrors to use".to_string(),
            env_var: Some("MACHINIST_REGISTRY_MIRROR".to_string()),
            default: Vec::new(),
        },
        FlagDescriptor::StringList {
            name: "engine-label".to_string(),
            usage: "Specify labels for the created engine".to_string(),
            env_var: None,
            default: Vec::new(),
        },
        FlagDescriptor::String {
            name: "engine-storage-driver".to_string(),
            usage: "Specify a storage driver to use with the engine".to_string(),
            env_var: None,
            default: String::new(),
        },
        FlagDescriptor::StringList {
            name: "engine-env".to_string(),
            usage: "Specify environment variables to set in the engine".to_string(),
            env_var: None,
            default: Vec::new(),
        },
        FlagDescriptor::Bool {
            name: "swarm".to_string(),
            usage: "Configure the host to join a swarm cluster".to_string(),
            env_var: None,
        },
        FlagDescriptor::String {
            name: "swarm-image".to_string(),
            usage: "Specify the image to use for swarm".to_string(),
            env_var: Some("MACHINIST_SWARM_IMAGE".to_string()),
            default: "swarm:latest".to_string(),
        },
        FlagDescriptor::Bool {
            name: "swarm-master".to_string(),
            usage: "Configure the host to be a swarm master".to_string(),
            env_var: None,
        },
        FlagDescriptor::String {
            name: "swarm-discovery".to_string(),
            usage: "Discovery service to use with swarm".to_string(),
            env_var: None,
            default: String::new(),
        },
        FlagDescriptor::String {
            name: "swarm-strategy".to_string(),
            usage: "Define a default scheduling strategy for swarm".to_string(),
            env_var: None,
            default: "spread".to_string(),
        },
        FlagDescriptor::StringList {
            name: "swarm-opt".to_string(),
            usage: "Define arbitrary flags for the swarm master".to_string(),
            env_var: None,
            default: Vec::new(),
        },
        FlagDescriptor::StringList {
            name: "swarm-join-opt".to_string(),
            usage: "Define arbitrary flags for swarm join".to_string(),
            env_var: None,
            default: Vec::new(),
        },
        FlagDescriptor::String {
            name: "swarm-host".to_string(),
            usage: "ip/socket to listen on for the swarm master".to_string(),
            env_var: None,
            default: "tcp://0.0.0.0:3376".to_string(),
        },
        FlagDescriptor::String {
            name: "swarm-addr".to_string(),
            usage: "addr to advertise for swarm (default: detect and use the machine IP)"
                .to_string(),
            env_var: None,
            default: String::new(),
        },
        FlagDescriptor::Bool {
            name: "swarm-experimental".to_string(),
            usage: "Enable swarm experimental features".to_string(),
            env_var: None,
        },
        FlagDescriptor::StringList {
            name: "tls-san".to_string(),
            usage: "Support extra SANs for TLS certs".to_string(),
            env_var: None,
            default: Vec::new(),
        },
        FlagDescriptor::String {
            name: "custom-install-script".to_string(),
            usage: "Use a custom provisioning script instead of installing the engine".to_string(),
            env_var: None,
            default: String::new(),
        },
    ]
}

fn root_command() -> Command {
    Command::new("machinist")
        .about("Provision and configure container-engine hosts")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Enable verbose output"),
        )
        .arg(
            Arg::new("storage-path")
                .long("storage-path")
                .env(STORAGE_PATH_ENV_VAR)
                .value_name("PATH")
                .global(true)
                .help("Root directory for machinist state"),
        )
        .arg(
            Arg::new("tls-ca-cert")
                .long("tls-ca-cert")
                .value_name("FILE")
                .global(true)
                .help("CA certificate to verify remotes against"),
        )
        .arg(
            Arg::new("tls-ca-key")
                .long("tls-ca-key")
                .value_name("FILE")
                .global(true)
                .help("Private key used to generate host certificates"),
        )
        .arg(
            Arg::new("tls-client-cert")
                .long("tls-client-cert")
                .value_name("FILE")
                .global(true)
                .help("Client certificate used for TLS authentication"),
        )
        .arg(
            Arg::new("tls-client-key")
                .long("tls-client-key")
                .value_name("FILE")
                .global(true)
                .help("Private key used in client TLS authentication"),
        )
}

/// Build the `create` subcommand with the shared flags plus the given
/// provider flags attached.
pub fn build_create_command(driver_flags: &[FlagDescriptor]) -> Result<Command, MachinistError> {
    let shared = shared_create_flags();
    let args = flags::build_create_args(&shared, driver_flags)?;

    let mut cmd = Command::new("create")
        .about("Create a new host and configure it to run a container engine")
        .arg(
            Arg::new("name")
                .value_name("NAME")
                .num_args(0..)
                .help("Name of the host to create"),
        );
    for arg in args {
        cmd = cmd.arg(arg);
    }
    Ok(cmd.mut_arg("driver", |arg| arg.short('d')))
}

/// Everything the inner pass needs, threaded explicitly from the outer
/// pass; there is no shared mutable state between the two parsing phases.
#[derive(Debug)]
pub struct CreateContext {
    pub driver_name: String,
    pub driver_flags: Vec<FlagDescriptor>,
    /// Root-level matches (storage path, TLS overrides, verbosity).
    pub globals: ArgMatches,
    /// Matches of the `create` subcommand itself.
    pub matches: ArgMatches,
    help: Command,
}

impl CreateContext {
    pub fn verbosity(&self) -> u8 {
        self.globals.get_count("verbose")
    }
}

/// Outer pass: resolve the driver from the raw argument list, fetch its
/// flag schema through a bare handle, and run the formal parser over the
/// full command line.
///
/// The formal parse happens exactly once per process; the process is
/// assumed to run a single command and exit, so no locking guards the
/// assembled command surface.
pub fn negotiate(
    plugins: &dyn DriverPlugins,
    argv: &[String],
) -> Result<CreateContext, MachinistError> {
    let driver_name = flags::resolve_driver_name(argv);
    debug!("negotiating create flags for driver {:?}", driver_name);

    let probe = plugins.new_host(&driver_name, &IdentityBlob::for_flag_lookup())?;
    let driver_flags = probe.create_flags();

    parse_context(driver_name, driver_flags, argv)
}

/// Parse the full command line against the given provider schema. Split
/// out of [`negotiate`] so callers with an already-known schema (tests,
/// shell completion) can skip the plugin round-trip.
pub fn parse_context(
    driver_name: String,
    driver_flags: Vec<FlagDescriptor>,
    argv: &[String],
) -> Result<CreateContext, MachinistError> {
    let create_cmd = build_create_command(&driver_flags)?;
    let cli = root_command().subcommand(create_cmd.clone());

    let globals = cli.try_get_matches_from(argv)?;
    let matches = globals
        .subcommand_matches("create")
        .cloned()
        .ok_or(MachinistError::NoMachineName)?;

    Ok(CreateContext {
        driver_name,
        driver_flags,
        globals,
        matches,
        help: create_cmd,
    })
}

/// The host-creation workflow.
pub struct Creator<'a> {
    plugins: &'a dyn DriverPlugins,
    store: &'a dyn HostStore,
    dirs: MachineDirs,
    settle_delay: Duration,
}

impl<'a> Creator<'a> {
    pub fn new(plugins: &'a dyn DriverPlugins, store: &'a dyn HostStore, dirs: MachineDirs) -> Self {
        Self {
            plugins,
            store,
            dirs,
            settle_delay: LOG_SETTLE_DELAY,
        }
    }

    /// Override the advisory post-failure pause. Tests pass
    /// `Duration::ZERO`; the delay is never a synchronization guarantee.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Run the create workflow for a parsed invocation.
    ///
    /// Fail-fast: every validation step runs before the first remote or
    /// persistent mutation. A store failure after a successful remote
    /// create is surfaced but the remote host is not rolled back.
    pub async fn run(&self, ctx: &CreateContext) -> Result<(), MachinistError> {
        let names: Vec<String> = ctx
            .matches
            .get_many::<String>("name")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();
        if names.len() > 1 {
            return Err(MachinistError::TooManyArguments(names[1..].to_vec()));
        }
        let Some(name) = names.into_iter().next() else {
            ctx.help.clone().print_help()?;
            return Err(MachinistError::NoMachineName);
        };

        if !host::validate_hostname(&name) {
            return Err(MachinistError::InvalidHostname(name));
        }

        let discovery = string_of(&ctx.matches, "swarm-discovery");
        validate_swarm_discovery(&discovery)?;

        let identity = IdentityBlob::new(name.clone(), self.dirs.base.clone());
        let mut handle = self.plugins.new_host(&ctx.driver_name, &identity)?;

        let mut host = HostDescriptor {
            name: name.clone(),
            driver_name: ctx.driver_name.clone(),
            driver_config: serde_json::to_value(&identity)?,
            options: self.host_options(ctx, &name),
        };

        if self.store.exists(&host.name).await? {
            return Err(MachinistError::HostAlreadyExists(host.name));
        }

        let shared = shared_create_flags();
        let mut bundle = flags::resolve_bundle(&shared, &ctx.driver_flags, &ctx.matches);
        let userdata_flag = handle.userdata_flag_name();

        let script = string_of(&ctx.matches, "custom-install-script");
        if !script.is_empty() {
            // The script owns provisioning from here on.
            host.options.custom_install_script = Some(script.clone());
            host.options.auth = None;
            host.options.engine = None;
            host.options.swarm = None;

            if let Some(flag) = &userdata_flag {
                let path = rewrite_userdata(&mut bundle, flag, &script)
                    .await
                    .map_err(|e| MachinistError::UserdataRewriteFailed(Box::new(e)))?;
                debug!("userdata file replaced with {}", path.display());
            }
        }

        handle
            .set_config_from_flags(&bundle)
            .map_err(|e| MachinistError::ConfigurationRejected(e.to_string()))?;

        if let Err(cause) = handle.create().await {
            tokio::time::sleep(self.settle_delay).await;
            return Err(MachinistError::CreateFailed(CrashReport::for_create(
                cause.to_string(),
                ctx.driver_name.clone(),
                self.provider_log_path(&ctx.driver_name, &host.name),
            )));
        }

        self.store
            .save(&host)
            .await
            .map_err(|e| MachinistError::PersistFailed(e.to_string()))?;

        if host.options.custom_install_script.is_none() {
            info!(
                "host {:?} is ready; connect an engine client with the TLS material under {}",
                host.name,
                self.dirs.machine_dir(&host.name).display()
            );
        }

        Ok(())
    }

    fn host_options(&self, ctx: &CreateContext, name: &str) -> HostOptions {
        let matches = &ctx.matches;
        let machine_dir = self.dirs.machine_dir(name);

        HostOptions {
            auth: Some(AuthOptions {
                cert_dir: self.dirs.cert_dir(),
                ca_cert_path: self.tls_path(&ctx.globals, "tls-ca-cert", "ca.pem"),
                ca_private_key_path: self.tls_path(&ctx.globals, "tls-ca-key", "ca-key.pem"),
                client_cert_path: self.tls_path(&ctx.globals, "tls-client-cert", "cert.pem"),
                client_key_path: self.tls_path(&ctx.globals, "tls-client-key", "key.pem"),
                server_cert_path: machine_dir.join("server.pem"),
                server_key_path: machine_dir.join("server-key.pem"),
                store_path: machine_dir,
                server_cert_sans: strings_of(matches, "tls-san"),
            }),
            engine: Some(EngineOptions {
                arbitrary_flags: strings_of(matches, "engine-opt"),
                env: strings_of(matches, "engine-env"),
                insecure_registry: strings_of(matches, "engine-insecure-registry"),
                labels: strings_of(matches, "engine-label"),
                registry_mirror: strings_of(matches, "engine-registry-mirror"),
                storage_driver: string_of(matches, "engine-storage-driver"),
                tls_verify: true,
                install_url: string_of(matches, "engine-install-url"),
            }),
            swarm: Some(SwarmOptions {
                is_swarm: matches.get_flag("swarm") || matches.get_flag("swarm-master"),
                image: string_of(matches, "swarm-image"),
                agent: matches.get_flag("swarm"),
                master: matches.get_flag("swarm-master"),
                discovery: string_of(matches, "swarm-discovery"),
                address: string_of(matches, "swarm-addr"),
                host: string_of(matches, "swarm-host"),
                strategy: string_of(matches, "swarm-strategy"),
                arbitrary_flags: strings_of(matches, "swarm-opt"),
                arbitrary_join_flags: strings_of(matches, "swarm-join-opt"),
                is_experimental: matches.get_flag("swarm-experimental"),
            }),
            custom_install_script: None,
        }
    }

    /// Per-path TLS override, else the conventional name under the
    /// installation certificate directory.
    fn tls_path(&self, globals: &ArgMatches, flag: &str, default_name: &str) -> PathBuf {
        match globals.get_one::<String>(flag) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => self.dirs.cert_dir().join(default_name),
        }
    }

    /// Log artifact a failed provider may have left behind. Only the
    /// virtualbox backend defines one.
    fn provider_log_path(&self, driver_name: &str, name: &str) -> Option<PathBuf> {
        (driver_name == "virtualbox").then(|| {
            self.store
                .machines_dir()
                .join(name)
                .join(name)
                .join("Logs")
                .join("VBox.log")
        })
    }
}

/// Rewrite the userdata flag in `bundle` to point at a fresh document with
/// the install script merged in, returning the new path.
async fn rewrite_userdata(
    bundle: &mut OptionBundle,
    userdata_flag: &str,
    script_path: &str,
) -> Result<PathBuf, MachinistError> {
    let existing = match bundle.string(userdata_flag) {
        Some(path) if !path.is_empty() => Some(fs::read(path).await?),
        _ => None,
    };
    let script = fs::read(script_path).await?;

    let merged_path = cloudinit::write_merged(existing.as_deref(), &script)?;
    bundle.insert(
        userdata_flag,
        FlagValue::String(merged_path.display().to_string()),
    );
    Ok(merged_path)
}

fn discovery_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^:]*://.*").unwrap())
}

/// An empty discovery value is accepted; anything else must look like
/// `scheme://rest-of-uri`.
pub fn validate_swarm_discovery(discovery: &str) -> Result<(), MachinistError> {
    if discovery.is_empty() || discovery_pattern().is_match(discovery) {
        return Ok(());
    }
    Err(MachinistError::InvalidSwarmDiscovery(discovery.to_string()))
}

fn string_of(matches: &ArgMatches, id: &str) -> String {
    matches.get_one::<String>(id).cloned().unwrap_or_default()
}

fn strings_of(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}
