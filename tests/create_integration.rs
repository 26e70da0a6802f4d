//! End-to-end tests for the create workflow against mock collaborators

use std::time::Duration;

use machinist::MachinistError;
use machinist::create::{self, Creator};
use machinist::dirs::MachineDirs;
use machinist::drivers::mock::{MockDriver, MockPlugins};
use machinist::flags::{FlagDescriptor, FlagValue};
use machinist::store::mock::MockStore;

fn to_argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn stub_plugins() -> MockPlugins {
    MockPlugins::new(MockDriver::new().with_name("null-provider"))
}

async fn run_create(
    plugins: &MockPlugins,
    store: &MockStore,
    argv: &[&str],
) -> Result<(), MachinistError> {
    let ctx = create::negotiate(plugins, &to_argv(argv))?;
    Creator::new(plugins, store, MachineDirs::with_base("/tmp/machinist-test"))
        .with_settle_delay(Duration::ZERO)
        .run(&ctx)
        .await
}

#[tokio::test]
async fn test_create_success_saves_descriptor() {
    let plugins = stub_plugins();
    let store = MockStore::new();

    run_create(
        &plugins,
        &store,
        &["machinist", "create", "-d", "null-provider", "box1"],
    )
    .await
    .unwrap();

    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].name, "box1");
    assert_eq!(saved[0].driver_name, "null-provider");
    assert!(saved[0].options.auth.is_some());
    assert!(saved[0].options.engine.is_some());
    assert!(saved[0].options.swarm.is_some());
    assert!(saved[0].options.custom_install_script.is_none());
}

#[tokio::test]
async fn test_create_failure_raises_crash_report_and_saves_nothing() {
    let plugins = MockPlugins::new(
        MockDriver::new()
            .with_name("null-provider")
            .with_create_error("out of capacity"),
    );
    let store = MockStore::new();

    let result = run_create(
        &plugins,
        &store,
        &["machinist", "create", "-d", "null-provider", "box1"],
    )
    .await;

    match result {
        Err(MachinistError::CreateFailed(report)) => {
            assert_eq!(report.driver_name, "null-provider");
            assert_eq!(report.phase, "Create");
            assert!(report.cause.contains("out of capacity"));
            assert!(report.log_file_path.is_none());
        }
        other => panic!("expected CreateFailed, got {other:?}"),
    }
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_virtualbox_failure_points_at_provider_log() {
    let plugins = MockPlugins::new(
        MockDriver::new()
            .with_name("virtualbox")
            .with_create_error("VBoxManage exited 1"),
    );
    let store = MockStore::new().with_machines_dir("/tmp/machinist-test/machines");

    let result = run_create(
        &plugins,
        &store,
        &["machinist", "create", "-d", "virtualbox", "box1"],
    )
    .await;

    match result {
        Err(MachinistError::CreateFailed(report)) => {
            let log = report.log_file_path.expect("virtualbox should have a log path");
            assert!(log.ends_with("box1/box1/Logs/VBox.log"));
        }
        other => panic!("expected CreateFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_name_never_reaches_plugin_boundary() {
    let plugins = stub_plugins();
    let store = MockStore::new();

    // Context built without schema negotiation, so every boundary call the
    // mock records comes from the workflow itself.
    let ctx = create::parse_context(
        "null-provider".to_string(),
        Vec::new(),
        &to_argv(&["machinist", "create"]),
    )
    .unwrap();

    let result = Creator::new(&plugins, &store, MachineDirs::with_base("/tmp/machinist-test"))
        .with_settle_delay(Duration::ZERO)
        .run(&ctx)
        .await;

    assert!(matches!(result, Err(MachinistError::NoMachineName)));
    assert!(plugins.new_host_calls().is_empty());
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_extra_arguments_are_rejected() {
    let plugins = stub_plugins();
    let store = MockStore::new();

    let ctx = create::parse_context(
        "null-provider".to_string(),
        Vec::new(),
        &to_argv(&["machinist", "create", "box1", "box2"]),
    )
    .unwrap();

    let result = Creator::new(&plugins, &store, MachineDirs::with_base("/tmp/machinist-test"))
        .with_settle_delay(Duration::ZERO)
        .run(&ctx)
        .await;

    assert!(matches!(
        result,
        Err(MachinistError::TooManyArguments(extra)) if extra == ["box2"]
    ));
    assert!(plugins.new_host_calls().is_empty());
}

#[tokio::test]
async fn test_invalid_hostname_is_rejected() {
    let plugins = stub_plugins();
    let store = MockStore::new();

    let result = run_create(
        &plugins,
        &store,
        &["machinist", "create", "-d", "null-provider", "bad_name"],
    )
    .await;

    assert!(matches!(result, Err(MachinistError::InvalidHostname(_))));
    // Only the schema-discovery probe touched the boundary.
    assert_eq!(plugins.new_host_calls().len(), 1);
}

#[tokio::test]
async fn test_invalid_swarm_discovery_fails_before_instantiation() {
    let plugins = stub_plugins();
    let store = MockStore::new();

    let result = run_create(
        &plugins,
        &store,
        &[
            "machinist",
            "create",
            "-d",
            "null-provider",
            "--swarm-discovery",
            "not-a-uri",
            "box1",
        ],
    )
    .await;

    assert!(matches!(
        result,
        Err(MachinistError::InvalidSwarmDiscovery(_))
    ));
    assert_eq!(plugins.new_host_calls().len(), 1);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_existing_host_aborts_before_any_mutation() {
    let driver = MockDriver::new().with_name("null-provider");
    let state = driver.state();
    let plugins = MockPlugins::new(driver);
    let store = MockStore::new().with_existing("box1");

    let result = run_create(
        &plugins,
        &store,
        &["machinist", "create", "-d", "null-provider", "box1"],
    )
    .await;

    assert!(matches!(
        result,
        Err(MachinistError::HostAlreadyExists(name)) if name == "box1"
    ));
    assert_eq!(store.save_count(), 0);
    assert_eq!(state.lock().unwrap().create_calls, 0);
}

#[tokio::test]
async fn test_rejected_configuration_stops_before_create() {
    let driver = MockDriver::new()
        .with_name("null-provider")
        .with_config_error("unsupported flag combination");
    let state = driver.state();
    let plugins = MockPlugins::new(driver);
    let store = MockStore::new();

    let result = run_create(
        &plugins,
        &store,
        &["machinist", "create", "-d", "null-provider", "box1"],
    )
    .await;

    assert!(matches!(
        result,
        Err(MachinistError::ConfigurationRejected(_))
    ));
    assert_eq!(state.lock().unwrap().create_calls, 0);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_plugin_failure_surfaces_as_new_host_failed() {
    let plugins = MockPlugins::new(MockDriver::new()).with_new_host_error("plugin crashed");
    let result = create::negotiate(
        &plugins,
        &to_argv(&["machinist", "create", "-d", "null-provider", "box1"]),
    );
    assert!(matches!(result, Err(MachinistError::NewHostFailed(_))));
}

#[tokio::test]
async fn test_driver_receives_defaults_overlaid_with_command_line() {
    let driver = MockDriver::new()
        .with_name("null-provider")
        .with_flags(vec![
            FlagDescriptor::String {
                name: "null-image".to_string(),
                usage: "Image to boot".to_string(),
                env_var: None,
                default: "alpine".to_string(),
            },
            FlagDescriptor::Int {
                name: "null-memory".to_string(),
                usage: "Memory in MB".to_string(),
                env_var: None,
                default: 1024,
            },
        ]);
    let state = driver.state();
    let plugins = MockPlugins::new(driver);
    let store = MockStore::new();

    run_create(
        &plugins,
        &store,
        &[
            "machinist",
            "create",
            "-d",
            "null-provider",
            "--null-image",
            "jammy",
            "box1",
        ],
    )
    .await
    .unwrap();

    let applied = state.lock().unwrap().applied.clone().expect("bundle applied");
    assert_eq!(applied.string("null-image"), Some("jammy"));
    assert_eq!(applied.get("null-memory"), Some(&FlagValue::Int(1024)));
    // Shared flags travel in the same bundle.
    assert_eq!(applied.string("driver"), Some("null-provider"));
    assert_eq!(
        applied.string("engine-install-url"),
        Some(create::DEFAULT_ENGINE_INSTALL_URL)
    );
}

#[tokio::test]
async fn test_swarm_master_implies_swarm_membership() {
    let plugins = stub_plugins();
    let store = MockStore::new();

    run_create(
        &plugins,
        &store,
        &[
            "machinist",
            "create",
            "-d",
            "null-provider",
            "--swarm-master",
            "--swarm-discovery",
            "consul://host:1234",
            "box1",
        ],
    )
    .await
    .unwrap();

    let saved = store.saved();
    let swarm = saved[0].options.swarm.as_ref().expect("swarm options");
    assert!(swarm.is_swarm);
    assert!(swarm.master);
    assert!(!swarm.agent);
    assert_eq!(swarm.discovery, "consul://host:1234");
}

#[tokio::test]
async fn test_persist_failure_is_surfaced_after_create() {
    let driver = MockDriver::new().with_name("null-provider");
    let state = driver.state();
    let plugins = MockPlugins::new(driver);
    let store = MockStore::new().with_save_error("disk full");

    let result = run_create(
        &plugins,
        &store,
        &["machinist", "create", "-d", "null-provider", "box1"],
    )
    .await;

    // The remote host was created; the store failure is reported without
    // attempting a compensating delete.
    assert!(matches!(result, Err(MachinistError::PersistFailed(_))));
    assert_eq!(state.lock().unwrap().create_calls, 1);
}
