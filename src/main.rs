//! machinist - provision and configure container-engine hosts
//!
//! The `create` command's flag surface depends on the selected provider
//! driver, so the driver is resolved from the raw argument list and its
//! schema negotiated before the formal parse; see `machinist::flags`.

use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

use machinist::MachinistError;
use machinist::create::{self, Creator};
use machinist::dirs::MachineDirs;
use machinist::drivers::DriverRegistry;
use machinist::store::FileStore;

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = std::env::args().collect();

    let plugins = DriverRegistry::builtin();
    let ctx = match create::negotiate(&plugins, &argv) {
        Ok(ctx) => ctx,
        Err(MachinistError::Cli(e)) => e.exit(),
        Err(e) => return Err(e.into()),
    };

    init_logging(ctx.verbosity());
    debug!("using driver {:?}", ctx.driver_name);

    let dirs = match ctx.globals.get_one::<String>("storage-path") {
        Some(path) => MachineDirs::with_base(path),
        None => MachineDirs::new(),
    };
    let store = FileStore::new(&dirs);

    Creator::new(&plugins, &store, dirs).run(&ctx).await?;
    Ok(())
}
