//! RGS Server
//!
//! Loads configuration, opens storage, runs the startup RNG self test and
//! serves the HTTP API.

use clap::Parser;
use rgs_core::{
    api::{init_tracing, ApiServer, AppState},
    config::{ConfigLoader, RgsConfig},
    rng::RngEngine,
    services::ServiceContainer,
    storage::open_store,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rgs-server", version, about = "Regulated game outcome and settlement server")]
struct Args {
    /// TOML configuration file; `RGS_*` environment variables override it
    #[arg(short, long, default_value = "rgs.toml")]
    config: PathBuf,

    /// Use the development preset (in-memory storage, debug logging)
    #[arg(long)]
    dev: bool,

    /// Write the selected preset to the config path and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.write_config {
        let preset = if args.dev {
            RgsConfig::development()
        } else {
            RgsConfig::production()
        };
        ConfigLoader::save(&preset, &args.config)?;
        println!("Wrote configuration to {}", args.config.display());
        return Ok(());
    }

    let config = if args.dev {
        RgsConfig::development()
    } else {
        ConfigLoader::new().with_path(&args.config).load()?
    };
    init_tracing(&config.monitoring.log_level);

    info!("Starting RGS core v{}", env!("CARGO_PKG_VERSION"));
    info!("   Storage: {:?} at {}", config.storage.backend, config.storage.data_directory);
    info!("   Currency: {}", config.game.currency);

    let store = open_store(&config.storage)?;
    let rng = Arc::new(RngEngine::os());

    // No play is accepted before the generator passes its self test.
    if config.rng.health_check_on_startup {
        match rng.ensure_healthy() {
            Ok(report) => info!(
                "RNG self test passed: chi-square {:.2} (critical {:.2})",
                report.chi_square, report.critical_value
            ),
            Err(e) => {
                error!("RNG self test failed, refusing to start: {}", e);
                return Err(e.into());
            }
        }
    }

    let services = ServiceContainer::new(config.clone(), store, rng)?;
    let monitor = services.monitor();
    if let Some(interval) = config.health_check_interval() {
        info!("RNG health monitor every {:?}", interval);
        monitor.start(interval);
    }

    let state = Arc::new(AppState::from_services(&services));
    let result = ApiServer::new(config.server.clone(), state).run().await;
    monitor.stop();
    result
}
