//! Smart Parking CLI server
//!
//! Headless reservation and entry-billing server for deployment as a
//! systemd service, container or standalone process.
//!
//! ```sh
//! # Run with default config (~/.config/smart-parking/config.toml)
//! parking-service
//!
//! # Custom config path and port
//! parking-service --config /etc/smart-parking/config.toml --port 8080
//!
//! # Validate config without starting
//! parking-service --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use smart_parking::config::AppConfig;
use smart_parking::server::{init_tracing, ServerHandle, ServerOptions};

/// Smart Parking: slot booking, entry billing and wallets.
#[derive(Parser, Debug)]
#[command(
    name = "parking-service",
    version,
    about = "Reservation and entry-billing server for parking facilities",
    long_about = "Smart Parking REST + WebSocket server.\n\n\
                  Default config: ~/.config/smart-parking/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "PARKING_CONFIG")]
    config: Option<PathBuf>,

    /// Override the REST API listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,

    /// Do not provision demo facilities into an empty store.
    #[arg(long)]
    no_seed: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(smart_parking::default_config_path);

    let (mut config, load_error) = match AppConfig::load(&config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config.logging);

    match load_error {
        None => info!("Configuration loaded from {}", config_path.display()),
        Some(e) => {
            if cli.check {
                error!("Invalid configuration {}: {}", config_path.display(), e);
                return Err(e.into());
            }
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
        }
    }

    if let Some(port) = cli.port {
        info!("CLI override: port = {}", port);
        config.server.port = port;
    }

    if cli.check {
        config.validate()?;
        println!("Configuration is valid");
        println!("   Config file    : {}", config_path.display());
        println!("   API address    : {}", config.server.address());
        println!("   Database       : {}", config.database.url);
        println!("   Log level      : {}", config.logging.level);
        println!("   Entry fee      : {} {}", config.billing.entry_fee, config.billing.currency);
        println!(
            "   Sensor channel : {}",
            config.sensor_feed.url.as_deref().unwrap_or("disabled")
        );
        return Ok(());
    }

    let seed_demo = config.seed.demo_facilities && !cli.no_seed;
    let handle = ServerHandle::start(ServerOptions {
        config,
        auto_migrate: !cli.no_migrate,
        seed_demo,
    })
    .await?;

    handle.install_signal_handler();
    info!("Press Ctrl+C to shutdown gracefully.");

    handle.wait().await;
    Ok(())
}
