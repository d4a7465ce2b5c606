//! # Sensmux Hub Daemon
//!
//! Sensor registry daemon: registers the configured units with their
//! driver backends, opens the configured reporting channel shape, serves
//! the administrative text endpoint and drains the reporting channel
//! until shutdown.
//!
//! # Usage
//!
//! ```bash
//! # Run with a config file
//! sensmux_hub --config config/hub.toml
//!
//! # Verbose logging
//! sensmux_hub --config config/hub.toml -v
//!
//! # JSON logs
//! sensmux_hub --config config/hub.toml --json
//! ```

#![deny(warnings)]

use clap::Parser;
use sensmux_common::config::{ChannelMode, ConfigLoader, HubConfig};
use sensmux_hub::drivers::DriverRegistry;
use sensmux_hub::{OpenTarget, Report, SensorHub};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{Level, debug, error, info};
use tracing_subscriber::EnvFilter;

/// Sensmux Hub - sensor registry with per-unit polling workers
#[derive(Parser, Debug)]
#[command(name = "sensmux_hub")]
#[command(version)]
#[command(about = "Sensor registry and lifecycle engine")]
#[command(long_about = None)]
struct Args {
    /// Path to hub configuration file (hub.toml)
    #[arg(short, long, default_value = "/etc/sensmux/hub.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("hub startup failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("Sensmux Hub v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = HubConfig::load(&args.config)?;
    config.validate()?;
    info!(
        service = %config.shared.service_name,
        sensors = config.sensors.len(),
        channel = ?config.channel,
        "configuration loaded"
    );

    let (hub, reports) = SensorHub::new();
    let hub = Arc::new(hub);

    // Register configured units with their driver backends.
    let backends = DriverRegistry::with_builtins();
    for sensor in &config.sensors {
        let driver = backends.create(&sensor.driver, sensor.kind)?;
        hub.register(&sensor.name, sensor.kind, driver)?;
        hub.write_interval(&sensor.name, sensor.interval_ms)?;
    }

    // Administrative text endpoint.
    let _admin = match &config.admin_listen {
        Some(addr) => Some(sensmux_hub::admin::AdminServer::spawn(
            Arc::clone(&hub),
            addr,
        )?),
        None => None,
    };

    // Shutdown flag driven by SIGINT/SIGTERM.
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("received shutdown signal");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    // Open the configured channel shape so sampling runs.
    match config.channel {
        ChannelMode::Aggregate => hub.open(OpenTarget::Aggregate)?,
        ChannelMode::PerUnit => {
            for sensor in &config.sensors {
                hub.open(OpenTarget::Unit(&sensor.name))?;
            }
        }
    }

    // Drain the reporting channel until shutdown.
    let mut samples: u64 = 0;
    while running.load(Ordering::SeqCst) {
        match reports.recv_timeout(Duration::from_millis(500)) {
            Ok(Report::Sample { unit, sample }) => {
                samples += 1;
                debug!(unit = %unit, x = sample.x, y = sample.y, z = sample.z, "sample");
            }
            Ok(Report::Wake { unit }) => debug!(unit = %unit, "wake"),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(samples, "shutting down");
    hub.shutdown_all();
    info!("Sensmux Hub shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
