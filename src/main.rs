//! # CRSF Bridge
//!
//! Carries a half-duplex CRSF serial link over UDP, so a handset and a
//! transmitter module can sit on opposite ends of a network.
//!
//! Run one instance per side:
//! - next to the handset with the `opaque` profile
//! - next to the transmitter module with the `parsing` profile, which also
//!   decodes and reports telemetry
//!
//! # Examples
//!
//! ```bash
//! crsf-bridge --config config/default.toml --profile opaque
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crsf_bridge::bridge::{Bridge, BridgeProfile, BridgeSettings, StatusReport};
use crsf_bridge::config::{Config, LoggingConfig};
use crsf_bridge::network::UdpTransport;
use crsf_bridge::serial::{self, open_direction_control, HalfDuplexLink};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "crsf-bridge", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Override the bridge profile (opaque or parsing)
    #[arg(short, long, value_parser = parse_profile)]
    profile: Option<BridgeProfile>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

fn parse_profile(value: &str) -> std::result::Result<BridgeProfile, String> {
    match value {
        "opaque" => Ok(BridgeProfile::Opaque),
        "parsing" => Ok(BridgeProfile::Parsing),
        other => Err(format!("unknown profile '{}', expected opaque or parsing", other)),
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// must be kept alive for the file writer to flush.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    let stdout = tracing_subscriber::fmt::layer();

    match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "crsf-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);

            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .with(file)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stdout).init();
            Ok(None)
        }
    }
}

/// Default status sink: counters and connection state, telemetry as JSON
fn log_status(report: &StatusReport) {
    let state = |connected: bool| if connected { "connected" } else { "disconnected" };
    info!(
        "[{}] up {}s | serial {} | network {}",
        report.profile,
        report.uptime_ms / 1000,
        state(report.serial_connected),
        state(report.network_connected),
    );
    info!(
        "serial->net {} B | net->serial {} B | lost {} B | frames {} | errors {}/{}",
        report.stats.serial_rx_bytes,
        report.stats.serial_tx_bytes,
        report.stats.serial_bytes_lost,
        report.stats.frames_parsed,
        report.stats.serial_errors,
        report.stats.network_errors,
    );

    if report.profile == BridgeProfile::Parsing && !report.telemetry.is_empty() {
        match serde_json::to_string(&report.telemetry) {
            Ok(json) => info!("Telemetry: {}", json),
            Err(e) => tracing::warn!("Failed to serialize telemetry: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    if let Some(profile) = args.profile {
        config.bridge.profile = profile;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate().context("Invalid configuration")?;

    let _log_guard = init_logging(&config.logging)?;

    info!("CRSF Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let direction = open_direction_control(&config.direction)
        .context("Failed to set up direction control")?;
    let endpoint = serial::open(&config.serial).context("Failed to open serial port")?;
    let (serial_reader, serial_writer) = endpoint.into_parts();
    let link = HalfDuplexLink::new(Box::new(serial_writer), direction, config.direction.timing())
        .context("Failed to initialize half-duplex link")?;

    let network = UdpTransport::bind(
        config.network.local_port,
        &config.network.remote_host,
        config.network.remote_port,
    )
    .await
    .context("Failed to set up UDP link")?;

    let bridge = Bridge::new(
        BridgeSettings::from_config(&config),
        link,
        serial_reader,
        Arc::new(network),
    );
    bridge.on_status(log_status);
    let handle = bridge.start();

    info!("Press Ctrl+C to exit");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Received Ctrl+C, shutting down...");
    handle.shutdown().await;

    Ok(())
}
