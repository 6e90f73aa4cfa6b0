//! # SBUS Rover
//!
//! Drive an RC ground vehicle from an SBUS receiver.
//!
//! This application reads the receiver's SBUS stream, drives the steering
//! servo, drive motors and camera pan servo from it, and forces everything to
//! neutral when the radio link drops.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use sbus_rover::actuator::Drivetrain;
use sbus_rover::clock::MonotonicClock;
use sbus_rover::config::{Config, LoggingConfig};
use sbus_rover::control::driver::ControlLoop;
use sbus_rover::serial::SbusSerial;
use sbus_rover::store::{load_or_default, JsonCalibrationStore};
use sbus_rover::telemetry::{slot, TelemetryLogger};

/// Configuration file used when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Daily-rolling diagnostic log file name
const LOG_FILE_NAME: &str = "sbus-rover.log";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log actuator commands instead of driving PWM/GPIO hardware
    #[arg(long)]
    dry_run: bool,
}

/// Set up console logging, plus a file layer when `logging.directory` is set.
///
/// `RUST_LOG` overrides the configured level. The returned guard must live
/// until exit so buffered file output is flushed.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            registry.try_init()?;
            Ok(None)
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Main entry point for the SBUS Rover application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load and validate the configuration
///    - Set up logging
///    - Load the stored steering calibration (defaults if absent)
///    - Open the actuators (simulated with `--dry-run`) and the SBUS port
///    - Start the telemetry logger if enabled
///
/// 2. **Main Loop**
///    - Run the control loop at the configured period (100 Hz by default)
///    - Ctrl+C or SIGTERM flips the stop signal
///
/// 3. **Graceful Shutdown**
///    - Command every actuator to neutral, then release the hardware
///    - Let the telemetry logger drain and exit
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded or is invalid
/// - The SBUS serial port cannot be opened
/// - Actuators fail to open with `allow_degraded = false`
/// - Actuators cannot be brought to neutral during shutdown
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let _log_guard = init_logging(&config.logging).context("Failed to initialize logging")?;

    info!("SBUS Rover v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", cli.config.display());

    let store = JsonCalibrationStore::new(
        &config.calibration.store_path,
        config.calibration.half_range_us,
        config.calibration.trim_min_us..=config.calibration.trim_max_us,
    );
    info!("Calibration store: {}", store.path().display());
    let record = load_or_default(
        &store,
        config.calibration.default_mid_us,
        config.calibration.half_range_us,
    );

    let drivetrain = if cli.dry_run {
        Drivetrain::simulated(&config.actuators, &record)
    } else {
        Drivetrain::from_config(&config.actuators, &record)
    }
    .context("Failed to initialize actuators")?;

    let serial = SbusSerial::open(&config.serial).context("Failed to open SBUS receiver")?;
    info!("SBUS receiver opened at: {}", serial.device_path());

    let mut control = ControlLoop::new(&config, serial, MonotonicClock, store, record, drivetrain);

    let telemetry_task = if config.telemetry.enabled {
        match TelemetryLogger::new(&config.telemetry) {
            Ok(logger) => {
                let (sender, receiver) = slot::latest();
                control = control.with_telemetry(sender);
                Some(tokio::spawn(logger.run(receiver)))
            }
            Err(e) => {
                warn!("Telemetry disabled, cannot use {}: {}", config.telemetry.log_dir, e);
                None
            }
        }
    } else {
        None
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    info!("Press Ctrl+C to exit");
    let result = control.run(stop_rx).await;
    info!("Total ticks: {}", control.tick_count());

    // Dropping the loop closes the telemetry slot
    drop(control);
    if let Some(task) = telemetry_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Telemetry logger failed: {}", e),
            Err(e) => warn!("Telemetry logger task panicked: {}", e),
        }
    }

    result.context("Actuators did not reach neutral during shutdown")?;
    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["sbus-rover"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from(["sbus-rover", "--config", "/etc/rover.toml", "--dry-run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/rover.toml"));
        assert!(cli.dry_run);
    }

    #[test]
    fn test_default_config_file_is_valid() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = Config::load(path).unwrap();
        assert_eq!(config.serial.baud_rate, 100_000);
        assert_eq!(config.safety.failsafe_timeout_ms, 500);
    }
}
