//! Serial Oscilloscope - Main Entry Point
//!
//! Plots voltage samples streamed by a device over a serial port.

use anyhow::Context;
use serial_oscope::{
    backend::{AcquisitionController, SerialDriver},
    config::{self, AppConfig, AppState},
    frontend::ScopeApp,
};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const APP_TITLE: &str = "Serial Oscilloscope";

/// Log to stderr and, when the data directory is usable, to a daily file
fn init_logging() -> Option<WorkerGuard> {
    let (file_layer, guard) = match config::ensure_app_data_dir() {
        Ok(dir) => {
            let appender =
                tracing_appender::rolling::daily(dir.join(config::LOG_DIR), "serial-oscope.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,serial_oscope=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

#[cfg(not(feature = "mock-port"))]
fn make_driver() -> Arc<dyn SerialDriver> {
    Arc::new(serial_oscope::backend::SerialPortDriver::new())
}

#[cfg(feature = "mock-port")]
fn make_driver() -> Arc<dyn SerialDriver> {
    use serial_oscope::backend::{mock_driver::MockSignal, MockDriver};

    tracing::info!("Using simulated serial ports");
    Arc::new(MockDriver::new(["SIM0", "SIM1"]).with_signal(MockSignal::default()))
}

fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging();

    tracing::info!("Starting {}", APP_TITLE);

    let config = AppConfig::load_or_default();
    config
        .validate()
        .context("Refusing to start with invalid configuration")?;
    let app_state = AppState::load_or_default();
    tracing::debug!("Port settings: {}", config.port);

    let (controller, status) = AcquisitionController::from_config(make_driver(), &config);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 640.0])
            .with_min_inner_size([640.0, 400.0])
            .with_title(APP_TITLE),
        ..Default::default()
    };

    eframe::run_native(
        APP_TITLE,
        native_options,
        Box::new(move |cc| Ok(Box::new(ScopeApp::new(cc, controller, status, config, app_state)))),
    )
    .map_err(|e| anyhow::anyhow!("UI terminated with an error: {}", e))?;

    tracing::info!("Shutting down...");
    Ok(())
}
