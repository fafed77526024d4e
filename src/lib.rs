//! # serial-oscope: live serial port oscilloscope
//!
//! Opens a serial port, listens for asynchronous data and modem line events,
//! decodes the byte stream into voltage samples and renders them as a live
//! line chart.
//!
//! ## Architecture
//!
//! - **Backend**: The acquisition core. A driver-owned thread delivers
//!   notifications straight into a frame decoder and a bounded sample ring
//! - **Frontend**: eframe/egui shell with an egui_plot chart that snapshots
//!   the ring on every frame
//! - **Communication**: A crossbeam channel carries status reports to the UI
//!
//! ## Configuration
//!
//! `config.toml` and `app_state.json` live in the platform data directory
//! under `dev.oscope.serial-oscope` (see [`config`]).
//!
//! ## Example
//!
//! ```ignore
//! use serial_oscope::{
//!     backend::{AcquisitionController, SerialPortDriver},
//!     config::{AppConfig, AppState},
//!     frontend::ScopeApp,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> eframe::Result<()> {
//!     let config = AppConfig::load_or_default();
//!     let app_state = AppState::load_or_default();
//!     let (controller, status) =
//!         AcquisitionController::from_config(Arc::new(SerialPortDriver::new()), &config);
//!
//!     eframe::run_native(
//!         "Serial Oscilloscope",
//!         eframe::NativeOptions::default(),
//!         Box::new(|cc| Ok(Box::new(ScopeApp::new(cc, controller, status, config, app_state)))),
//!     )
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod frontend;
pub mod types;

// Re-export commonly used types
pub use backend::{AcquisitionController, SampleBuffer, StatusReceiver};
pub use config::{AppConfig, AppState};
pub use error::{DecodeError, Result, ScopeError};
pub use frontend::ScopeApp;
pub use types::{AcquisitionState, PortConfig, PortId, Sample, StatusReport};
