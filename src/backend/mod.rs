//! Serial acquisition core
//!
//! This module owns everything between the serial driver and the renderer.
//! Notifications arrive on a driver-owned thread and are decoded in place;
//! the UI thread only ever takes snapshots of the [`SampleBuffer`].
//!
//! # Architecture
//!
//! - [`SerialDriver`] / [`PortHandle`] - Seam to the port driver
//! - [`SerialPortDriver`] - Real driver backed by the `serialport` crate
//! - [`MockDriver`] - Simulated ports for tests and the `mock-port` feature
//! - [`PortCatalog`] - Port enumeration that never fails
//! - [`PortSession`] - Lifecycle of one open port
//! - [`FrameDecoder`] / [`FrameFormat`] - Raw bytes to samples
//! - [`SampleBuffer`] - Bounded ring shared with the renderer
//! - [`AcquisitionController`] - The state machine the UI talks to
//!
//! # Example
//!
//! ```ignore
//! use serial_oscope::backend::{AcquisitionController, SerialPortDriver};
//! use serial_oscope::config::AppConfig;
//! use std::sync::Arc;
//!
//! let config = AppConfig::default();
//! let (controller, status) =
//!     AcquisitionController::from_config(Arc::new(SerialPortDriver::new()), &config);
//!
//! for port in controller.list_ports() {
//!     println!("{}", port);
//! }
//! controller.select_port("COM3");
//!
//! // On every render tick
//! controller.service();
//! let samples = controller.current_samples();
//! for report in status.drain() {
//!     println!("{}", report);
//! }
//! ```

pub mod buffer;
pub mod catalog;
pub mod controller;
pub mod decoder;
pub mod driver;
pub mod format;
pub mod mock_driver;
pub mod serial_driver;
pub mod session;

pub use buffer::{SampleBuffer, DEFAULT_BUFFER_CAPACITY};
pub use catalog::PortCatalog;
pub use controller::{AcquisitionController, StatusReceiver};
pub use decoder::{DecoderEvent, FrameDecoder};
pub use driver::{Notification, NotificationHandler, PortHandle, SerialDriver};
pub use format::{ChecksummedFrame, FrameFormat, FrameFormatKind, RawF32, FRAME_SIZE};
pub use mock_driver::MockDriver;
pub use serial_driver::SerialPortDriver;
pub use session::{PortSession, SessionSink};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section in this module leaves its data consistent, so a
/// poisoned lock carries no broken invariant.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
