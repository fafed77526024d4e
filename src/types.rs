//! Core data types for the serial oscilloscope
//!
//! This module contains the value types shared between the acquisition core
//! and the UI collaborator.
//!
//! # Main Types
//!
//! - [`PortId`] - Opaque identifier of an enumerated serial port
//! - [`PortConfig`] - Line settings applied when a port is opened
//! - [`Sample`] - A single decoded voltage reading
//! - [`LineEvent`] - A CTS/DSR control line transition
//! - [`AcquisitionState`] - Controller state machine states
//! - [`StatusReport`] - Human-readable status channel messages
//!
//! # Statistics
//!
//! [`AcquisitionStats`] holds lock-free counters updated from the driver
//! notification thread; [`StatsSnapshot`] is the copy the status bar renders.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default baud rate for the connected device
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default driver read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10;

/// Identifier of a serial port as reported by the OS (e.g. `COM3`, `/dev/ttyUSB0`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(String);

impl PortId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PortId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Parity setting for serial port configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Parity::None => write!(f, "N"),
            Parity::Odd => write!(f, "O"),
            Parity::Even => write!(f, "E"),
        }
    }
}

/// Line settings applied when a port is opened
///
/// Immutable for the lifetime of a session; a new selection picks up changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Baud rate in bits per second
    pub baud_rate: u32,
    /// Data bits per character (5-8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: Parity,
    /// Read timeout used by the driver's notification thread
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl PortConfig {
    /// Check that the settings are ones a UART can actually use
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.baud_rate == 0 {
            return Err("baud rate must be non-zero".to_string());
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(format!("unsupported data bits: {}", self.data_bits));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(format!("unsupported stop bits: {}", self.stop_bits));
        }
        Ok(())
    }
}

impl std::fmt::Display for PortConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate, self.data_bits, self.parity, self.stop_bits
        )
    }
}

/// Which notification classes a session subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMask {
    /// Data-available notifications
    pub data: bool,
    /// CTS line changes
    pub cts: bool,
    /// DSR line changes
    pub dsr: bool,
}

impl EventMask {
    pub const ALL: EventMask = EventMask {
        data: true,
        cts: true,
        dsr: true,
    };

    pub const DATA_ONLY: EventMask = EventMask {
        data: true,
        cts: false,
        dsr: false,
    };

    /// Whether changes on this control line are subscribed
    pub fn watches(&self, line: ControlLine) -> bool {
        match line {
            ControlLine::Cts => self.cts,
            ControlLine::Dsr => self.dsr,
        }
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// A single decoded sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Monotonic sequence number within the session
    pub tick: u64,
    /// Voltage
    pub value: f64,
}

impl Sample {
    pub fn new(tick: u64, value: f64) -> Self {
        Self { tick, value }
    }

    /// `[x, y]` pair for plotting
    pub fn as_plot_point(&self) -> [f64; 2] {
        [self.tick as f64, self.value]
    }
}

/// Modem control lines the session can watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlLine {
    /// Clear To Send
    Cts,
    /// Data Set Ready
    Dsr,
}

impl std::fmt::Display for ControlLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlLine::Cts => write!(f, "CTS"),
            ControlLine::Dsr => write!(f, "DSR"),
        }
    }
}

/// Level of a control line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineState {
    On,
    Off,
}

impl From<bool> for LineState {
    fn from(asserted: bool) -> Self {
        if asserted {
            LineState::On
        } else {
            LineState::Off
        }
    }
}

impl std::fmt::Display for LineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineState::On => write!(f, "ON"),
            LineState::Off => write!(f, "OFF"),
        }
    }
}

/// A control line transition, as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEvent {
    pub line: ControlLine,
    pub state: LineState,
    /// Sample tick at which the transition was observed
    pub tick: u64,
}

impl std::fmt::Display for LineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.line, self.state)
    }
}

/// Lifecycle status of a single port session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Opening,
    Open,
    Closing,
    Closed,
    Failed(String),
}

/// Acquisition controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    /// No session
    #[default]
    Idle,
    /// Open in progress
    Connecting,
    /// Session open, decoder active
    Streaming,
    /// Close in progress
    Stopping,
    /// Unrecoverable I/O error; only `stop()` leaves this state
    Failed,
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionState::Idle => write!(f, "Idle"),
            AcquisitionState::Connecting => write!(f, "Connecting"),
            AcquisitionState::Streaming => write!(f, "Streaming"),
            AcquisitionState::Stopping => write!(f, "Stopping"),
            AcquisitionState::Failed => write!(f, "Failed"),
        }
    }
}

/// Severity of a status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Message on the status channel
///
/// The `Display` impl is the text shown in the status bar.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    /// Controller changed state
    State {
        port: Option<PortId>,
        state: AcquisitionState,
    },
    /// Control line changed on the active port
    Line { port: PortId, event: LineEvent },
    Info(String),
    Warning(String),
    Error(String),
}

impl StatusReport {
    pub fn level(&self) -> StatusLevel {
        match self {
            StatusReport::State {
                state: AcquisitionState::Failed,
                ..
            } => StatusLevel::Error,
            StatusReport::Warning(_) => StatusLevel::Warning,
            StatusReport::Error(_) => StatusLevel::Error,
            _ => StatusLevel::Info,
        }
    }
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusReport::State { port, state } => {
                let port = port.as_ref().map(PortId::as_str).unwrap_or("no port");
                match state {
                    AcquisitionState::Idle => write!(f, "Idle"),
                    AcquisitionState::Connecting => write!(f, "Opening port: {}", port),
                    AcquisitionState::Streaming => write!(f, "Streaming from {}", port),
                    AcquisitionState::Stopping => write!(f, "Closing port: {}", port),
                    AcquisitionState::Failed => write!(f, "Port {} failed", port),
                }
            }
            StatusReport::Line { port, event } => write!(f, "{}: {}", port, event),
            StatusReport::Info(msg) | StatusReport::Warning(msg) | StatusReport::Error(msg) => {
                f.write_str(msg)
            }
        }
    }
}

/// Per-session counters, written from the driver notification thread
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    samples: AtomicU64,
    bytes: AtomicU64,
    decode_errors: AtomicU64,
    line_events: AtomicU64,
    dropped_reports: AtomicU64,
}

impl AcquisitionStats {
    pub fn record_bytes(&self, count: usize) {
        self.bytes.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_sample(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_line_event(&self) {
        self.line_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_report(&self) {
        self.dropped_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples: self.samples.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            line_events: self.line_events.load(Ordering::Relaxed),
            dropped_reports: self.dropped_reports.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`AcquisitionStats`] for display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Samples decoded
    pub samples: u64,
    /// Raw bytes received
    pub bytes: u64,
    /// Malformed frames discarded
    pub decode_errors: u64,
    /// Control line transitions
    pub line_events: u64,
    /// Status reports dropped because the channel was full
    pub dropped_reports: u64,
}
