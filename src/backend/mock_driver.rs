//! Simulated port driver
//!
//! Provides a [`SerialDriver`] with a fixed set of fake ports. Tests drive it
//! by injecting notifications directly; with a signal generator enabled
//! (see [`MockDriver::with_signal`]) every open port gets a thread that
//! streams [`ChecksummedFrame`]s carrying a sine wave and toggles CTS/DSR, which
//! is what the binary uses under the `mock-port` feature.
//!
//! # Failure injection
//!
//! - [`MockDriver::set_busy`] - `open` fails as if the port were in use
//! - [`MockDriver::set_close_failure`] - `close` reports an error after releasing
//! - [`MockDriver::set_enumeration_failure`] - `list_ports` fails

use crate::backend::driver::{Notification, NotificationHandler, PortHandle, SerialDriver};
use crate::backend::format::ChecksummedFrame;
use crate::backend::lock;
use crate::error::{Result, ScopeError};
use crate::types::{ControlLine, EventMask, PortConfig, PortId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Settings for the simulated signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockSignal {
    /// Sine frequency in cycles per second
    pub frequency: f64,
    /// Peak voltage
    pub amplitude: f64,
    /// DC offset
    pub offset: f64,
    /// Frames per second
    pub frame_rate: u32,
    /// Toggle CTS/DSR every this many frames (0 = never)
    pub line_toggle_every: u32,
}

impl Default for MockSignal {
    fn default() -> Self {
        Self {
            frequency: 1.0,
            amplitude: 2.5,
            offset: 2.5,
            frame_rate: 100,
            line_toggle_every: 250,
        }
    }
}

struct OpenPort {
    handler: Arc<Mutex<NotificationHandler>>,
    mask: EventMask,
}

#[derive(Default)]
struct MockState {
    ports: Vec<PortId>,
    busy: HashSet<PortId>,
    close_failures: HashSet<PortId>,
    enumeration_fails: bool,
    open: HashMap<PortId, OpenPort>,
    open_log: Vec<PortId>,
    close_log: Vec<PortId>,
}

/// Driver with simulated ports
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
    signal: Option<MockSignal>,
}

impl MockDriver {
    /// Create a driver exposing the given ports
    pub fn new<I, P>(ports: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PortId>,
    {
        let state = MockState {
            ports: ports.into_iter().map(Into::into).collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            signal: None,
        }
    }

    /// Stream a generated signal on every opened port
    pub fn with_signal(mut self, signal: MockSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Make `open` fail for a port as if another process held it
    pub fn set_busy(&self, port: impl Into<PortId>, busy: bool) {
        let port = port.into();
        let mut state = lock(&self.state);
        if busy {
            state.busy.insert(port);
        } else {
            state.busy.remove(&port);
        }
    }

    /// Make `close` report an error for a port (it is still released)
    pub fn set_close_failure(&self, port: impl Into<PortId>, fail: bool) {
        let port = port.into();
        let mut state = lock(&self.state);
        if fail {
            state.close_failures.insert(port);
        } else {
            state.close_failures.remove(&port);
        }
    }

    /// Make `list_ports` fail
    pub fn set_enumeration_failure(&self, fail: bool) {
        lock(&self.state).enumeration_fails = fail;
    }

    /// Deliver a notification to the handler of an open port, on the calling thread
    ///
    /// Returns false if the port is not open or the mask filters the notification.
    pub fn inject(&self, port: &PortId, notification: Notification) -> bool {
        let handler = {
            let state = lock(&self.state);
            match state.open.get(port) {
                Some(open) if accepts(open.mask, &notification) => open.handler.clone(),
                _ => return false,
            }
        };
        let mut guard = lock(&handler);
        (&mut **guard)(notification);
        true
    }

    /// Deliver raw bytes to an open port
    pub fn inject_bytes(&self, port: &PortId, bytes: &[u8]) -> bool {
        self.inject(port, Notification::DataAvailable(bytes.to_vec()))
    }

    /// Whether a port currently has an open handle
    pub fn is_open(&self, port: &PortId) -> bool {
        lock(&self.state).open.contains_key(port)
    }

    /// Number of ports currently open
    pub fn open_count(&self) -> usize {
        lock(&self.state).open.len()
    }

    /// Every successful open, in order
    pub fn open_log(&self) -> Vec<PortId> {
        lock(&self.state).open_log.clone()
    }

    /// Every close, in order
    pub fn close_log(&self) -> Vec<PortId> {
        lock(&self.state).close_log.clone()
    }
}

fn accepts(mask: EventMask, notification: &Notification) -> bool {
    match notification {
        Notification::DataAvailable(_) => mask.data,
        Notification::LineChanged { line, .. } => mask.watches(*line),
        Notification::DeliveryFailed(_) => true,
    }
}

impl SerialDriver for MockDriver {
    fn list_ports(&self) -> Result<Vec<PortId>> {
        let state = lock(&self.state);
        if state.enumeration_fails {
            return Err(ScopeError::Io(std::io::Error::other(
                "simulated enumeration failure",
            )));
        }
        Ok(state.ports.clone())
    }

    fn open(
        &self,
        port: &PortId,
        config: &PortConfig,
        mask: EventMask,
        handler: NotificationHandler,
    ) -> Result<Box<dyn PortHandle>> {
        config
            .validate()
            .map_err(|reason| ScopeError::open(port.as_str(), reason))?;

        let handler = Arc::new(Mutex::new(handler));
        {
            let mut state = lock(&self.state);
            if !state.ports.contains(port) {
                return Err(ScopeError::open(port.as_str(), "no such port"));
            }
            if state.busy.contains(port) || state.open.contains_key(port) {
                return Err(ScopeError::open(port.as_str(), "port busy"));
            }
            state.open.insert(
                port.clone(),
                OpenPort {
                    handler: handler.clone(),
                    mask,
                },
            );
            state.open_log.push(port.clone());
        }
        tracing::info!("Opened simulated port {} at {}", port, config);

        let alive = Arc::new(AtomicBool::new(true));
        let generator = match self.signal {
            Some(signal) => {
                let alive = alive.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!("mock-notify-{}", port))
                    .spawn(move || generate(signal, mask, handler, alive));
                match spawned {
                    Ok(thread) => Some(thread),
                    Err(e) => {
                        lock(&self.state).open.remove(port);
                        return Err(ScopeError::open(port.as_str(), e));
                    }
                }
            }
            None => None,
        };

        Ok(Box::new(MockPortHandle {
            port: port.clone(),
            state: self.state.clone(),
            alive,
            generator,
            closed: false,
        }))
    }
}

fn generate(
    signal: MockSignal,
    mask: EventMask,
    handler: Arc<Mutex<NotificationHandler>>,
    alive: Arc<AtomicBool>,
) {
    let period = Duration::from_secs_f64(1.0 / signal.frame_rate.max(1) as f64);
    let mut counter: u32 = 0;
    let mut level = false;

    while alive.load(Ordering::SeqCst) {
        let t = counter as f64 / signal.frame_rate.max(1) as f64;
        let value = signal.offset
            + signal.amplitude * (2.0 * std::f64::consts::PI * signal.frequency * t).sin();
        let frame = ChecksummedFrame::encode(value as f32, counter as u16, 0);

        {
            let mut guard = lock(&handler);
            if mask.data {
                (&mut **guard)(Notification::DataAvailable(frame.to_vec()));
            }
            if signal.line_toggle_every > 0 && counter % signal.line_toggle_every == 0 {
                level = !level;
                for line in [ControlLine::Cts, ControlLine::Dsr] {
                    if mask.watches(line) {
                        (&mut **guard)(Notification::LineChanged {
                            line,
                            asserted: level,
                        });
                    }
                }
            }
        }

        counter = counter.wrapping_add(1);
        std::thread::sleep(period);
    }
}

/// Handle to a simulated open port
struct MockPortHandle {
    port: PortId,
    state: Arc<Mutex<MockState>>,
    alive: Arc<AtomicBool>,
    generator: Option<JoinHandle<()>>,
    closed: bool,
}

impl PortHandle for MockPortHandle {
    fn port(&self) -> &PortId {
        &self.port
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.alive.store(false, Ordering::SeqCst);
        let joined = match self.generator.take() {
            Some(thread) => thread.join().is_ok(),
            None => true,
        };

        let fail = {
            let mut state = lock(&self.state);
            state.open.remove(&self.port);
            state.close_log.push(self.port.clone());
            state.close_failures.contains(&self.port)
        };
        tracing::info!("Closed simulated port {}", self.port);

        if !joined {
            return Err(ScopeError::close(
                self.port.as_str(),
                "generator thread panicked",
            ));
        }
        if fail {
            return Err(ScopeError::close(
                self.port.as_str(),
                "simulated close failure",
            ));
        }
        Ok(())
    }
}

impl Drop for MockPortHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("{}", e);
        }
    }
}
