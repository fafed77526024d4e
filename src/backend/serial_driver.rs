//! Real port driver backed by the `serialport` crate
//!
//! `serialport` exposes blocking reads rather than event callbacks, so each
//! open port gets a notification thread that reads with a short timeout,
//! polls the CTS/DSR levels, and raises a [`Notification`] for every chunk of
//! data and every line transition. The thread owns the port; closing the
//! handle stops the thread and joins it, which drops the port.

use crate::backend::driver::{Notification, NotificationHandler, PortHandle, SerialDriver};
use crate::error::{Result, ScopeError};
use crate::types::{ControlLine, EventMask, Parity, PortConfig, PortId};
use serialport::{DataBits, FlowControl, SerialPort, StopBits};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Largest chunk handed to the handler per notification
const READ_CHUNK_SIZE: usize = 4096;

/// Driver for OS serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortDriver;

impl SerialPortDriver {
    pub fn new() -> Self {
        Self
    }
}

fn to_serialport_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

impl SerialDriver for SerialPortDriver {
    fn list_ports(&self) -> Result<Vec<PortId>> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|p| PortId::from(p.port_name))
            .collect())
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

        let serial = serialport::new(port.as_str(), config.baud_rate)
            .data_bits(to_serialport_data_bits(config.data_bits))
            .stop_bits(to_serialport_stop_bits(config.stop_bits))
            .parity(to_serialport_parity(config.parity))
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .open()
            .map_err(|e| ScopeError::open(port.as_str(), e))?;

        tracing::info!("Opened serial port {} at {}", port, config);

        let running = Arc::new(AtomicBool::new(true));
        let idle = Duration::from_millis(config.timeout_ms.max(1));
        let thread = {
            let running = running.clone();
            std::thread::Builder::new()
                .name(format!("serial-notify-{}", port))
                .spawn(move || notification_loop(serial, mask, handler, running, idle))
                .map_err(|e| ScopeError::open(port.as_str(), e))?
        };

        Ok(Box::new(SerialPortHandle {
            port: port.clone(),
            running,
            thread: Some(thread),
        }))
    }
}

/// Tracks the last observed level of a control line
struct LineWatch {
    line: ControlLine,
    level: Option<bool>,
}

impl LineWatch {
    fn new(line: ControlLine) -> Self {
        Self { line, level: None }
    }

    /// Returns a notification when the level differs from the last poll.
    /// The first poll only establishes the baseline.
    fn update(&mut self, asserted: bool) -> Option<Notification> {
        let previous = self.level.replace(asserted);
        match previous {
            Some(prev) if prev != asserted => Some(Notification::LineChanged {
                line: self.line,
                asserted,
            }),
            _ => None,
        }
    }
}

/// What the notification thread needs from an open port
trait PortIo: Send {
    fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    fn line_level(&mut self, line: ControlLine) -> serialport::Result<bool>;
}

impl PortIo for Box<dyn SerialPort> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Read::read(self.as_mut(), buf)
    }

    fn line_level(&mut self, line: ControlLine) -> serialport::Result<bool> {
        match line {
            ControlLine::Cts => self.read_clear_to_send(),
            ControlLine::Dsr => self.read_data_set_ready(),
        }
    }
}

fn notification_loop<P: PortIo>(
    mut port: P,
    mask: EventMask,
    mut handler: NotificationHandler,
    running: Arc<AtomicBool>,
    idle: Duration,
) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut watches: Vec<LineWatch> = [ControlLine::Cts, ControlLine::Dsr]
        .into_iter()
        .filter(|line| mask.watches(*line))
        .map(LineWatch::new)
        .collect();

    tracing::debug!("Notification thread started");

    while running.load(Ordering::SeqCst) {
        if mask.data {
            match port.read_chunk(&mut buf) {
                Ok(0) => {}
                Ok(n) => handler(Notification::DataAvailable(buf[..n].to_vec())),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::error!("Serial read failed: {}", e);
                    handler(Notification::DeliveryFailed(e.to_string()));
                    break;
                }
            }
        } else {
            std::thread::sleep(idle);
        }

        let mut failed = false;
        for watch in &mut watches {
            match port.line_level(watch.line) {
                Ok(asserted) => {
                    if let Some(notification) = watch.update(asserted) {
                        handler(notification);
                    }
                }
                Err(e) => {
                    tracing::error!("Reading {} failed: {}", watch.line, e);
                    handler(Notification::DeliveryFailed(e.to_string()));
                    failed = true;
                    break;
                }
            }
        }
        if failed {
            break;
        }
    }

    tracing::debug!("Notification thread stopped");
}

/// Handle to a port opened by [`SerialPortDriver`]
pub struct SerialPortHandle {
    port: PortId,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PortHandle for SerialPortHandle {
    fn port(&self) -> &PortId {
        &self.port
    }

    fn close(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        // The thread drops the port on exit
        thread
            .join()
            .map_err(|_| ScopeError::close(self.port.as_str(), "notification thread panicked"))?;
        tracing::info!("Closed serial port {}", self.port);
        Ok(())
    }
}

impl Drop for SerialPortHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("{}", e);
        }
    }
}
