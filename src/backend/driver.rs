//! Driver seam
//!
//! A [`SerialDriver`] opens ports and delivers [`Notification`]s to a handler
//! on a thread the driver owns. Both the real `serialport` driver and the
//! simulated one implement this trait, so the session and controller never
//! know which one they are talking to.

use crate::error::Result;
use crate::types::{ControlLine, EventMask, PortConfig, PortId};

/// A single event raised by the driver
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Bytes arrived; the chunk is handed over for decoding and not retained
    DataAvailable(Vec<u8>),
    /// A control line changed level
    LineChanged { line: ControlLine, asserted: bool },
    /// The driver can no longer deliver notifications for this port
    DeliveryFailed(String),
}

/// Callback invoked by the driver, once per notification, on a driver thread
pub type NotificationHandler = Box<dyn FnMut(Notification) + Send + 'static>;

/// Port driver
///
/// Implementations must only deliver notification classes enabled in the
/// [`EventMask`] given to [`open`](SerialDriver::open), and must never invoke
/// the handler again once [`PortHandle::close`] has returned.
#[cfg_attr(test, mockall::automock)]
pub trait SerialDriver: Send + Sync {
    /// Enumerate port identifiers currently known to the system
    fn list_ports(&self) -> Result<Vec<PortId>>;

    /// Open and configure a port, and arm notifications
    ///
    /// Fails with [`ScopeError::Open`](crate::error::ScopeError::Open) if the
    /// port is missing, busy, or rejects the configuration.
    fn open(
        &self,
        port: &PortId,
        config: &PortConfig,
        mask: EventMask,
        handler: NotificationHandler,
    ) -> Result<Box<dyn PortHandle>>;
}

/// Exclusive ownership of an open port
pub trait PortHandle: Send {
    /// The port this handle was opened on
    fn port(&self) -> &PortId;

    /// Stop notifications and release the port
    ///
    /// Must be idempotent. The port is released even when an error is returned.
    fn close(&mut self) -> Result<()>;
}
