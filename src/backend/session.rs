//! Port session lifecycle
//!
//! A [`PortSession`] owns the handle of one open port. Opening it builds the
//! notification handler that runs on the driver thread: the handler owns the
//! [`FrameDecoder`], pushes samples into the shared [`SampleBuffer`] and posts
//! status reports without ever blocking.
//!
//! The handler and the session share a liveness flag. Closing clears it
//! before releasing the handle, so a notification already in flight returns
//! without touching the buffer.

use crate::backend::buffer::SampleBuffer;
use crate::backend::decoder::{DecoderEvent, FrameDecoder};
use crate::backend::driver::{Notification, NotificationHandler, PortHandle, SerialDriver};
use crate::backend::lock;
use crate::error::{Result, ScopeError};
use crate::types::{
    AcquisitionStats, EventMask, PortConfig, PortId, SessionStatus, StatsSnapshot, StatusReport,
};
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Where a session's handler delivers its output
#[derive(Clone)]
pub struct SessionSink {
    pub buffer: Arc<SampleBuffer>,
    pub status: Sender<StatusReport>,
}

/// State shared between the session and its notification handler
#[derive(Debug, Default)]
struct SessionShared {
    alive: AtomicBool,
    failure: Mutex<Option<String>>,
    stats: AcquisitionStats,
}

impl SessionShared {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn mark_failed(&self, reason: String) {
        let mut failure = lock(&self.failure);
        if failure.is_none() {
            *failure = Some(reason);
        }
    }

    fn report(&self, status: &Sender<StatusReport>, report: StatusReport) {
        if let Err(TrySendError::Full(_)) = status.try_send(report) {
            self.stats.record_dropped_report();
        }
    }
}

/// One open port
pub struct PortSession {
    port: PortId,
    config: PortConfig,
    status: SessionStatus,
    handle: Option<Box<dyn PortHandle>>,
    shared: Arc<SessionShared>,
}

impl PortSession {
    /// Open `port`, arm the notifications in `mask`, and start decoding into `sink`
    pub fn open(
        driver: &dyn SerialDriver,
        port: PortId,
        config: PortConfig,
        mask: EventMask,
        decoder: FrameDecoder,
        sink: SessionSink,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|reason| ScopeError::open(port.as_str(), reason))?;

        tracing::debug!(
            "Opening session on {} ({}, {:?}, {:?})",
            port,
            config,
            mask,
            decoder
        );

        let shared = Arc::new(SessionShared::default());
        // Live before the driver can deliver the first notification
        shared.alive.store(true, Ordering::SeqCst);
        let handler = notification_handler(port.clone(), decoder, sink, shared.clone());

        let mut session = Self {
            port,
            config,
            status: SessionStatus::Opening,
            handle: None,
            shared,
        };

        match driver.open(&session.port, &session.config, mask, handler) {
            Ok(handle) => {
                session.handle = Some(handle);
                session.status = SessionStatus::Open;
            }
            Err(e) => {
                session.shared.alive.store(false, Ordering::SeqCst);
                session.status = SessionStatus::Failed(e.to_string());
                return Err(match e {
                    ScopeError::Open { .. } => e,
                    other => ScopeError::open(session.port.as_str(), other),
                });
            }
        }

        tracing::info!("Session open on {}", session.port);
        Ok(session)
    }

    /// Release the port
    ///
    /// Idempotent. The handle is released even when the driver reports an
    /// error, which is returned as [`ScopeError::Close`].
    pub fn close(&mut self) -> Result<()> {
        self.shared.alive.store(false, Ordering::SeqCst);

        let Some(mut handle) = self.handle.take() else {
            self.status = SessionStatus::Closed;
            return Ok(());
        };

        self.status = SessionStatus::Closing;
        let result = handle.close();
        drop(handle);
        self.status = SessionStatus::Closed;

        match result {
            Ok(()) => {
                tracing::info!("Session closed on {}", self.port);
                Ok(())
            }
            Err(e @ ScopeError::Close { .. }) => Err(e),
            Err(other) => Err(ScopeError::close(self.port.as_str(), other)),
        }
    }

    pub fn port(&self) -> &PortId {
        &self.port
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Current status; a delivery failure reported by the driver shows as `Failed`
    pub fn status(&self) -> SessionStatus {
        if self.status == SessionStatus::Open {
            if let Some(reason) = self.failure() {
                return SessionStatus::Failed(reason);
            }
        }
        self.status.clone()
    }

    /// Reason the driver stopped delivering notifications, if it did
    pub fn failure(&self) -> Option<String> {
        lock(&self.shared.failure).clone()
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for PortSession {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                tracing::warn!("{}", e);
            }
        }
    }
}

impl std::fmt::Debug for PortSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSession")
            .field("port", &self.port)
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

/// Build the callback the driver invokes on its own thread
fn notification_handler(
    port: PortId,
    mut decoder: FrameDecoder,
    sink: SessionSink,
    shared: Arc<SessionShared>,
) -> NotificationHandler {
    Box::new(move |notification: Notification| {
        if !shared.is_alive() {
            tracing::trace!("Dropping notification for closed session on {}", port);
            return;
        }

        if let Notification::DataAvailable(chunk) = &notification {
            shared.stats.record_bytes(chunk.len());
        }

        for event in decoder.handle(notification) {
            match event {
                DecoderEvent::Sample(sample) => {
                    sink.buffer.push(sample);
                    shared.stats.record_sample();
                }
                DecoderEvent::Line(event) => {
                    shared.stats.record_line_event();
                    tracing::debug!("{}: {}", port, event);
                    shared.report(
                        &sink.status,
                        StatusReport::Line {
                            port: port.clone(),
                            event,
                        },
                    );
                }
                DecoderEvent::Malformed(e) => {
                    shared.stats.record_decode_error();
                    tracing::warn!("{}: dropped malformed frame: {}", port, e);
                    shared.report(
                        &sink.status,
                        StatusReport::Warning(format!("{}: dropped malformed frame ({})", port, e)),
                    );
                }
                DecoderEvent::DeliveryFailed(reason) => {
                    let err = ScopeError::NotificationDelivery {
                        port: port.to_string(),
                        reason: reason.clone(),
                    };
                    tracing::error!("{}", err);
                    shared.mark_failed(reason);
                    shared.report(&sink.status, StatusReport::Error(err.to_string()));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::format::ChecksummedFrame;
    use crate::backend::mock_driver::MockDriver;
    use crossbeam_channel::{bounded, Receiver};

    fn open_session(
        driver: &MockDriver,
        port: &str,
    ) -> (Result<PortSession>, Arc<SampleBuffer>, Receiver<StatusReport>) {
        let buffer = Arc::new(SampleBuffer::new(16));
        let (tx, rx) = bounded(64);
        let sink = SessionSink {
            buffer: buffer.clone(),
            status: tx,
        };
        let session = PortSession::open(
            driver,
            port.into(),
            PortConfig::default(),
            EventMask::ALL,
            FrameDecoder::new(Box::new(ChecksummedFrame)),
            sink,
        );
        (session, buffer, rx)
    }

    #[test]
    fn test_open_decode_close() {
        let driver = MockDriver::new(["COM3"]);
        let (session, buffer, _rx) = open_session(&driver, "COM3");
        let mut session = session.unwrap();
        assert_eq!(session.status(), SessionStatus::Open);

        let port = PortId::from("COM3");
        driver.inject_bytes(&port, &ChecksummedFrame::encode(1.5, 0, 0));
        assert_eq!(buffer.len(), 1);
        assert_eq!(session.stats().bytes, 10);

        session.close().unwrap();
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(!driver.is_open(&port));
        // Second close is a no-op
        session.close().unwrap();
        assert_eq!(driver.close_log().len(), 1);
    }

    /// Delivers one frame from inside `open`, before returning the handle
    struct EagerDriver;

    struct NoopHandle(PortId);

    impl PortHandle for NoopHandle {
        fn port(&self) -> &PortId {
            &self.0
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    impl SerialDriver for EagerDriver {
        fn list_ports(&self) -> Result<Vec<PortId>> {
            Ok(vec![PortId::from("COM3")])
        }

        fn open(
            &self,
            port: &PortId,
            _config: &PortConfig,
            _mask: EventMask,
            mut handler: NotificationHandler,
        ) -> Result<Box<dyn PortHandle>> {
            handler(Notification::DataAvailable(
                ChecksummedFrame::encode(2.5, 0, 0).to_vec(),
            ));
            Ok(Box::new(NoopHandle(port.clone())))
        }
    }

    #[test]
    fn test_notifications_while_opening_are_kept() {
        let buffer = Arc::new(SampleBuffer::new(16));
        let (tx, _rx) = bounded(8);
        let session = PortSession::open(
            &EagerDriver,
            "COM3".into(),
            PortConfig::default(),
            EventMask::ALL,
            FrameDecoder::new(Box::new(ChecksummedFrame)),
            SessionSink {
                buffer: buffer.clone(),
                status: tx,
            },
        )
        .unwrap();

        assert_eq!(session.status(), SessionStatus::Open);
        assert!(session.is_open());
        assert_eq!(buffer.latest().map(|s| s.value), Some(2.5));
    }

    #[test]
    fn test_open_failure_is_open_error() {
        let driver = MockDriver::new(["COM3"]);
        driver.set_busy("COM3", true);
        let (session, _, _) = open_session(&driver, "COM3");
        assert!(matches!(session, Err(ScopeError::Open { .. })));
    }

    #[test]
    fn test_in_flight_notification_after_close_is_ignored() {
        let driver = MockDriver::new(["COM3"]);
        let buffer = Arc::new(SampleBuffer::new(16));
        let (tx, _rx) = bounded(8);
        let shared = Arc::new(SessionShared::default());
        let mut handler = notification_handler(
            "COM3".into(),
            FrameDecoder::new(Box::new(ChecksummedFrame)),
            SessionSink {
                buffer: buffer.clone(),
                status: tx,
            },
            shared.clone(),
        );

        // Never marked alive: behaves like a session that has already closed
        handler(Notification::DataAvailable(
            ChecksummedFrame::encode(1.0, 0, 0).to_vec(),
        ));
        assert!(buffer.is_empty());
        assert_eq!(driver.open_count(), 0);
    }

    #[test]
    fn test_delivery_failure_marks_session_failed() {
        let driver = MockDriver::new(["COM3"]);
        let (session, _, rx) = open_session(&driver, "COM3");
        let session = session.unwrap();

        driver.inject(
            &"COM3".into(),
            Notification::DeliveryFailed("device unplugged".to_string()),
        );
        assert_eq!(
            session.status(),
            SessionStatus::Failed("device unplugged".to_string())
        );
        let reports: Vec<_> = rx.try_iter().collect();
        assert!(reports
            .iter()
            .any(|r| matches!(r, StatusReport::Error(msg) if msg.contains("device unplugged"))));
    }

    #[test]
    fn test_drop_releases_handle() {
        let driver = MockDriver::new(["COM3"]);
        let (session, _, _) = open_session(&driver, "COM3");
        drop(session);
        assert_eq!(driver.open_count(), 0);
    }

    #[test]
    fn test_full_status_channel_counts_dropped_reports() {
        let driver = MockDriver::new(["COM3"]);
        let buffer = Arc::new(SampleBuffer::new(16));
        let (tx, _rx) = bounded(1);
        let session = PortSession::open(
            &driver,
            "COM3".into(),
            PortConfig::default(),
            EventMask::ALL,
            FrameDecoder::new(Box::new(ChecksummedFrame)),
            SessionSink { buffer, status: tx },
        )
        .unwrap();

        let port = PortId::from("COM3");
        for asserted in [true, false, true] {
            driver.inject(
                &port,
                Notification::LineChanged {
                    line: crate::types::ControlLine::Cts,
                    asserted,
                },
            );
        }
        let stats = session.stats();
        assert_eq!(stats.line_events, 3);
        assert_eq!(stats.dropped_reports, 2);
    }
}
