//! Acquisition controller
//!
//! The single object the UI talks to. It serializes every open and close
//! behind one mutex and reports every outcome on the status channel instead
//! of returning errors:
//!
//! ```text
//! Idle -> Connecting -> Streaming -> Stopping -> Idle
//!            |              |
//!            +---> Failed <-+        (Failed leaves only through stop)
//! ```
//!
//! The notification handler never takes the controller lock, so closing a
//! session while holding it (which joins the driver thread) cannot deadlock.

use crate::backend::buffer::SampleBuffer;
use crate::backend::catalog::PortCatalog;
use crate::backend::decoder::FrameDecoder;
use crate::backend::driver::SerialDriver;
use crate::backend::lock;
use crate::backend::session::{PortSession, SessionSink};
use crate::config::{AcquisitionConfig, AppConfig};
use crate::types::{AcquisitionState, PortConfig, PortId, Sample, StatsSnapshot, StatusReport};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex};

/// UI side of the status channel
pub struct StatusReceiver {
    receiver: Receiver<StatusReport>,
}

impl StatusReceiver {
    /// Try to receive a single report without blocking
    pub fn try_recv(&self) -> Option<StatusReport> {
        self.receiver.try_recv().ok()
    }

    /// Drain all pending reports
    pub fn drain(&self) -> Vec<StatusReport> {
        self.receiver.try_iter().collect()
    }
}

#[derive(Default)]
struct ControllerInner {
    state: AcquisitionState,
    port: Option<PortId>,
    session: Option<PortSession>,
    /// Port to re-select on the next `service` call
    recover: Option<PortId>,
    reconnect_attempts: u32,
    last_stats: StatsSnapshot,
}

/// Orchestrates port sessions, decoding and the shared sample buffer
pub struct AcquisitionController {
    driver: Arc<dyn SerialDriver>,
    catalog: PortCatalog,
    port_config: PortConfig,
    settings: AcquisitionConfig,
    buffer: Arc<SampleBuffer>,
    status_tx: Sender<StatusReport>,
    inner: Mutex<ControllerInner>,
}

impl AcquisitionController {
    /// Create an idle controller and the receiving end of its status channel
    pub fn new(
        driver: Arc<dyn SerialDriver>,
        port_config: PortConfig,
        settings: AcquisitionConfig,
    ) -> (Self, StatusReceiver) {
        let (status_tx, receiver) = bounded(settings.status_channel_capacity.max(1));
        let controller = Self {
            catalog: PortCatalog::new(driver.clone()),
            driver,
            port_config,
            buffer: Arc::new(SampleBuffer::new(settings.buffer_capacity)),
            settings,
            status_tx,
            inner: Mutex::new(ControllerInner::default()),
        };
        (controller, StatusReceiver { receiver })
    }

    pub fn from_config(driver: Arc<dyn SerialDriver>, config: &AppConfig) -> (Self, StatusReceiver) {
        Self::new(driver, config.port.clone(), config.acquisition.clone())
    }

    /// Available ports, sorted; empty if enumeration fails
    pub fn list_ports(&self) -> Vec<PortId> {
        self.catalog.list()
    }

    /// Switch acquisition to `port`
    ///
    /// Any live session is closed first. The outcome (`Streaming` or
    /// `Failed`) is reported on the status channel.
    pub fn select_port(&self, port: impl Into<PortId>) {
        let port = port.into();
        tracing::info!("Port {} selected", port);

        let mut inner = lock(&self.inner);
        inner.reconnect_attempts = 0;
        inner.recover = None;
        self.connect(&mut inner, port);
    }

    /// Close the live session, if any, and return to `Idle`
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        inner.recover = None;
        self.shutdown(&mut inner, true);
    }

    /// Copy of the most recent samples in arrival order
    pub fn current_samples(&self) -> Vec<Sample> {
        self.buffer.snapshot()
    }

    pub fn latest_sample(&self) -> Option<Sample> {
        self.buffer.latest()
    }

    pub fn state(&self) -> AcquisitionState {
        lock(&self.inner).state
    }

    pub fn active_port(&self) -> Option<PortId> {
        lock(&self.inner).port.clone()
    }

    /// Counters of the live session, or of the last one after it closed
    pub fn stats(&self) -> StatsSnapshot {
        let inner = lock(&self.inner);
        inner
            .session
            .as_ref()
            .map(PortSession::stats)
            .unwrap_or(inner.last_stats)
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Periodic housekeeping, called from the render loop
    ///
    /// Moves a streaming controller whose driver stopped delivering to
    /// `Failed`. With `auto_recover` set, a failed port is closed and
    /// re-selected, at most `max_reconnect_attempts` times per user selection.
    pub fn service(&self) {
        let mut inner = lock(&self.inner);

        if inner.state == AcquisitionState::Streaming {
            let failure = inner.session.as_ref().and_then(PortSession::failure);
            if let Some(reason) = failure {
                tracing::error!(
                    "Session on {:?} failed: {}",
                    inner.port.as_ref().map(PortId::as_str),
                    reason
                );
                self.transition(&mut inner, AcquisitionState::Failed);
                if self.settings.auto_recover {
                    inner.recover = inner.port.clone();
                }
            }
        }

        let Some(port) = inner.recover.take() else {
            return;
        };

        self.shutdown(&mut inner, false);
        if inner.reconnect_attempts >= self.settings.max_reconnect_attempts {
            tracing::warn!("Giving up on {}", port);
            self.report(StatusReport::Warning(format!(
                "Giving up on {} after {} reconnect attempt(s)",
                port, inner.reconnect_attempts
            )));
            return;
        }

        inner.reconnect_attempts += 1;
        self.report(StatusReport::Info(format!(
            "Reconnecting to {} (attempt {}/{})",
            port, inner.reconnect_attempts, self.settings.max_reconnect_attempts
        )));
        self.connect(&mut inner, port.clone());
        if inner.state == AcquisitionState::Failed {
            inner.recover = Some(port);
        }
    }

    fn connect(&self, inner: &mut ControllerInner, port: PortId) {
        self.shutdown(inner, false);
        self.buffer.clear();

        inner.port = Some(port.clone());
        self.transition(inner, AcquisitionState::Connecting);

        let decoder = FrameDecoder::new(self.settings.frame_format.build());
        let sink = SessionSink {
            buffer: self.buffer.clone(),
            status: self.status_tx.clone(),
        };
        match PortSession::open(
            self.driver.as_ref(),
            port,
            self.port_config.clone(),
            self.settings.event_mask,
            decoder,
            sink,
        ) {
            Ok(session) => {
                inner.session = Some(session);
                self.transition(inner, AcquisitionState::Streaming);
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.report(StatusReport::Error(e.to_string()));
                self.transition(inner, AcquisitionState::Failed);
            }
        }
    }

    /// Close the live session and move to `Idle`
    ///
    /// Without a session this only leaves `Failed`; an explicit stop while
    /// already idle reports that and changes nothing.
    fn shutdown(&self, inner: &mut ControllerInner, explicit: bool) {
        let Some(mut session) = inner.session.take() else {
            if inner.state != AcquisitionState::Idle {
                inner.port = None;
                self.transition(inner, AcquisitionState::Idle);
            } else if explicit {
                tracing::debug!("Stop requested while idle");
                self.report(StatusReport::Info("Already stopped".to_string()));
            }
            return;
        };

        self.transition(inner, AcquisitionState::Stopping);
        match session.close() {
            Ok(()) => self.report(StatusReport::Info(format!("Port {} closed", session.port()))),
            Err(e) => {
                tracing::warn!("{}", e);
                self.report(StatusReport::Warning(e.to_string()));
            }
        }
        inner.last_stats = session.stats();
        drop(session);

        inner.port = None;
        self.transition(inner, AcquisitionState::Idle);
    }

    fn transition(&self, inner: &mut ControllerInner, state: AcquisitionState) {
        tracing::debug!("Acquisition state {} -> {}", inner.state, state);
        inner.state = state;
        self.report(StatusReport::State {
            port: inner.port.clone(),
            state,
        });
    }

    fn report(&self, report: StatusReport) {
        match self.status_tx.try_send(report) {
            Ok(()) => {}
            Err(TrySendError::Full(report)) => {
                tracing::debug!("Status channel full, dropped: {}", report);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::driver::{MockSerialDriver, Notification, PortHandle};
    use crate::backend::format::ChecksummedFrame;
    use crate::backend::mock_driver::MockDriver;
    use crate::error::{Result, ScopeError};

    fn settings() -> AcquisitionConfig {
        AcquisitionConfig {
            status_channel_capacity: 256,
            ..Default::default()
        }
    }

    fn states(reports: &[StatusReport]) -> Vec<AcquisitionState> {
        reports
            .iter()
            .filter_map(|r| match r {
                StatusReport::State { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }

    struct FailingHandle {
        port: PortId,
    }

    impl PortHandle for FailingHandle {
        fn port(&self) -> &PortId {
            &self.port
        }

        fn close(&mut self) -> Result<()> {
            Err(ScopeError::close(self.port.as_str(), "device gone"))
        }
    }

    #[test]
    fn test_open_error_ends_in_failed() {
        let mut driver = MockSerialDriver::new();
        driver
            .expect_open()
            .returning(|port, _, _, _| Err(ScopeError::open(port.as_str(), "access denied")));

        let (controller, status) =
            AcquisitionController::new(Arc::new(driver), PortConfig::default(), settings());
        controller.select_port("COM3");

        assert_eq!(controller.state(), AcquisitionState::Failed);
        let reports = status.drain();
        assert_eq!(
            states(&reports),
            vec![AcquisitionState::Connecting, AcquisitionState::Failed]
        );
        assert!(reports
            .iter()
            .any(|r| matches!(r, StatusReport::Error(msg) if msg.contains("access denied"))));

        controller.stop();
        assert_eq!(controller.state(), AcquisitionState::Idle);
        assert_eq!(controller.active_port(), None);
    }

    #[test]
    fn test_close_error_is_reported_and_ends_idle() {
        let mut driver = MockSerialDriver::new();
        driver.expect_open().returning(|port, _, _, _| {
            Ok(Box::new(FailingHandle { port: port.clone() }) as Box<dyn PortHandle>)
        });

        let (controller, status) =
            AcquisitionController::new(Arc::new(driver), PortConfig::default(), settings());
        controller.select_port("COM3");
        assert_eq!(controller.state(), AcquisitionState::Streaming);
        status.drain();

        controller.stop();
        assert_eq!(controller.state(), AcquisitionState::Idle);
        let reports = status.drain();
        assert!(reports
            .iter()
            .any(|r| matches!(r, StatusReport::Warning(msg) if msg.contains("device gone"))));
        assert_eq!(
            states(&reports),
            vec![AcquisitionState::Stopping, AcquisitionState::Idle]
        );
    }

    #[test]
    fn test_stop_twice_is_benign() {
        let driver = MockDriver::new(["COM3"]);
        let (controller, status) =
            AcquisitionController::new(Arc::new(driver.clone()), PortConfig::default(), settings());
        controller.select_port("COM3");
        controller.stop();
        status.drain();

        controller.stop();
        assert_eq!(controller.state(), AcquisitionState::Idle);
        assert_eq!(
            status.drain(),
            vec![StatusReport::Info("Already stopped".to_string())]
        );
        assert_eq!(driver.close_log().len(), 1);
    }

    #[test]
    fn test_samples_survive_stop_and_clear_on_select() {
        let driver = MockDriver::new(["COM3", "COM5"]);
        let (controller, _status) =
            AcquisitionController::new(Arc::new(driver.clone()), PortConfig::default(), settings());
        controller.select_port("COM3");
        driver.inject_bytes(&"COM3".into(), &ChecksummedFrame::encode(2.0, 0, 0));
        controller.stop();
        assert_eq!(controller.current_samples(), vec![Sample::new(0, 2.0)]);
        assert_eq!(controller.stats().samples, 1);

        controller.select_port("COM5");
        assert!(controller.current_samples().is_empty());
    }

    #[test]
    fn test_service_without_auto_recover_stays_failed() {
        let driver = MockDriver::new(["COM3"]);
        let (controller, _status) = AcquisitionController::new(
            Arc::new(driver.clone()),
            PortConfig::default(),
            AcquisitionConfig {
                auto_recover: false,
                ..settings()
            },
        );
        controller.select_port("COM3");
        driver.inject(&"COM3".into(), Notification::DeliveryFailed("unplugged".to_string()));

        controller.service();
        assert_eq!(controller.state(), AcquisitionState::Failed);
        controller.service();
        assert_eq!(controller.state(), AcquisitionState::Failed);
        assert_eq!(driver.open_log().len(), 1);

        controller.stop();
        assert_eq!(controller.state(), AcquisitionState::Idle);
        assert_eq!(driver.open_count(), 0);
    }

    #[test]
    fn test_service_auto_recover_reopens_port() {
        let driver = MockDriver::new(["COM3"]);
        let (controller, _status) = AcquisitionController::new(
            Arc::new(driver.clone()),
            PortConfig::default(),
            AcquisitionConfig {
                auto_recover: true,
                max_reconnect_attempts: 2,
                ..settings()
            },
        );
        controller.select_port("COM3");
        driver.inject(&"COM3".into(), Notification::DeliveryFailed("unplugged".to_string()));

        controller.service();
        assert_eq!(controller.state(), AcquisitionState::Streaming);
        assert_eq!(controller.active_port(), Some(PortId::from("COM3")));
        assert_eq!(driver.open_log().len(), 2);
    }

    #[test]
    fn test_service_gives_up_after_max_attempts() {
        let driver = MockDriver::new(["COM3"]);
        let (controller, status) = AcquisitionController::new(
            Arc::new(driver.clone()),
            PortConfig::default(),
            AcquisitionConfig {
                auto_recover: true,
                max_reconnect_attempts: 2,
                ..settings()
            },
        );
        controller.select_port("COM3");
        driver.set_busy("COM3", true);
        driver.inject(&"COM3".into(), Notification::DeliveryFailed("unplugged".to_string()));

        for _ in 0..5 {
            controller.service();
        }
        assert_eq!(controller.state(), AcquisitionState::Idle);
        assert_eq!(driver.open_log().len(), 1);
        assert!(status
            .drain()
            .iter()
            .any(|r| matches!(r, StatusReport::Warning(msg) if msg.starts_with("Giving up on COM3"))));
    }
}
