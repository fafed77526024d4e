//! Mock construction helpers

use serial_oscope::backend::{AcquisitionController, ChecksummedFrame, MockDriver, StatusReceiver};
use serial_oscope::config::AcquisitionConfig;
use serial_oscope::types::PortConfig;
use std::sync::Arc;

/// Acquisition settings with a status channel large enough to never drop reports
pub fn test_settings() -> AcquisitionConfig {
    AcquisitionConfig {
        status_channel_capacity: 1024,
        auto_recover: false,
        ..Default::default()
    }
}

/// Controller over a simulated driver exposing `ports`
pub fn create_test_controller(
    ports: &[&str],
    settings: AcquisitionConfig,
) -> (AcquisitionController, StatusReceiver, MockDriver) {
    let driver = MockDriver::new(ports.iter().copied());
    let (controller, status) =
        AcquisitionController::new(Arc::new(driver.clone()), PortConfig::default(), settings);
    (controller, status, driver)
}

/// Concatenated checksummed frames carrying `values`
pub fn encode_frames(values: &[f32]) -> Vec<u8> {
    values
        .iter()
        .enumerate()
        .flat_map(|(i, v)| ChecksummedFrame::encode(*v, i as u16, 0))
        .collect()
}
