//! Port enumeration

use crate::backend::driver::SerialDriver;
use crate::types::PortId;
use std::sync::Arc;

/// Lists available ports through the driver
///
/// An empty list is a valid, displayable state, so enumeration failures are
/// logged and swallowed.
#[derive(Clone)]
pub struct PortCatalog {
    driver: Arc<dyn SerialDriver>,
}

impl PortCatalog {
    pub fn new(driver: Arc<dyn SerialDriver>) -> Self {
        Self { driver }
    }

    /// Sorted, de-duplicated port identifiers; empty on failure
    pub fn list(&self) -> Vec<PortId> {
        match self.driver.list_ports() {
            Ok(mut ports) => {
                ports.sort();
                ports.dedup();
                tracing::debug!("Enumerated {} serial port(s)", ports.len());
                ports
            }
            Err(e) => {
                tracing::warn!("Port enumeration failed: {}", e);
                Vec::new()
            }
        }
    }
}
