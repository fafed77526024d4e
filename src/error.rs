//! Error handling for the serial oscilloscope
//!
//! This module defines the error types and a Result alias used throughout the
//! acquisition core. None of these errors cross the controller boundary: the
//! controller turns them into [`StatusReport`](crate::types::StatusReport)s.

use thiserror::Error;

/// Main error type for acquisition operations
#[derive(Error, Debug)]
pub enum ScopeError {
    /// The port could not be opened (missing, busy, permission denied, bad config)
    #[error("Failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    /// Closing the port failed. The handle is considered released regardless.
    #[error("Failed to close {port}: {reason}")]
    Close { port: String, reason: String },

    /// A frame could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The driver stopped delivering notifications mid-stream
    #[error("Notification delivery failed on {port}: {reason}")]
    NotificationDelivery { port: String, reason: String },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors reported by the serialport crate
    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ScopeError>,
    },
}

impl ScopeError {
    /// Build an [`ScopeError::Open`] for a port
    pub fn open(port: impl Into<String>, reason: impl ToString) -> Self {
        ScopeError::Open {
            port: port.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an [`ScopeError::Close`] for a port
    pub fn close(port: impl Into<String>, reason: impl ToString) -> Self {
        ScopeError::Close {
            port: port.into(),
            reason: reason.to_string(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ScopeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// A frame the active [`FrameFormat`](crate::backend::FrameFormat) could not interpret
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Sync marker did not match
    #[error("bad sync marker {found:02X?}")]
    BadSync { found: [u8; 2] },

    /// Checksum did not match
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Checksum { expected: u8, actual: u8 },

    /// Value decoded but is not a usable number
    #[error("non-finite sample value")]
    NonFinite,

    /// Frame length did not match the format
    #[error("frame length {actual}, expected {expected}")]
    Length { expected: usize, actual: usize },
}

/// Result type alias for acquisition operations
pub type Result<T> = std::result::Result<T, ScopeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_display() {
        let err = ScopeError::open("COM3", "Access denied");
        assert_eq!(err.to_string(), "Failed to open COM3: Access denied");
    }

    #[test]
    fn test_error_with_context() {
        let err = ScopeError::Config("bad baud rate".to_string());
        let with_ctx = err.with_context("Loading config.toml");
        assert!(with_ctx.to_string().contains("Loading config.toml"));
        assert!(with_ctx.to_string().contains("bad baud rate"));
    }

    #[test]
    fn test_checksum_error_display() {
        let err = DecodeError::Checksum {
            expected: 0x1F,
            actual: 0x20,
        };
        assert!(err.to_string().contains("0x1F"));
        assert!(err.to_string().contains("0x20"));
    }
}
