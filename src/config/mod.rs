//! Configuration and persisted application state
//!
//! # App Data Location
//!
//! Everything lives in the platform data directory:
//! - **Linux**: `~/.local/share/dev.oscope.serial-oscope/`
//! - **macOS**: `~/Library/Application Support/dev.oscope.serial-oscope/`
//! - **Windows**: `%APPDATA%\dev.oscope.serial-oscope\`
//!
//! # Files
//!
//! - `config.toml` - [`AppConfig`]: port settings, acquisition and UI options
//! - `app_state.json` - [`AppState`]: the last selected port
//! - `logs/` - daily rolling log files
//!
//! Both files are optional; a missing or unreadable file yields defaults.

use crate::backend::{FrameFormatKind, DEFAULT_BUFFER_CAPACITY};
use crate::error::{Result, ResultExt, ScopeError};
use crate::types::{EventMask, PortConfig, PortId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.oscope.serial-oscope";

/// Configuration filename
pub const CONFIG_FILE: &str = "config.toml";

/// App state filename
pub const APP_STATE_FILE: &str = "app_state.json";

/// Log directory name inside the app data directory
pub const LOG_DIR: &str = "logs";

/// Default status channel capacity
pub const DEFAULT_STATUS_CHANNEL_CAPACITY: usize = 256;

/// Default UI repaint interval in milliseconds
pub const DEFAULT_REPAINT_MS: u64 = 33;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir()
        .ok_or_else(|| ScopeError::Config("Could not determine app data directory".to_string()))?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            ScopeError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

pub fn app_state_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(APP_STATE_FILE))
}

// ==================== Configuration ====================

/// Acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Number of samples kept for the chart
    pub buffer_capacity: usize,
    /// Frame layout of the device's byte stream
    pub frame_format: FrameFormatKind,
    /// Notification classes to subscribe to
    pub event_mask: EventMask,
    /// Re-open a port whose driver stopped delivering
    pub auto_recover: bool,
    /// Reconnect attempts per user selection
    pub max_reconnect_attempts: u32,
    /// Pending status reports before new ones are dropped
    pub status_channel_capacity: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            frame_format: FrameFormatKind::default(),
            event_mask: EventMask::ALL,
            auto_recover: true,
            max_reconnect_attempts: 3,
            status_channel_capacity: DEFAULT_STATUS_CHANNEL_CAPACITY,
        }
    }
}

/// Display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Repaint interval while idle, in milliseconds
    pub repaint_ms: u64,
    pub dark_mode: bool,
    /// Chart line width in points
    pub line_width: f32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            repaint_ms: DEFAULT_REPAINT_MS,
            dark_mode: true,
            line_width: 1.5,
        }
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: PortConfig,
    pub acquisition: AcquisitionConfig,
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScopeError::Config(format!("Failed to read config: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ScopeError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ScopeError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ScopeError::Config(format!("Failed to write config: {}", e)))
    }

    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        let path = config_path()
            .ok_or_else(|| ScopeError::Config("Could not determine config path".to_string()))?;

        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path).with_context(|| format!("Loading {}", path.display()))
    }

    /// Load, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(&dir.join(CONFIG_FILE))
    }

    /// Reject settings no port or buffer could use
    pub fn validate(&self) -> Result<()> {
        self.port
            .validate()
            .map_err(|e| ScopeError::Config(format!("Invalid port settings: {}", e)))?;

        if self.acquisition.buffer_capacity == 0 {
            return Err(ScopeError::Config(
                "buffer_capacity must be at least 1".to_string(),
            ));
        }
        if let FrameFormatKind::RawF32 { frame_size } = self.acquisition.frame_format {
            if frame_size < 4 {
                return Err(ScopeError::Config(format!(
                    "raw_f32 frame_size must be at least 4, got {}",
                    frame_size
                )));
            }
        }
        Ok(())
    }
}

// ==================== App State ====================

/// State remembered between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    /// Version for future migration support
    #[serde(default = "default_app_state_version")]
    pub version: u32,

    /// Port selected when the app last exited
    #[serde(default)]
    pub last_port: Option<PortId>,
}

fn default_app_state_version() -> u32 {
    1
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: 1,
            last_port: None,
        }
    }
}

impl AppState {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScopeError::Config(format!("Failed to read app state: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| ScopeError::Config(format!("Failed to parse app state: {}", e)))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ScopeError::Config(format!("Failed to serialize app state: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ScopeError::Config(format!("Failed to write app state: {}", e)))
    }

    /// Load app state from the default location
    pub fn load() -> Result<Self> {
        let path = app_state_path()
            .ok_or_else(|| ScopeError::Config("Could not determine app state path".to_string()))?;

        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load app state, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load app state, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save app state to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(&dir.join(APP_STATE_FILE))
    }

    /// Last port, if it is still among `available`
    pub fn restorable_port<'a>(&self, available: &'a [PortId]) -> Option<&'a PortId> {
        let last = self.last_port.as_ref()?;
        available.iter().find(|p| *p == last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Parity;
    use tempfile::tempdir;

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, PortConfig::default());
        assert_eq!(config.acquisition.buffer_capacity, 1000);
        assert_eq!(config.acquisition.frame_format, FrameFormatKind::Checksummed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_toml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.port.baud_rate = 9600;
        config.port.parity = Parity::Even;
        config.acquisition.frame_format = FrameFormatKind::RawF32 { frame_size: 6 };
        config.ui.dark_mode = false;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "[port]\nbaud_rate = 57600\ndata_bits = 8\nstop_bits = 1\nparity = \"none\"\n",
        )
        .unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.port.baud_rate, 57600);
        assert_eq!(loaded.port.timeout_ms, crate::types::DEFAULT_READ_TIMEOUT_MS);
        assert_eq!(loaded.acquisition, AcquisitionConfig::default());
        assert_eq!(loaded.ui, UiConfig::default());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[acquisition]\nbuffer_capacity = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ScopeError::Config(_))
        ));

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_app_state_json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(APP_STATE_FILE);

        let state = AppState {
            last_port: Some(PortId::from("COM5")),
            ..Default::default()
        };
        state.save_to(&path).unwrap();

        let loaded = AppState::load_from(&path).unwrap();
        assert_eq!(loaded.last_port, Some(PortId::from("COM5")));
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn test_app_state_tolerates_missing_fields() {
        let state: AppState = serde_json::from_str("{}").unwrap();
        assert_eq!(state, AppState::default());
    }

    #[test]
    fn test_restorable_port() {
        let ports = vec![PortId::from("COM3"), PortId::from("COM5")];
        let state = AppState {
            last_port: Some(PortId::from("COM5")),
            ..Default::default()
        };
        assert_eq!(state.restorable_port(&ports), Some(&ports[1]));

        let gone = AppState {
            last_port: Some(PortId::from("COM9")),
            ..Default::default()
        };
        assert_eq!(gone.restorable_port(&ports), None);
        assert_eq!(AppState::default().restorable_port(&ports), None);
    }
}
