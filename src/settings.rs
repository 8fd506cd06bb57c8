use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::ble_common::uuid_from_fields;
use crate::error::OtaError;

/// Largest write the device's data characteristic accepts.
pub const MAX_CHUNK_SIZE: usize = 512;

const CONFIG_DIR_NAME: &str = "partylight-ota";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Tunables for one update attempt.
///
/// Every field has a default matching the shipped firmware, so an empty
/// (or absent) config file is valid. Tests zero the delays.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OtaConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_inter_chunk_delay_ms")]
    pub inter_chunk_delay_ms: u64,
    /// Pause after BEGIN and COMMIT
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Pause after aborting a stale session
    #[serde(default = "default_abort_settle_delay_ms")]
    pub abort_settle_delay_ms: u64,
    /// Read status after every this many chunks
    #[serde(default = "default_status_poll_interval")]
    pub status_poll_interval: usize,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    #[serde(default = "default_service_id")]
    pub service_id: Uuid,
    #[serde(default = "default_control_id")]
    pub control_id: Uuid,
    #[serde(default = "default_data_id")]
    pub data_id: Uuid,
    #[serde(default = "default_status_id")]
    pub status_id: Uuid,

    /// Name fragments (case-insensitive) that mark a device of this family
    /// when no explicit name filter is given.
    #[serde(default = "default_device_markers")]
    pub device_markers: Vec<String>,
}

fn default_chunk_size() -> usize {
    MAX_CHUNK_SIZE
}
fn default_inter_chunk_delay_ms() -> u64 {
    50
}
fn default_settle_delay_ms() -> u64 {
    500
}
fn default_abort_settle_delay_ms() -> u64 {
    1000
}
fn default_status_poll_interval() -> usize {
    20
}
fn default_scan_timeout_ms() -> u64 {
    5000
}
fn default_service_id() -> Uuid {
    uuid_from_fields(0xc6e7a9f0, 0x1b34, 0x4c5d, 0x8f6e, 0x2a3b4c5d6e7f)
}
fn default_control_id() -> Uuid {
    uuid_from_fields(0xd7f8b0e1, 0x2c45, 0x5d6e, 0x9f7a, 0x3b4c5d6e7f80)
}
fn default_data_id() -> Uuid {
    uuid_from_fields(0xe8f9c1d2, 0x3d56, 0x6e7f, 0xa08b, 0x4c5d6e7f8091)
}
fn default_status_id() -> Uuid {
    uuid_from_fields(0xf9d0e2c3, 0x4e67, 0x7f80, 0xb19c, 0x5d6e7f809102)
}
fn default_device_markers() -> Vec<String> {
    vec!["blindomator".to_string(), "esp32".to_string()]
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            inter_chunk_delay_ms: default_inter_chunk_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            abort_settle_delay_ms: default_abort_settle_delay_ms(),
            status_poll_interval: default_status_poll_interval(),
            scan_timeout_ms: default_scan_timeout_ms(),
            service_id: default_service_id(),
            control_id: default_control_id(),
            data_id: default_data_id(),
            status_id: default_status_id(),
            device_markers: default_device_markers(),
        }
    }
}

impl OtaConfig {
    pub fn inter_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.inter_chunk_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn abort_settle_delay(&self) -> Duration {
        Duration::from_millis(self.abort_settle_delay_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    /// Reject values the protocol cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(format!(
                "chunk_size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            ));
        }
        if self.status_poll_interval == 0 {
            return Err("status_poll_interval must be at least 1".to_string());
        }
        Ok(())
    }

    /// Parse a TOML document, filling in defaults for missing keys.
    pub fn from_toml_str(contents: &str) -> Result<Self, String> {
        let config: OtaConfig =
            toml::from_str(contents).map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the per-user config file is
    /// used when present, otherwise the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, OtaError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| OtaError::config(Some(&path), format!("Failed to read: {}", e)))?;
        let config =
            Self::from_toml_str(&contents).map_err(|e| OtaError::config(Some(&path), e))?;
        tlog!("[settings] Loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// `<config_dir>/partylight-ota/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
