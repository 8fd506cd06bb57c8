// Error taxonomy for an update attempt.
//
// Every variant is terminal: nothing in the crate retries an attempt. The
// CLI prints the Display form and exits non-zero.

use crate::ota::OtaPhase;
use crate::transport::TransportError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum OtaError {
    /// Missing or contradictory command-line arguments
    Usage(String),
    /// Firmware path does not resolve to a readable file
    FirmwareNotFound { path: PathBuf, reason: String },
    /// Firmware file exists but holds no bytes
    EmptyFirmware { path: PathBuf },
    /// Configuration file unreadable or invalid
    Config { path: Option<PathBuf>, reason: String },
    /// BLE manager or adapter could not be initialised
    AdapterUnavailable(String),
    /// Scan ended without a matching peer; `seen` lists every named peer observed
    DeviceNotFound { seen: Vec<String> },
    ConnectionFailed { peer: String, source: TransportError },
    ServiceNotSupported { peer: String },
    /// Device reported ERROR right after BEGIN
    BeginRejected,
    /// Chunk write failed or a status poll reported ERROR mid-transfer
    TransferError { chunks_sent: usize, reason: String },
    /// Device reported ERROR after COMMIT
    CommitFailed,
    /// Transport failure outside the transfer loop
    Transport { phase: OtaPhase, source: TransportError },
}

impl OtaError {
    pub fn usage(msg: impl Into<String>) -> Self {
        OtaError::Usage(msg.into())
    }

    pub fn firmware_not_found(path: &Path, reason: impl fmt::Display) -> Self {
        OtaError::FirmwareNotFound {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn config(path: Option<&Path>, reason: impl Into<String>) -> Self {
        OtaError::Config {
            path: path.map(Path::to_path_buf),
            reason: reason.into(),
        }
    }

    pub fn transfer(chunks_sent: usize, reason: impl fmt::Display) -> Self {
        OtaError::TransferError {
            chunks_sent,
            reason: reason.to_string(),
        }
    }

    pub fn transport(phase: OtaPhase, source: TransportError) -> Self {
        OtaError::Transport { phase, source }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            OtaError::Usage(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaError::Usage(msg) => write!(f, "Usage error: {}", msg),
            OtaError::FirmwareNotFound { path, reason } => {
                write!(f, "Firmware file not found: {} ({})", path.display(), reason)
            }
            OtaError::EmptyFirmware { path } => {
                write!(f, "Firmware file is empty: {}", path.display())
            }
            OtaError::Config { path: Some(path), reason } => {
                write!(f, "Invalid configuration {}: {}", path.display(), reason)
            }
            OtaError::Config { path: None, reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
            OtaError::AdapterUnavailable(msg) => write!(f, "Bluetooth unavailable: {}", msg),
            OtaError::DeviceNotFound { seen } => {
                write!(f, "Device not found. Available devices: {:?}", seen)
            }
            OtaError::ConnectionFailed { peer, source } => {
                write!(f, "Failed to connect to {}: {}", peer, source)
            }
            OtaError::ServiceNotSupported { peer } => write!(
                f,
                "OTA service not found on {}. Device may not support OTA updates.",
                peer
            ),
            OtaError::BeginRejected => write!(f, "Device rejected OTA begin"),
            OtaError::TransferError {
                chunks_sent,
                reason,
            } => write!(f, "OTA transfer failed after {} chunks: {}", chunks_sent, reason),
            OtaError::CommitFailed => write!(f, "Device reported an error after commit"),
            OtaError::Transport { phase, source } => {
                write!(f, "Transport error during {}: {}", phase, source)
            }
        }
    }
}

impl std::error::Error for OtaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OtaError::ConnectionFailed { source, .. } | OtaError::Transport { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}
