// OTA protocol over the Partylight GATT service.
//
// Control characteristic (write): 0x01 = begin, 0x02 = commit, 0x03 = abort
// Data characteristic (write):    raw firmware bytes, <= 512 per write
// Status characteristic (read):   0x00 idle, 0x01 in progress, 0x02 success, 0x03 error

pub mod chunker;
pub mod controller;
pub mod selector;

use std::fmt;

pub use chunker::{chunks, total_chunks, Chunk, Chunks};
pub use controller::{OtaController, UpdateOutcome};
pub use selector::{pick_peer, select_peer};

// ============================================================================
// Wire values
// ============================================================================

/// Status byte reported by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtaStatus {
    Idle,
    InProgress,
    Success,
    Error,
    Unknown(u8),
}

impl OtaStatus {
    pub fn from_byte(code: u8) -> Self {
        match code {
            0x00 => OtaStatus::Idle,
            0x01 => OtaStatus::InProgress,
            0x02 => OtaStatus::Success,
            0x03 => OtaStatus::Error,
            other => OtaStatus::Unknown(other),
        }
    }

    /// Decode a status read. Only the first byte counts; empty reads as idle.
    pub fn decode(value: &[u8]) -> Self {
        Self::from_byte(value.first().copied().unwrap_or(0x00))
    }
}

impl fmt::Display for OtaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaStatus::Idle => write!(f, "IDLE"),
            OtaStatus::InProgress => write!(f, "IN_PROGRESS"),
            OtaStatus::Success => write!(f, "SUCCESS"),
            OtaStatus::Error => write!(f, "ERROR"),
            OtaStatus::Unknown(code) => write!(f, "UNKNOWN({})", code),
        }
    }
}

/// Command byte written to the control characteristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtaCommand {
    Begin,
    Commit,
    Abort,
}

impl OtaCommand {
    pub fn as_byte(self) -> u8 {
        match self {
            OtaCommand::Begin => 0x01,
            OtaCommand::Commit => 0x02,
            OtaCommand::Abort => 0x03,
        }
    }
}

impl fmt::Display for OtaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaCommand::Begin => write!(f, "BEGIN"),
            OtaCommand::Commit => write!(f, "COMMIT"),
            OtaCommand::Abort => write!(f, "ABORT"),
        }
    }
}

// ============================================================================
// Controller-side state
// ============================================================================

/// Protocol phase as tracked by the client, not the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtaPhase {
    Connecting,
    ServiceCheck,
    StatusCheck,
    AbortStale,
    Begin,
    BeginVerify,
    Transfer,
    Commit,
    FinalStatus,
    Done,
}

impl fmt::Display for OtaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OtaPhase::Connecting => "connecting",
            OtaPhase::ServiceCheck => "service check",
            OtaPhase::StatusCheck => "status check",
            OtaPhase::AbortStale => "stale session abort",
            OtaPhase::Begin => "begin",
            OtaPhase::BeginVerify => "begin verify",
            OtaPhase::Transfer => "transfer",
            OtaPhase::Commit => "commit",
            OtaPhase::FinalStatus => "final status",
            OtaPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Transfer progress, reported after every chunk write.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadProgress {
    pub bytes_sent: usize,
    pub total_bytes: usize,
    pub chunks_sent: usize,
    pub total_chunks: usize,
    pub percent: f32,
}

impl UploadProgress {
    pub fn new(bytes_sent: usize, total_bytes: usize, chunks_sent: usize, total_chunks: usize) -> Self {
        let percent = if total_bytes == 0 {
            100.0
        } else {
            (bytes_sent as f32 / total_bytes as f32) * 100.0
        };
        Self {
            bytes_sent,
            total_bytes,
            chunks_sent,
            total_chunks,
            percent,
        }
    }
}
