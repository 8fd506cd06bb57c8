// Transport seam for the OTA protocol.
//
// The controller only ever talks to a `Transport` (scan + connect) and the
// `Session` it hands back (service listing, characteristic read/write,
// teardown). The BLE binding lives in `btle`; tests use the scripted
// binding in `mock`.

pub mod btle;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub use btle::BleTransport;

// ============================================================================
// Types
// ============================================================================

/// A peer seen during one scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerDescriptor {
    /// Platform peripheral id rendered as a string
    pub id: String,
    /// Advertised local name, if the peer sent one
    pub name: Option<String>,
    /// Only used for scan listings
    pub rssi: Option<i16>,
}

impl PeerDescriptor {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.id)
    }
}

/// Failure of a single transport operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportError {
    /// Operation that failed, e.g. "connect", "write", "read"
    pub op: &'static str,
    pub detail: String,
}

impl TransportError {
    pub fn new(op: &'static str, detail: impl Into<String>) -> Self {
        Self {
            op,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.op, self.detail)
    }
}

impl std::error::Error for TransportError {}

// ============================================================================
// Traits
// ============================================================================

/// Discovery and connection establishment.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Scan for `timeout` and return every peer seen, in the order the
    /// adapter reports them.
    async fn scan(&self, timeout: Duration) -> Result<Vec<PeerDescriptor>, TransportError>;

    /// Open a connected session to the peer with the given id.
    async fn connect(&self, peer_id: &str) -> Result<Box<dyn Session>, TransportError>;
}

/// A connected session to one peer.
///
/// Endpoints are addressed by characteristic UUID. Implementations must
/// tolerate `close` being called on a session whose peer already vanished.
#[async_trait]
pub trait Session: Send + Sync {
    /// UUIDs of every primary service the peer exposes.
    async fn list_services(&self) -> Result<Vec<Uuid>, TransportError>;

    async fn read_value(&self, endpoint: Uuid) -> Result<Vec<u8>, TransportError>;

    async fn write_value(&self, endpoint: Uuid, value: &[u8]) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}
