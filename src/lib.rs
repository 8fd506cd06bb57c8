//! Bluetooth LE OTA updater for Partylight / Blindomator devices.
//!
//! [`ota::select_peer`] finds the device, [`ota::OtaController`] pushes the
//! image through the begin/transfer/commit protocol. Both work against the
//! [`transport::Transport`] trait; [`transport::BleTransport`] is the
//! btleplug-backed implementation.

#[macro_use]
pub mod logging;

pub mod ble_common;
pub mod error;
pub mod firmware;
pub mod ota;
pub mod settings;
pub mod transport;

pub use error::OtaError;
pub use firmware::FirmwareImage;
pub use ota::{OtaController, OtaStatus, UpdateOutcome, UploadProgress};
pub use settings::OtaConfig;
pub use transport::{BleTransport, PeerDescriptor, Session, Transport, TransportError};
