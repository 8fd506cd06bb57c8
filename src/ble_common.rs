// Shared BLE helpers
//
// Adapter bring-up for the btleplug transport and the UUID helper used to
// spell the OTA GATT identifiers.

use btleplug::api::Manager as _;
use btleplug::platform::{Adapter, Manager};
use uuid::Uuid;

use crate::error::OtaError;

// ============================================================================
// Adapter
// ============================================================================

/// Initialise the BLE manager and return the first adapter it reports.
pub async fn first_adapter() -> Result<Adapter, OtaError> {
    let manager = Manager::new()
        .await
        .map_err(|e| OtaError::AdapterUnavailable(format!("BLE manager init failed: {e}")))?;
    let adapters = manager
        .adapters()
        .await
        .map_err(|e| OtaError::AdapterUnavailable(format!("Failed to list BLE adapters: {e}")))?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| OtaError::AdapterUnavailable("No BLE adapter found".to_string()))
}

// ============================================================================
// UUIDs
// ============================================================================

/// Build a 128-bit UUID from its five dash-separated fields.
pub const fn uuid_from_fields(a: u32, b: u16, c: u16, d: u16, e: u64) -> Uuid {
    let hi: u64 = (a as u64) << 32 | (b as u64) << 16 | c as u64;
    let lo: u64 = (d as u64) << 48 | e;
    Uuid::from_u128(((hi as u128) << 64) | lo as u128)
}
