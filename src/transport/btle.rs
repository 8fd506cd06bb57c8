// btleplug binding for the transport seam.
//
// Scans unfiltered and filters by name on the application side: CoreBluetooth
// only matches 128-bit UUIDs carried in the primary advertisement, and the
// firmware advertises its OTA service in the scan response.

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use std::time::Duration;
use uuid::Uuid;

use super::{PeerDescriptor, Session, Transport, TransportError};
use crate::ble_common;
use crate::error::OtaError;

/// Connection attempts give up after this long.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Service discovery gives up after this long.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Rescan window when a peer id is not in the adapter cache.
const RESCAN_WINDOW: Duration = Duration::from_secs(3);

// ============================================================================
// Transport
// ============================================================================

pub struct BleTransport {
    adapter: Adapter,
}

impl BleTransport {
    /// Bind to the first BLE adapter on the host.
    pub async fn new() -> Result<Self, OtaError> {
        let adapter = ble_common::first_adapter().await?;
        Ok(Self { adapter })
    }

    async fn find_peripheral(&self, peer_id: &str) -> Result<Option<Peripheral>, TransportError> {
        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::new("list peripherals", e.to_string()))?;
        Ok(peripherals
            .into_iter()
            .find(|p| p.id().to_string() == peer_id))
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn scan(&self, timeout: Duration) -> Result<Vec<PeerDescriptor>, TransportError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::new("start scan", e.to_string()))?;

        tlog!("[ble] Scanning for {:?}...", timeout);
        tokio::time::sleep(timeout).await;

        if let Err(e) = self.adapter.stop_scan().await {
            tlog!("[ble] Failed to stop scan: {e}");
        }

        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::new("list peripherals", e.to_string()))?;

        let mut peers = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let props = match peripheral.properties().await.ok().flatten() {
                Some(p) => p,
                None => continue,
            };
            peers.push(PeerDescriptor {
                id: peripheral.id().to_string(),
                name: props.local_name,
                rssi: props.rssi,
            });
        }

        tlog!("[ble] Scan finished, {} peers seen", peers.len());
        Ok(peers)
    }

    async fn connect(&self, peer_id: &str) -> Result<Box<dyn Session>, TransportError> {
        let peripheral = match self.find_peripheral(peer_id).await? {
            Some(p) => p,
            None => {
                // Evicted from the adapter cache (or never scanned). Rescan briefly.
                tlog!("[ble] {} not in cache, running quick rescan...", peer_id);
                let _ = self.adapter.start_scan(ScanFilter::default()).await;
                tokio::time::sleep(RESCAN_WINDOW).await;
                let _ = self.adapter.stop_scan().await;
                self.find_peripheral(peer_id)
                    .await?
                    .ok_or_else(|| TransportError::new("connect", format!("device '{peer_id}' not found")))?
            }
        };

        tlog!("[ble] Connecting to {peer_id}...");
        match tokio::time::timeout(CONNECT_TIMEOUT, peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(TransportError::new("connect", e.to_string())),
            Err(_) => {
                let _ = peripheral.disconnect().await;
                return Err(TransportError::new(
                    "connect",
                    format!("timed out after {} seconds", CONNECT_TIMEOUT.as_secs()),
                ));
            }
        }

        match tokio::time::timeout(DISCOVERY_TIMEOUT, peripheral.discover_services()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = peripheral.disconnect().await;
                return Err(TransportError::new("discover services", e.to_string()));
            }
            Err(_) => {
                let _ = peripheral.disconnect().await;
                return Err(TransportError::new(
                    "discover services",
                    format!("timed out after {} seconds", DISCOVERY_TIMEOUT.as_secs()),
                ));
            }
        }

        tlog!("[ble] Connected to {peer_id}");
        Ok(Box::new(BleSession { peripheral }))
    }
}

// ============================================================================
// Session
// ============================================================================

struct BleSession {
    peripheral: Peripheral,
}

impl BleSession {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| TransportError::new("lookup", format!("characteristic {uuid} not found")))
    }
}

#[async_trait]
impl Session for BleSession {
    async fn list_services(&self) -> Result<Vec<Uuid>, TransportError> {
        Ok(self.peripheral.services().iter().map(|s| s.uuid).collect())
    }

    async fn read_value(&self, endpoint: Uuid) -> Result<Vec<u8>, TransportError> {
        let characteristic = self.characteristic(endpoint)?;
        self.peripheral
            .read(&characteristic)
            .await
            .map_err(|e| TransportError::new("read", e.to_string()))
    }

    async fn write_value(&self, endpoint: Uuid, value: &[u8]) -> Result<(), TransportError> {
        let characteristic = self.characteristic(endpoint)?;
        self.peripheral
            .write(&characteristic, value, WriteType::WithResponse)
            .await
            .map_err(|e| TransportError::new("write", e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        // The peer may already be gone after a reboot
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::new("disconnect", e.to_string()))
    }
}
