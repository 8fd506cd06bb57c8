// Firmware image loading.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::OtaError;

/// A firmware binary held in memory for the duration of an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirmwareImage {
    bytes: Vec<u8>,
}

impl FirmwareImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Read the whole file at `path`.
    pub fn load(path: &Path) -> Result<Self, OtaError> {
        if !path.is_file() {
            return Err(OtaError::firmware_not_found(path, "not a readable file"));
        }
        let bytes = std::fs::read(path).map_err(|e| OtaError::firmware_not_found(path, e))?;
        tlog!(
            "[firmware] Loaded {} ({} bytes)",
            path.display(),
            bytes.len()
        );
        Ok(Self { bytes })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex SHA-256 of the image, for logs and the pre-flight summary.
    pub fn sha256_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}
