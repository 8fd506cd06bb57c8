// OTA session controller
//
// Drives one update attempt against one peer:
//
//   connect -> service check -> status check -> [abort stale] -> begin
//           -> begin verify -> transfer -> commit -> final status -> close
//
// The device gives no per-chunk acknowledgement and no flow control, so
// reliability comes from fixed pacing delays, a coarse status poll every
// `status_poll_interval` chunks, and treating a disconnect after COMMIT as
// the device rebooting into the new image.

use std::time::Duration;

use super::chunker::{chunks, total_chunks};
use super::{OtaCommand, OtaPhase, OtaStatus, UploadProgress};
use crate::error::OtaError;
use crate::firmware::FirmwareImage;
use crate::settings::OtaConfig;
use crate::transport::{Session, Transport, TransportError};

/// How a successful attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Final status read returned SUCCESS
    Confirmed,
    /// Final status read failed; the device dropped the link to reboot
    Disconnected,
    /// Final status read returned something other than SUCCESS or ERROR
    Unconfirmed(OtaStatus),
}

impl UpdateOutcome {
    pub fn describe(&self) -> String {
        match self {
            UpdateOutcome::Confirmed => "device confirmed the update and will reboot".to_string(),
            UpdateOutcome::Disconnected => {
                "device disconnected after commit (expected reboot)".to_string()
            }
            UpdateOutcome::Unconfirmed(status) => {
                format!("device reported {status} after commit")
            }
        }
    }
}

pub struct OtaController<'a, T: Transport + ?Sized> {
    transport: &'a T,
    config: &'a OtaConfig,
}

impl<'a, T: Transport + ?Sized> OtaController<'a, T> {
    pub fn new(transport: &'a T, config: &'a OtaConfig) -> Self {
        Self { transport, config }
    }

    /// Run a full update of `image` on `peer_id`.
    ///
    /// `on_progress` is called after every successful chunk write. The
    /// session is closed on every path once it has been opened.
    pub async fn perform_update<F>(
        &self,
        peer_id: &str,
        image: &FirmwareImage,
        mut on_progress: F,
    ) -> Result<UpdateOutcome, OtaError>
    where
        F: FnMut(&UploadProgress),
    {
        self.check_config()?;
        let session = self.open(peer_id).await?;
        let result = self
            .run_update(session.as_ref(), peer_id, image, &mut on_progress)
            .await;
        self.close(session.as_ref()).await;
        result
    }

    /// Connect, check for the OTA service and read the current status.
    pub async fn query_status(&self, peer_id: &str) -> Result<OtaStatus, OtaError> {
        self.check_config()?;
        let session = self.open(peer_id).await?;
        let result = async {
            self.check_service(session.as_ref(), peer_id).await?;
            self.read_status(session.as_ref())
                .await
                .map_err(|e| OtaError::transport(OtaPhase::StatusCheck, e))
        }
        .await;
        self.close(session.as_ref()).await;
        result
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    fn check_config(&self) -> Result<(), OtaError> {
        self.config
            .validate()
            .map_err(|reason| OtaError::config(None, reason))
    }

    async fn open(&self, peer_id: &str) -> Result<Box<dyn Session>, OtaError> {
        enter(OtaPhase::Connecting);
        let session = self
            .transport
            .connect(peer_id)
            .await
            .map_err(|source| OtaError::ConnectionFailed {
                peer: peer_id.to_string(),
                source,
            })?;
        tlog!("[ota] Connected to {peer_id}");
        Ok(session)
    }

    async fn close(&self, session: &dyn Session) {
        enter(OtaPhase::Done);
        if let Err(e) = session.close().await {
            tlog!("[ota] Closing session failed (ignored): {e}");
        }
    }

    async fn check_service(&self, session: &dyn Session, peer_id: &str) -> Result<(), OtaError> {
        enter(OtaPhase::ServiceCheck);
        let services = session
            .list_services()
            .await
            .map_err(|e| OtaError::transport(OtaPhase::ServiceCheck, e))?;
        if !services.contains(&self.config.service_id) {
            return Err(OtaError::ServiceNotSupported {
                peer: peer_id.to_string(),
            });
        }
        tlog!("[ota] OTA service found");
        Ok(())
    }

    async fn run_update(
        &self,
        session: &dyn Session,
        peer_id: &str,
        image: &FirmwareImage,
        on_progress: &mut dyn FnMut(&UploadProgress),
    ) -> Result<UpdateOutcome, OtaError> {
        self.check_service(session, peer_id).await?;

        enter(OtaPhase::StatusCheck);
        let status = self
            .read_status(session)
            .await
            .map_err(|e| OtaError::transport(OtaPhase::StatusCheck, e))?;
        tlog!("[ota] Initial OTA status: {status}");

        if status == OtaStatus::InProgress {
            enter(OtaPhase::AbortStale);
            tlog!("[ota] WARNING: OTA already in progress. Aborting previous update...");
            self.send_command(session, OtaCommand::Abort)
                .await
                .map_err(|e| OtaError::transport(OtaPhase::AbortStale, e))?;
            pause(self.config.abort_settle_delay()).await;
        }

        enter(OtaPhase::Begin);
        self.send_command(session, OtaCommand::Begin)
            .await
            .map_err(|e| OtaError::transport(OtaPhase::Begin, e))?;
        pause(self.config.settle_delay()).await;

        enter(OtaPhase::BeginVerify);
        let status = self
            .read_status(session)
            .await
            .map_err(|e| OtaError::transport(OtaPhase::BeginVerify, e))?;
        tlog!("[ota] OTA status after begin: {status}");
        if status == OtaStatus::Error {
            return Err(OtaError::BeginRejected);
        }

        enter(OtaPhase::Transfer);
        let chunks_sent = self.transfer(session, image, on_progress).await?;
        tlog!("[ota] All {chunks_sent} chunks sent successfully");

        enter(OtaPhase::Commit);
        self.send_command(session, OtaCommand::Commit)
            .await
            .map_err(|e| OtaError::transport(OtaPhase::Commit, e))?;
        pause(self.config.settle_delay()).await;

        enter(OtaPhase::FinalStatus);
        match self.read_status(session).await {
            Err(e) => {
                tlog!("[ota] Connection lost (expected after reboot): {e}");
                Ok(UpdateOutcome::Disconnected)
            }
            Ok(OtaStatus::Success) => {
                tlog!("[ota] Final OTA status: SUCCESS");
                Ok(UpdateOutcome::Confirmed)
            }
            Ok(OtaStatus::Error) => {
                tlog!("[ota] Final OTA status: ERROR");
                Err(OtaError::CommitFailed)
            }
            Ok(other) => {
                tlog!("[ota] Final OTA status: {other}");
                Ok(UpdateOutcome::Unconfirmed(other))
            }
        }
    }

    /// Send every chunk in offset order. Returns the number of chunks sent.
    async fn transfer(
        &self,
        session: &dyn Session,
        image: &FirmwareImage,
        on_progress: &mut dyn FnMut(&UploadProgress),
    ) -> Result<usize, OtaError> {
        let chunk_size = self.config.chunk_size;
        let total_bytes = image.size();
        let total = total_chunks(total_bytes, chunk_size);
        tlog!("[ota] Sending firmware data ({total_bytes} bytes in {chunk_size} byte chunks, {total} chunks)...");

        let mut chunks_sent = 0;
        for chunk in chunks(image, chunk_size) {
            if let Err(e) = session.write_value(self.config.data_id, chunk.data).await {
                tlog!("[ota] Error writing chunk {}: {e}", chunk.index);
                self.abort_best_effort(session).await;
                return Err(OtaError::transfer(chunks_sent, e));
            }
            chunks_sent += 1;
            on_progress(&UploadProgress::new(chunk.end(), total_bytes, chunks_sent, total));

            pause(self.config.inter_chunk_delay()).await;

            if chunks_sent % self.config.status_poll_interval == 0 {
                match self.read_status(session).await {
                    Ok(OtaStatus::Error) => {
                        tlog!("[ota] Device reported ERROR after {chunks_sent} chunks");
                        self.abort_best_effort(session).await;
                        return Err(OtaError::transfer(chunks_sent, "device reported ERROR"));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tlog!("[ota] Status poll failed after {chunks_sent} chunks: {e}");
                        self.abort_best_effort(session).await;
                        return Err(OtaError::transfer(chunks_sent, e));
                    }
                }
            }
        }
        Ok(chunks_sent)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn read_status(&self, session: &dyn Session) -> Result<OtaStatus, TransportError> {
        let value = session.read_value(self.config.status_id).await?;
        Ok(OtaStatus::decode(&value))
    }

    async fn send_command(
        &self,
        session: &dyn Session,
        command: OtaCommand,
    ) -> Result<(), TransportError> {
        tlog!("[ota] Sending {command}");
        session
            .write_value(self.config.control_id, &[command.as_byte()])
            .await
    }

    /// Send ABORT after a failed transfer. A failure here is logged and dropped
    /// so the transfer error is what the caller sees.
    async fn abort_best_effort(&self, session: &dyn Session) {
        tlog!("[ota] Aborting OTA update...");
        if let Err(e) = self.send_command(session, OtaCommand::Abort).await {
            tlog!("[ota] Abort write failed (ignored): {e}");
        }
    }
}

fn enter(phase: OtaPhase) {
    tlog!("[ota] -> {phase}");
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
