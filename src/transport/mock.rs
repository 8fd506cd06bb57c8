// Scripted in-memory transport for protocol tests.
//
// Records every session operation so tests can assert on the exact traffic
// the controller produced. Status reads are served from a queue; once the
// queue is empty every read returns IDLE.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use super::{PeerDescriptor, Session, Transport, TransportError};
use crate::ota::OtaCommand;
use crate::settings::OtaConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Connect(String),
    ListServices,
    Read(Uuid),
    Write(Uuid, Vec<u8>),
    WriteFailed(Uuid),
    Close,
}

struct MockState {
    events: Vec<Event>,
    status_reads: VecDeque<Result<Vec<u8>, TransportError>>,
    data_writes_attempted: usize,
    fail_data_write_at: Option<usize>,
    fail_command: Option<u8>,
}

pub struct MockTransport {
    peers: Vec<PeerDescriptor>,
    services: Vec<Uuid>,
    connect_error: Option<TransportError>,
    close_fails: bool,
    control_id: Uuid,
    data_id: Uuid,
    status_id: Uuid,
    scans: AtomicUsize,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A device exposing the OTA service described by `config`.
    pub fn new(config: &OtaConfig) -> Self {
        Self {
            peers: Vec::new(),
            services: vec![config.service_id],
            connect_error: None,
            close_fails: false,
            control_id: config.control_id,
            data_id: config.data_id,
            status_id: config.status_id,
            scans: AtomicUsize::new(0),
            state: Arc::new(Mutex::new(MockState {
                events: Vec::new(),
                status_reads: VecDeque::new(),
                data_writes_attempted: 0,
                fail_data_write_at: None,
                fail_command: None,
            })),
        }
    }

    pub fn with_peers(peers: Vec<PeerDescriptor>) -> Self {
        let mut transport = Self::new(&OtaConfig::default());
        transport.peers = peers;
        transport
    }

    pub fn without_ota_service(mut self) -> Self {
        self.services = vec![Uuid::from_u128(0x1800)];
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.connect_error = Some(TransportError::new("connect", "peer unreachable"));
        self
    }

    /// Make `close` report an error (it is still recorded).
    pub fn failing_close(mut self) -> Self {
        self.close_fails = true;
        self
    }

    /// Queue the raw value returned by the next unanswered status read.
    pub fn push_status(&self, value: &[u8]) -> &Self {
        self.lock().status_reads.push_back(Ok(value.to_vec()));
        self
    }

    /// Queue a failing status read (peer vanished).
    pub fn push_status_error(&self) -> &Self {
        self.lock()
            .status_reads
            .push_back(Err(TransportError::new("read", "peer disconnected")));
        self
    }

    /// Make the data write for chunk `index` fail (counted across the whole mock).
    pub fn fail_data_write_at(&self, index: usize) -> &Self {
        self.lock().fail_data_write_at = Some(index);
        self
    }

    /// Make every control write of `command` fail.
    pub fn fail_command_write(&self, command: OtaCommand) -> &Self {
        self.lock().fail_command = Some(command.as_byte());
        self
    }

    pub fn fail_abort_write(&self) -> &Self {
        self.fail_command_write(OtaCommand::Abort)
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Command bytes successfully written to the control characteristic, in order.
    pub fn control_writes(&self) -> Vec<u8> {
        self.writes_to(self.control_id)
            .into_iter()
            .filter_map(|v| v.first().copied())
            .collect()
    }

    /// Payloads successfully written to the data characteristic, in order.
    pub fn data_writes(&self) -> Vec<Vec<u8>> {
        self.writes_to(self.data_id)
    }

    pub fn close_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, Event::Close))
            .count()
    }

    fn writes_to(&self, endpoint: Uuid) -> Vec<Vec<u8>> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Write(uuid, value) if *uuid == endpoint => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn scan(&self, _timeout: Duration) -> Result<Vec<PeerDescriptor>, TransportError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(self.peers.clone())
    }

    async fn connect(&self, peer_id: &str) -> Result<Box<dyn Session>, TransportError> {
        if let Some(err) = &self.connect_error {
            return Err(err.clone());
        }
        self.lock().events.push(Event::Connect(peer_id.to_string()));
        Ok(Box::new(MockSession {
            services: self.services.clone(),
            control_id: self.control_id,
            data_id: self.data_id,
            status_id: self.status_id,
            close_fails: self.close_fails,
            state: self.state.clone(),
        }))
    }
}

struct MockSession {
    services: Vec<Uuid>,
    control_id: Uuid,
    data_id: Uuid,
    status_id: Uuid,
    close_fails: bool,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Session for MockSession {
    async fn list_services(&self) -> Result<Vec<Uuid>, TransportError> {
        self.state.lock().unwrap().events.push(Event::ListServices);
        Ok(self.services.clone())
    }

    async fn read_value(&self, endpoint: Uuid) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Read(endpoint));
        if endpoint != self.status_id {
            return Err(TransportError::new("read", "characteristic not readable"));
        }
        state
            .status_reads
            .pop_front()
            .unwrap_or_else(|| Ok(vec![0x00]))
    }

    async fn write_value(&self, endpoint: Uuid, value: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        let failed = if endpoint == self.data_id {
            let index = state.data_writes_attempted;
            state.data_writes_attempted += 1;
            state.fail_data_write_at == Some(index)
        } else if endpoint == self.control_id {
            state.fail_command.is_some() && value.first().copied() == state.fail_command
        } else {
            true
        };

        if failed {
            state.events.push(Event::WriteFailed(endpoint));
            return Err(TransportError::new("write", "GATT write rejected"));
        }
        state.events.push(Event::Write(endpoint, value.to_vec()));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.lock().unwrap().events.push(Event::Close);
        if self.close_fails {
            return Err(TransportError::new("disconnect", "peer already gone"));
        }
        Ok(())
    }
}
