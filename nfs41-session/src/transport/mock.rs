//! Mock transport for testing
//!
//! MockTransport answers every handshake in memory and records each call,
//! so session logic can be tested without a server. Failures are scripted
//! per operation with the `queue_*_failure` methods; each queued failure
//! is consumed by the next matching call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::traits::{CreateSessionReply, CreateSessionRequest, SessionTransport};
use crate::error::TransportError;
use crate::session::{SequenceArgs, SessionId};

/// A call observed by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    CreateSession(CreateSessionRequest),
    Sequence(SequenceArgs),
    DestroySession(SessionId),
}

/// In-memory implementation of SessionTransport
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Slot count granted on handshakes; `None` grants what was asked
    granted_slots: Option<u32>,
    /// Delay applied to every sequence request
    sequence_latency: Option<Duration>,
    create_failures: Mutex<VecDeque<TransportError>>,
    sequence_failures: Mutex<VecDeque<TransportError>>,
    destroy_failures: Mutex<VecDeque<TransportError>>,
    calls: Mutex<Vec<TransportCall>>,
    session_valid: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant at most `slots` fore channel slots on every handshake
    #[must_use]
    pub fn with_granted_slots(mut self, slots: u32) -> Self {
        self.granted_slots = Some(slots);
        self
    }

    /// Delay every sequence request by `latency`
    #[must_use]
    pub fn with_sequence_latency(mut self, latency: Duration) -> Self {
        self.sequence_latency = Some(latency);
        self
    }

    /// Fail the next create_session call
    pub async fn queue_create_failure(&self, error: TransportError) {
        self.create_failures.lock().await.push_back(error);
    }

    /// Fail the next send_sequence call
    pub async fn queue_sequence_failure(&self, error: TransportError) {
        self.sequence_failures.lock().await.push_back(error);
    }

    /// Fail the next destroy_session call
    pub async fn queue_destroy_failure(&self, error: TransportError) {
        self.destroy_failures.lock().await.push_back(error);
    }

    /// All calls seen so far, in order
    pub async fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().await.clone()
    }

    /// Sequence requests seen so far
    pub async fn sequence_calls(&self) -> Vec<SequenceArgs> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                TransportCall::Sequence(args) => Some(args.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether the transport currently considers its session valid
    pub fn is_session_valid(&self) -> bool {
        self.session_valid.load(Ordering::SeqCst)
    }

    async fn record(&self, call: TransportCall) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl SessionTransport for MockTransport {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreateSessionReply, TransportError> {
        self.record(TransportCall::CreateSession(request.clone()))
            .await;

        if let Some(error) = self.create_failures.lock().await.pop_front() {
            return Err(error);
        }

        let session_id = request
            .existing
            .unwrap_or_else(|| SessionId::from_bytes(Uuid::new_v4().into_bytes()));
        let max_slots = match self.granted_slots {
            Some(granted) => granted.min(request.max_slots),
            None => request.max_slots,
        };

        self.session_valid.store(true, Ordering::SeqCst);
        Ok(CreateSessionReply {
            session_id,
            flags: request.flags,
            max_slots,
        })
    }

    async fn send_sequence(&self, args: &SequenceArgs) -> Result<(), TransportError> {
        if let Some(latency) = self.sequence_latency {
            tokio::time::sleep(latency).await;
        }

        self.record(TransportCall::Sequence(args.clone())).await;

        match self.sequence_failures.lock().await.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn destroy_session(&self, session_id: &SessionId) -> Result<(), TransportError> {
        self.record(TransportCall::DestroySession(*session_id)).await;

        match self.destroy_failures.lock().await.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn invalidate_session(&self) {
        self.session_valid.store(false, Ordering::SeqCst);
    }
}
