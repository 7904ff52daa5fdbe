//! Session struct, state machine and request sequencing
//!
//! Every slot operation takes the owning client's session lock shared
//! before the slot table lock. A caller waiting for a free slot drops the
//! client lock while it waits and retakes it for the next claim attempt,
//! so a full table never stalls an install, renewal or teardown.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use super::callback::CallbackSession;
use super::lease::LeaseRenewal;
use super::types::{CreateSessionFlags, SequenceArgs, SessionId};
use crate::client::Client;
use crate::error::{Result, SessionError};
use crate::slot_table::{SlotGrant, SlotTable};
use crate::transport::{CreateSessionReply, SessionTransport};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Built from a handshake reply, not yet installed on the client
    Allocated,
    /// Installed and usable
    Valid,
    /// Being torn down
    Invalid,
    /// Torn down; never used again
    Freed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Allocated => "Allocated",
            Self::Valid => "Valid",
            Self::Invalid => "Invalid",
            Self::Freed => "Freed",
        };
        f.write_str(name)
    }
}

/// A negotiated client-server session
///
/// Session owns:
/// - The slot table bounding in-flight requests
/// - The callback channel sequence counter
/// - The lease renewal task, once a lease timer is set
pub struct Session {
    id: SessionId,
    client: Weak<Client>,
    pub(super) transport: Arc<dyn SessionTransport>,
    pub(super) table: SlotTable,
    pub(super) callback: CallbackSession,
    flags: AtomicU32,
    state: RwLock<SessionState>,
    established_at: DateTime<Utc>,
    pub(super) lease_seconds: AtomicU32,
    pub(super) renewal: Mutex<Option<LeaseRenewal>>,
    /// Set under `renewal` once teardown has stopped renewal for good
    pub(super) renewal_closed: AtomicBool,
    pub(super) renewal_failures: AtomicU64,
}

impl Session {
    /// Build a session from a successful handshake
    pub(super) fn new(
        client: &Arc<Client>,
        table: SlotTable,
        callback: CallbackSession,
        reply: &CreateSessionReply,
    ) -> Self {
        Self {
            id: reply.session_id,
            client: Arc::downgrade(client),
            transport: Arc::clone(client.transport()),
            table,
            callback,
            flags: AtomicU32::new(reply.flags.bits()),
            state: RwLock::new(SessionState::Allocated),
            established_at: Utc::now(),
            lease_seconds: AtomicU32::new(0),
            renewal: Mutex::new(None),
            renewal_closed: AtomicBool::new(false),
            renewal_failures: AtomicU64::new(0),
        }
    }

    /// Server-issued session identity
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn is_valid(&self) -> bool {
        self.state().await == SessionState::Valid
    }

    /// Flags the server accepted at the last handshake
    pub fn flags(&self) -> CreateSessionFlags {
        CreateSessionFlags::from_bits(self.flags.load(Ordering::SeqCst))
    }

    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    /// Current callback channel sequence number
    pub fn callback_sequence(&self) -> u32 {
        self.callback.sequence()
    }

    pub fn callback(&self) -> &CallbackSession {
        &self.callback
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    /// Number of keepalives that failed since the session was created
    pub fn renewal_failures(&self) -> u64 {
        self.renewal_failures.load(Ordering::SeqCst)
    }

    /// Whether this session was created by `client`
    pub fn belongs_to(&self, client: &Arc<Client>) -> bool {
        std::ptr::eq(self.client.as_ptr(), Arc::as_ptr(client))
    }

    pub(super) fn client(&self) -> Result<Arc<Client>> {
        self.client.upgrade().ok_or(SessionError::ClientReleased)
    }

    pub(super) async fn set_state(&self, state: SessionState) {
        let mut current = self.state.write().await;
        debug!(session_id = %self.id, "Session state: {} -> {}", *current, state);
        *current = state;
    }

    pub(super) fn set_flags(&self, flags: CreateSessionFlags) {
        self.flags.store(flags.bits(), Ordering::SeqCst);
    }

    /// Claim a slot, waiting as long as every slot is in use
    pub async fn get_slot(&self) -> Result<SlotGrant> {
        let client = self.client()?;

        loop {
            let notified = self.table.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let grant = {
                let _current = client.session_lock().read().await;
                self.table.try_acquire().await
            };

            if let Some(grant) = grant {
                debug!(
                    session_id = %self.id,
                    slot_id = grant.slot_id,
                    sequence_id = grant.sequence_id,
                    highest = grant.highest_used,
                    "Using slot"
                );
                return Ok(grant);
            }

            trace!(session_id = %self.id, "No free slot, waiting");
            notified.await;
        }
    }

    /// Acquire a slot and build the sequencing fields for a request.
    ///
    /// `cache_this` asks the server to keep the reply for retransmissions.
    pub async fn sequence(&self, cache_this: bool) -> Result<SequenceArgs> {
        let grant = self.get_slot().await?;
        Ok(SequenceArgs {
            session_id: self.id,
            slot_id: grant.slot_id,
            sequence_id: grant.sequence_id,
            highest_slot_id: grant.highest_used,
            cache_this,
        })
    }

    /// Return a slot once its request has completed or been abandoned
    pub async fn free_slot(&self, slot_id: u32) -> Result<()> {
        let client = self.client()?;
        let _current = client.session_lock().read().await;
        self.table.release(slot_id).await;
        Ok(())
    }

    /// Advance a slot's sequence number.
    ///
    /// Called once a request on the slot completes, before the slot is
    /// freed, and before reissuing a new request on a held slot. Without it
    /// the server answers the next request from its reply cache.
    pub async fn bump_sequence(&self, slot_id: u32) -> Result<()> {
        let client = self.client()?;
        let _current = client.session_lock().read().await;
        self.table.bump_sequence(slot_id).await;
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("flags", &self.flags())
            .field("established_at", &self.established_at)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(renewal) = self.renewal.get_mut() {
            renewal.cancel();
        }
    }
}
