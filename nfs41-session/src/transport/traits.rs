//! SessionTransport trait and handshake types
//!
//! The session layer never encodes requests itself. Everything that
//! reaches the server goes through a [`SessionTransport`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::session::{CreateSessionFlags, SequenceArgs, SessionId};

/// Arguments of the session-establishing handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// `Some` rebinds an existing session identity instead of requesting a new one
    pub existing: Option<SessionId>,
    pub flags: CreateSessionFlags,
    /// Fore channel slot count the client can track
    pub max_slots: u32,
}

impl CreateSessionRequest {
    /// Whether this handshake rebinds an existing identity
    pub fn is_rebind(&self) -> bool {
        self.existing.is_some()
    }
}

/// What the server granted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionReply {
    pub session_id: SessionId,
    pub flags: CreateSessionFlags,
    /// Fore channel slot count granted by the server
    pub max_slots: u32,
}

/// Transport operations consumed by the session layer
///
/// Implementations own the wire encoding and the connection. They also
/// carry the transport-level "session valid" flag.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Exchange identity (for a new session) and establish or rebind the session
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreateSessionReply, TransportError>;

    /// Send a bare sequence request with no further operations
    async fn send_sequence(&self, args: &SequenceArgs) -> Result<(), TransportError>;

    /// Tell the server to drop the session
    async fn destroy_session(&self, session_id: &SessionId) -> Result<(), TransportError>;

    /// Mark the transport's session as no longer usable
    fn invalidate_session(&self);
}
