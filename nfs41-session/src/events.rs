//! Session lifecycle events

use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Events published by a [`Client`](crate::Client) as its session changes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Session established and installed as the client's current session
    Established { session_id: SessionId },
    /// Session rebound with a reset slot table
    Renewed { session_id: SessionId },
    /// A lease keepalive failed; the renewal task keeps running
    RenewalFailed { session_id: SessionId, error: String },
    /// Session torn down
    Destroyed { session_id: SessionId },
}

impl SessionEvent {
    /// Session the event refers to
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Established { session_id }
            | Self::Renewed { session_id }
            | Self::RenewalFailed { session_id, .. }
            | Self::Destroyed { session_id } => session_id,
        }
    }
}
