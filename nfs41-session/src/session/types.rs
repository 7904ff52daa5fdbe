//! Session identity, creation flags and sequence arguments

use std::fmt;

use serde::{Deserialize, Serialize};

/// Size of a server-issued session id in bytes
pub const SESSION_ID_SIZE: usize = 16;

/// Opaque session identity issued by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; SESSION_ID_SIZE]);

impl SessionId {
    pub const fn from_bytes(bytes: [u8; SESSION_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Flags carried by the session-establishing handshake
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreateSessionFlags(u32);

impl CreateSessionFlags {
    /// Server should keep its reply cache across restarts
    pub const PERSIST: Self = Self(0x1);
    /// Use the fore channel connection as the back channel
    pub const CONN_BACK_CHAN: Self = Self(0x2);
    pub const CONN_RDMA: Self = Self(0x4);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// Sequencing fields stamped onto an outgoing request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceArgs {
    pub session_id: SessionId,
    pub slot_id: u32,
    pub sequence_id: u32,
    pub highest_slot_id: u32,
    /// Ask the server to retain the reply for retransmission matching
    pub cache_this: bool,
}
