//! Error types for nfs41-session

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors related to session management
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid lease time: lease must be at least one second")]
    InvalidLease,

    #[error("Session renewal task already started")]
    RenewalAlreadyRunning,

    #[error("Session handshake failed: {0}")]
    HandshakeFailed(#[source] TransportError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Owning client has been released")]
    ClientReleased,

    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

/// Errors reported by the transport/RPC layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Server rejected request: {0}")]
    Rejected(String),

    #[error("Server unreachable: {0}")]
    Unreachable(String),

    #[error("Bad response from server: {0}")]
    BadResponse(String),
}

/// Errors loading session configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
