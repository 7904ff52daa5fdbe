//! Session management

pub mod callback;
pub mod lease;
pub mod lifecycle;
pub mod state;
pub mod types;

// Re-export key types for convenience
pub use callback::CallbackSession;
pub use lease::renewal_interval;
pub use lifecycle::SessionLifecycle;
pub use state::{Session, SessionState};
pub use types::{CreateSessionFlags, SESSION_ID_SIZE, SequenceArgs, SessionId};
