//! Transport/RPC layer abstraction

pub mod mock;
pub mod traits;

// Re-export key types for convenience
pub use mock::{MockTransport, TransportCall};
pub use traits::{CreateSessionReply, CreateSessionRequest, SessionTransport};
