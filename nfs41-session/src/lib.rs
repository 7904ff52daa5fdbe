//! nfs41-session: client-side session layer for NFSv4.1
//!
//! This crate provides the pieces that decide how a request obtains its
//! slot and sequence number, and how the session behind them is kept alive:
//!
//! - **Slot table** - [`SlotTable`] bounds in-flight requests and hands out
//!   per-slot sequence numbers for the server's duplicate request cache
//! - **Sessions** - [`Session`] stamps requests via [`Session::sequence`] and
//!   returns slots with [`Session::free_slot`]
//! - **Lifecycle** - [`SessionLifecycle`] creates, renews and destroys the
//!   session owned by a [`Client`]
//! - **Lease renewal** - [`Session::set_lease_timer`] starts a background
//!   keepalive task
//!
//! Wire encoding and the connection itself sit behind [`SessionTransport`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use nfs41_session::{Client, MockTransport, SessionConfig, SessionLifecycle};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(Arc::new(MockTransport::new()), SessionConfig::default());
//!     let lifecycle = SessionLifecycle::new(client);
//!
//!     let session = lifecycle.create().await?;
//!     session.set_lease_timer(90).await?;
//!
//!     let args = session.sequence(true).await?;
//!     // ... send the request carrying `args` ...
//!     // A completed request advances its slot's sequence before release.
//!     session.bump_sequence(args.slot_id).await?;
//!     session.free_slot(args.slot_id).await?;
//!
//!     lifecycle.destroy(session).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Lock order
//!
//! ```text
//! Client session lock (RwLock, shared for slot ops, exclusive for lifecycle)
//!   └── SlotTable mutex
//!         └── slot availability wakeup (Notify, waited on with no lock held)
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod slot_table;
pub mod transport;

// Re-export key types for convenience
pub use client::{Client, ClientCapabilities};
pub use config::SessionConfig;
pub use error::{ConfigError, Result, SessionError, TransportError};
pub use events::SessionEvent;
pub use session::{
    CallbackSession, CreateSessionFlags, SequenceArgs, Session, SessionId, SessionLifecycle,
    SessionState,
};
pub use slot_table::{SlotGrant, SlotTable, SlotTableSnapshot};
pub use transport::{
    CreateSessionReply, CreateSessionRequest, MockTransport, SessionTransport, TransportCall,
};
