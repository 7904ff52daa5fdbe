//! Client that owns the current session
//!
//! The client's session lock is the outermost lock of the session layer.
//! Anything that consults the current session (slot acquisition, release,
//! sequence bumps) takes it shared; installing, renewing and destroying a
//! session take it exclusively. Slot table locks nest inside it.

use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};

use crate::config::SessionConfig;
use crate::events::SessionEvent;
use crate::session::Session;
use crate::transport::SessionTransport;

/// Capabilities negotiated during identity exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientCapabilities {
    /// The server must be able to call back over the fore channel connection
    pub needs_back_channel: bool,
}

/// A client of one server, holding at most one live session
pub struct Client {
    /// Current session; this lock orders session access against install/renew/destroy
    session: RwLock<Option<Arc<Session>>>,
    capabilities: RwLock<ClientCapabilities>,
    transport: Arc<dyn SessionTransport>,
    config: SessionConfig,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Client {
    /// Create a client with no session
    pub fn new(transport: Arc<dyn SessionTransport>, config: SessionConfig) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Arc::new(Self {
            session: RwLock::new(None),
            capabilities: RwLock::new(ClientCapabilities::default()),
            transport,
            config,
            event_tx,
        })
    }

    /// The currently installed session, if any
    pub async fn current_session(&self) -> Option<Arc<Session>> {
        self.session.read().await.clone()
    }

    /// Negotiated capabilities
    pub async fn capabilities(&self) -> ClientCapabilities {
        *self.capabilities.read().await
    }

    /// Record capabilities learned from identity exchange
    pub async fn set_capabilities(&self, capabilities: ClientCapabilities) {
        *self.capabilities.write().await = capabilities;
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn SessionTransport> {
        &self.transport
    }

    pub(crate) fn session_lock(&self) -> &RwLock<Option<Arc<Session>>> {
        &self.session
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}
