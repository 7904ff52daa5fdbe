//! Session lifecycle management
//!
//! Creates, renews and destroys sessions. Installing, renewing and
//! destroying all happen under the client's session lock held
//! exclusively, which orders them against every slot operation.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::callback::CallbackSession;
use super::state::{Session, SessionState};
use super::types::CreateSessionFlags;
use crate::client::Client;
use crate::error::{Result, SessionError};
use crate::events::SessionEvent;
use crate::slot_table::SlotTable;
use crate::transport::CreateSessionRequest;

/// Drives session establishment, renewal and teardown for one client
pub struct SessionLifecycle {
    client: Arc<Client>,
}

impl SessionLifecycle {
    /// Create a lifecycle manager for `client`
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Establish a new session and install it as the client's current session.
    ///
    /// On handshake failure nothing is installed and the client's current
    /// session is left untouched.
    pub async fn create(&self) -> Result<Arc<Session>> {
        let table = SlotTable::new(self.client.config().max_slots);
        let callback = CallbackSession::new();

        let request = CreateSessionRequest {
            existing: None,
            flags: self.creation_flags().await,
            max_slots: table.capacity(),
        };

        let reply = self
            .client
            .transport()
            .create_session(&request)
            .await
            .map_err(|e| {
                error!(error = %e, "Session handshake failed");
                SessionError::HandshakeFailed(e)
            })?;

        table.set_max_slots(reply.max_slots).await;
        let session = Arc::new(Session::new(&self.client, table, callback, &reply));

        {
            let mut current = self.client.session_lock().write().await;
            *current = Some(Arc::clone(&session));
            session.set_state(SessionState::Valid).await;
        }

        info!(
            session_id = %session.id(),
            flags = session.flags().bits(),
            max_slots = reply.max_slots,
            "Session established"
        );
        self.client.emit(SessionEvent::Established {
            session_id: session.id(),
        });

        Ok(session)
    }

    /// Reset the slot table and callback sequence, then rebind the
    /// session's existing identity with the server.
    ///
    /// On handshake failure the session keeps its reset table and its
    /// current state; callers re-check validity.
    pub async fn renew(&self, session: &Session) -> Result<()> {
        self.check_owned(session)?;

        let _current = self.client.session_lock().write().await;

        let state = session.state().await;
        if state != SessionState::Valid {
            return Err(SessionError::InvalidState {
                expected: SessionState::Valid.to_string(),
                actual: state.to_string(),
            });
        }

        session.callback.reset();
        session.table.initialize().await;

        let request = CreateSessionRequest {
            existing: Some(session.id()),
            flags: session.flags(),
            max_slots: session.table.capacity(),
        };

        match self.client.transport().create_session(&request).await {
            Ok(reply) => {
                session.table.set_max_slots(reply.max_slots).await;
                session.set_flags(reply.flags);
                info!(session_id = %session.id(), max_slots = reply.max_slots, "Session renewed");
                self.client.emit(SessionEvent::Renewed {
                    session_id: session.id(),
                });
                Ok(())
            }
            Err(e) => {
                error!(session_id = %session.id(), error = %e, "Session rebind failed");
                Err(SessionError::HandshakeFailed(e))
            }
        }
    }

    /// Tear a session down.
    ///
    /// The renewal task is stopped first, then under the exclusive lock a
    /// valid session is invalidated on the transport and destroyed on the
    /// server. The session ends `Freed` even if the destroy handshake
    /// fails; that failure is still returned.
    pub async fn destroy(&self, session: Arc<Session>) -> Result<()> {
        self.check_owned(&session)?;

        session
            .stop_renewal(self.client.config().renewal_shutdown_timeout)
            .await;

        let mut result = Ok(());
        {
            let mut current = self.client.session_lock().write().await;

            let state = session.state().await;
            if state == SessionState::Freed {
                return Err(SessionError::InvalidState {
                    expected: SessionState::Valid.to_string(),
                    actual: state.to_string(),
                });
            }

            if state == SessionState::Valid {
                session.set_state(SessionState::Invalid).await;
                self.client.transport().invalidate_session();

                if let Err(e) = self.client.transport().destroy_session(&session.id()).await {
                    warn!(session_id = %session.id(), error = %e, "Destroy handshake failed");
                    result = Err(SessionError::Transport(e));
                }
            }

            if current
                .as_ref()
                .is_some_and(|installed| Arc::ptr_eq(installed, &session))
            {
                *current = None;
            }
            session.set_state(SessionState::Freed).await;
        }

        info!(session_id = %session.id(), "Session destroyed");
        self.client.emit(SessionEvent::Destroyed {
            session_id: session.id(),
        });

        result
    }

    /// Flags for a new session from the client's capabilities and config
    async fn creation_flags(&self) -> CreateSessionFlags {
        let mut flags = CreateSessionFlags::empty();

        if self.client.capabilities().await.needs_back_channel {
            flags.insert(CreateSessionFlags::CONN_BACK_CHAN);
        }
        if self.client.config().persist {
            flags.insert(CreateSessionFlags::PERSIST);
        }
        flags
    }

    fn check_owned(&self, session: &Session) -> Result<()> {
        if session.belongs_to(&self.client) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                expected: "session of this client".to_string(),
                actual: format!("session {} of another client", session.id()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientCapabilities;
    use crate::config::SessionConfig;
    use crate::error::TransportError;
    use crate::transport::{MockTransport, TransportCall};

    fn create_test_lifecycle(
        transport: MockTransport,
        config: SessionConfig,
    ) -> (Arc<MockTransport>, SessionLifecycle) {
        let transport = Arc::new(transport);
        let lifecycle = SessionLifecycle::new(Client::new(transport.clone(), config));
        (transport, lifecycle)
    }

    // ==================== Create Tests ====================

    #[tokio::test]
    async fn create_installs_valid_session() {
        let (transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());

        let session = lifecycle.create().await.unwrap();

        let current = lifecycle.client().current_session().await.unwrap();
        assert!(Arc::ptr_eq(&current, &session));
        assert!(session.is_valid().await);
        assert!(transport.is_session_valid());
    }

    #[tokio::test]
    async fn create_failure_leaves_client_without_session() {
        let (transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        transport
            .queue_create_failure(TransportError::Rejected("denied".to_string()))
            .await;

        let result = lifecycle.create().await;

        assert!(matches!(result, Err(SessionError::HandshakeFailed(_))));
        assert!(lifecycle.client().current_session().await.is_none());
    }

    #[tokio::test]
    async fn create_failure_keeps_previous_session() {
        let (transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        let first = lifecycle.create().await.unwrap();
        transport
            .queue_create_failure(TransportError::Unreachable("timeout".to_string()))
            .await;

        assert!(lifecycle.create().await.is_err());

        let current = lifecycle.client().current_session().await.unwrap();
        assert!(Arc::ptr_eq(&current, &first));
    }

    #[tokio::test]
    async fn create_flags_follow_capabilities_and_config() {
        let (_transport, lifecycle) = create_test_lifecycle(
            MockTransport::new(),
            SessionConfig::default().with_persist(false),
        );
        lifecycle
            .client()
            .set_capabilities(ClientCapabilities {
                needs_back_channel: true,
            })
            .await;

        let session = lifecycle.create().await.unwrap();

        assert!(session.flags().contains(CreateSessionFlags::CONN_BACK_CHAN));
        assert!(!session.flags().contains(CreateSessionFlags::PERSIST));
    }

    #[tokio::test]
    async fn create_requests_persist_by_default() {
        let (transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());

        lifecycle.create().await.unwrap();

        let calls = transport.calls().await;
        let TransportCall::CreateSession(request) = &calls[0] else {
            panic!("expected create_session call, got {:?}", calls[0]);
        };
        assert!(request.existing.is_none());
        assert!(request.flags.contains(CreateSessionFlags::PERSIST));
        assert!(!request.flags.contains(CreateSessionFlags::CONN_BACK_CHAN));
    }

    #[tokio::test]
    async fn create_applies_granted_slot_count() {
        let (_transport, lifecycle) = create_test_lifecycle(
            MockTransport::new().with_granted_slots(2),
            SessionConfig::default().with_max_slots(8),
        );

        let session = lifecycle.create().await.unwrap();

        assert_eq!(session.table().capacity(), 8);
        assert_eq!(session.table().max_slots().await, 2);
    }

    // ==================== Renew Tests ====================

    #[tokio::test]
    async fn renew_resets_table_and_keeps_identity() {
        let (transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        let session = lifecycle.create().await.unwrap();

        let args = session.sequence(true).await.unwrap();
        session.bump_sequence(args.slot_id).await.unwrap();
        session.callback().set_sequence(5);

        lifecycle.renew(&session).await.unwrap();

        let snapshot = session.table().snapshot().await;
        assert_eq!(snapshot.num_used, 0);
        assert!(snapshot.seq_nums.iter().all(|seq| *seq == 1));
        assert_eq!(session.callback_sequence(), 0);

        let calls = transport.calls().await;
        let TransportCall::CreateSession(request) = calls.last().unwrap() else {
            panic!("expected rebind handshake");
        };
        assert_eq!(request.existing, Some(session.id()));
    }

    #[tokio::test]
    async fn renew_failure_leaves_session_reset_and_valid() {
        let (transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        let session = lifecycle.create().await.unwrap();
        session.sequence(false).await.unwrap();
        transport
            .queue_create_failure(TransportError::BadResponse("garbled".to_string()))
            .await;

        let result = lifecycle.renew(&session).await;

        assert!(matches!(result, Err(SessionError::HandshakeFailed(_))));
        assert_eq!(session.table().snapshot().await.num_used, 0);
        assert!(session.is_valid().await);
    }

    #[tokio::test]
    async fn renew_after_destroy_is_invalid_state() {
        let (_transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        let session = lifecycle.create().await.unwrap();
        lifecycle.destroy(Arc::clone(&session)).await.unwrap();

        let result = lifecycle.renew(&session).await;
        assert!(matches!(result, Err(SessionError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn renew_rejects_session_of_other_client() {
        let (_transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        let (_other_transport, other) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        let foreign = other.create().await.unwrap();

        let result = lifecycle.renew(&foreign).await;
        assert!(matches!(result, Err(SessionError::InvalidState { .. })));
    }

    // ==================== Destroy Tests ====================

    #[tokio::test]
    async fn destroy_sends_handshake_and_clears_current() {
        let (transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        let session = lifecycle.create().await.unwrap();
        let id = session.id();

        lifecycle.destroy(Arc::clone(&session)).await.unwrap();

        assert_eq!(session.state().await, SessionState::Freed);
        assert!(lifecycle.client().current_session().await.is_none());
        assert!(!transport.is_session_valid());
        assert_eq!(
            transport.calls().await.last(),
            Some(&TransportCall::DestroySession(id))
        );
    }

    #[tokio::test]
    async fn destroy_handshake_failure_still_frees() {
        let (transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        let session = lifecycle.create().await.unwrap();
        transport
            .queue_destroy_failure(TransportError::Unreachable("gone".to_string()))
            .await;

        let result = lifecycle.destroy(Arc::clone(&session)).await;

        assert!(matches!(result, Err(SessionError::Transport(_))));
        assert_eq!(session.state().await, SessionState::Freed);
        assert!(lifecycle.client().current_session().await.is_none());
    }

    #[tokio::test]
    async fn destroy_twice_is_invalid_state() {
        let (transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        let session = lifecycle.create().await.unwrap();
        lifecycle.destroy(Arc::clone(&session)).await.unwrap();

        let result = lifecycle.destroy(Arc::clone(&session)).await;

        assert!(matches!(result, Err(SessionError::InvalidState { .. })));
        let destroys = transport
            .calls()
            .await
            .into_iter()
            .filter(|call| matches!(call, TransportCall::DestroySession(_)))
            .count();
        assert_eq!(destroys, 1);
    }

    #[tokio::test]
    async fn destroy_old_session_keeps_newer_current() {
        let (_transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        let old = lifecycle.create().await.unwrap();
        let new = lifecycle.create().await.unwrap();

        lifecycle.destroy(old).await.unwrap();

        let current = lifecycle.client().current_session().await.unwrap();
        assert!(Arc::ptr_eq(&current, &new));
    }

    #[tokio::test]
    async fn lifecycle_events_are_published() {
        let (_transport, lifecycle) =
            create_test_lifecycle(MockTransport::new(), SessionConfig::default());
        let mut events = lifecycle.client().subscribe();

        let session = lifecycle.create().await.unwrap();
        lifecycle.renew(&session).await.unwrap();
        lifecycle.destroy(Arc::clone(&session)).await.unwrap();

        let id = session.id();
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Established { session_id: id });
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Renewed { session_id: id });
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Destroyed { session_id: id });
    }
}
