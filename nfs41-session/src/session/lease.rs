//! Lease renewal
//!
//! Once the lease time is known, a session runs one background task that
//! wakes every two thirds of the lease and sends a bare keepalive through
//! the normal sequencing path. A failed keepalive is logged and counted;
//! the task keeps running and the next cycle, or an explicit renew, is the
//! recovery path.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{Session, SessionState};
use crate::error::{Result, SessionError};
use crate::events::SessionEvent;

/// Handle to a running renewal task
#[derive(Debug)]
pub(crate) struct LeaseRenewal {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl LeaseRenewal {
    pub(crate) fn cancel(&self) {
        self.shutdown.cancel();
    }
}

/// Time between keepalives for a lease of `lease_seconds`
pub fn renewal_interval(lease_seconds: u32) -> Duration {
    Duration::from_millis(u64::from(lease_seconds) * 2000 / 3)
}

impl Session {
    /// Record the negotiated lease and start the renewal task.
    ///
    /// Only a `Valid` session whose renewal has not been stopped by
    /// teardown accepts a lease. A zero lease and a second call while a
    /// renewal task exists are both rejected without side effects.
    pub async fn set_lease_timer(self: &Arc<Self>, lease_seconds: u32) -> Result<()> {
        let mut renewal = self.renewal.lock().await;

        let state = self.state().await;
        if state != SessionState::Valid || self.renewal_closed.load(Ordering::SeqCst) {
            error!(session_id = %self.id(), %state, "Lease timer set on a session being torn down");
            return Err(SessionError::InvalidState {
                expected: SessionState::Valid.to_string(),
                actual: if state == SessionState::Valid {
                    "tearing down".to_string()
                } else {
                    state.to_string()
                },
            });
        }

        if renewal.is_some() {
            error!(session_id = %self.id(), "Session renewal task already started");
            return Err(SessionError::RenewalAlreadyRunning);
        }

        if lease_seconds == 0 {
            error!(session_id = %self.id(), "Invalid lease time 0");
            return Err(SessionError::InvalidLease);
        }

        self.lease_seconds.store(lease_seconds, Ordering::SeqCst);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_renewal(
            Arc::downgrade(self),
            renewal_interval(lease_seconds),
            shutdown.clone(),
        ));
        *renewal = Some(LeaseRenewal { shutdown, handle });

        info!(session_id = %self.id(), lease_seconds, "Lease renewal started");
        Ok(())
    }

    /// Negotiated lease, once set
    pub fn lease(&self) -> Option<Duration> {
        match self.lease_seconds.load(Ordering::SeqCst) {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }

    /// Whether a renewal task has been started and not yet stopped
    pub async fn has_renewal_task(&self) -> bool {
        self.renewal.lock().await.is_some()
    }

    /// Send one keepalive on a fresh slot.
    ///
    /// A completed keepalive advances the slot's sequence number so the
    /// next one is not answered from the reply cache.
    pub async fn send_keepalive(&self) -> Result<()> {
        let args = self.sequence(false).await?;
        let result = self.transport.send_sequence(&args).await;

        if result.is_ok() {
            self.bump_sequence(args.slot_id).await?;
        }
        self.free_slot(args.slot_id).await?;

        result.map_err(SessionError::from)
    }

    /// Stop renewal for good: later lease timers are refused. A running
    /// task is signalled and given up to `timeout` to exit, then aborted.
    ///
    /// Must be called without the client's session lock held, since an
    /// in-flight keepalive needs it to finish.
    pub(crate) async fn stop_renewal(&self, timeout: Duration) {
        let running = {
            let mut renewal = self.renewal.lock().await;
            self.renewal_closed.store(true, Ordering::SeqCst);
            renewal.take()
        };
        let Some(LeaseRenewal { shutdown, handle }) = running else {
            return;
        };

        debug!(session_id = %self.id(), "Stopping lease renewal");
        shutdown.cancel();

        let abort = handle.abort_handle();
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => debug!(session_id = %self.id(), "Lease renewal stopped"),
            Ok(Err(e)) => warn!(session_id = %self.id(), error = %e, "Lease renewal task panicked"),
            Err(_) => {
                warn!(
                    session_id = %self.id(),
                    ?timeout,
                    "Lease renewal did not stop in time, aborting"
                );
                abort.abort();
            }
        }
    }

    fn record_renewal_failure(&self, error: &SessionError) {
        let failures = self.renewal_failures.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(
            session_id = %self.id(),
            error = %error,
            failures,
            "Lease renewal keepalive failed"
        );

        if let Ok(client) = self.client() {
            client.emit(SessionEvent::RenewalFailed {
                session_id: self.id(),
                error: error.to_string(),
            });
        }
    }
}

async fn run_renewal(session: Weak<Session>, interval: Duration, shutdown: CancellationToken) {
    debug!(?interval, "Renewal task started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(session) = session.upgrade() else {
            break;
        };

        if let Err(e) = session.send_keepalive().await {
            session.record_renewal_failure(&e);
        }
    }

    debug!("Renewal task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::config::SessionConfig;
    use crate::error::TransportError;
    use crate::session::SessionLifecycle;
    use crate::transport::MockTransport;

    async fn create_test_session() -> (Arc<MockTransport>, SessionLifecycle, Arc<Session>) {
        let transport = Arc::new(MockTransport::new());
        let lifecycle = SessionLifecycle::new(Client::new(
            transport.clone(),
            SessionConfig::default().with_max_slots(4),
        ));
        let session = lifecycle.create().await.unwrap();
        (transport, lifecycle, session)
    }

    #[test]
    fn renewal_interval_is_two_thirds_of_lease() {
        assert_eq!(renewal_interval(90), Duration::from_secs(60));
        assert_eq!(renewal_interval(1), Duration::from_millis(666));
    }

    #[tokio::test]
    async fn zero_lease_is_rejected_without_side_effects() {
        let (_transport, _lifecycle, session) = create_test_session().await;

        let result = session.set_lease_timer(0).await;

        assert!(matches!(result, Err(SessionError::InvalidLease)));
        assert!(session.lease().is_none());
        assert!(!session.has_renewal_task().await);
    }

    #[tokio::test]
    async fn second_lease_timer_is_rejected() {
        let (_transport, _lifecycle, session) = create_test_session().await;

        session.set_lease_timer(30).await.unwrap();
        let result = session.set_lease_timer(45).await;

        assert!(matches!(result, Err(SessionError::RenewalAlreadyRunning)));
        assert_eq!(session.lease(), Some(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn lease_timer_after_destroy_is_rejected() {
        let (transport, lifecycle, session) = create_test_session().await;
        session.set_lease_timer(3).await.unwrap();
        lifecycle.destroy(Arc::clone(&session)).await.unwrap();

        let result = session.set_lease_timer(3).await;
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert!(matches!(result, Err(SessionError::InvalidState { .. })));
        assert!(!session.has_renewal_task().await);
        assert!(transport.sequence_calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lease_timer_after_renewal_stopped_is_rejected() {
        let (transport, _lifecycle, session) = create_test_session().await;

        // Teardown stops renewal before the session leaves `Valid`.
        session.stop_renewal(Duration::from_secs(1)).await;
        assert!(session.is_valid().await);

        let result = session.set_lease_timer(3).await;
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert!(matches!(
            result,
            Err(SessionError::InvalidState { ref actual, .. }) if actual == "tearing down"
        ));
        assert!(session.lease().is_none());
        assert!(transport.sequence_calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_sends_uncached_keepalives() {
        let (transport, _lifecycle, session) = create_test_session().await;
        session.set_lease_timer(3).await.unwrap();

        tokio::time::sleep(Duration::from_millis(4100)).await;

        let keepalives = transport.sequence_calls().await;
        assert_eq!(keepalives.len(), 2);
        assert!(keepalives.iter().all(|args| !args.cache_this));
        assert!(keepalives.iter().all(|args| args.session_id == session.id()));
        assert_eq!(keepalives[0].sequence_id, 1);
        assert_eq!(keepalives[1].sequence_id, 2);
        assert_eq!(session.table().snapshot().await.num_used, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_failure_does_not_stop_task() {
        let (transport, lifecycle, session) = create_test_session().await;
        let mut events = lifecycle.client().subscribe();
        transport
            .queue_sequence_failure(TransportError::Unreachable("down".to_string()))
            .await;

        session.set_lease_timer(3).await.unwrap();
        tokio::time::sleep(Duration::from_millis(4100)).await;

        assert_eq!(session.renewal_failures(), 1);
        assert_eq!(transport.sequence_calls().await.len(), 2);
        assert!(session.has_renewal_task().await);

        let event = events.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::RenewalFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_keepalive_frees_slot_without_bump() {
        let (transport, _lifecycle, session) = create_test_session().await;
        transport
            .queue_sequence_failure(TransportError::Rejected("bad".to_string()))
            .await;

        assert!(session.send_keepalive().await.is_err());

        let snapshot = session.table().snapshot().await;
        assert_eq!(snapshot.num_used, 0);
        assert_eq!(snapshot.seq_nums[0], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_renewal_ends_task() {
        let (transport, _lifecycle, session) = create_test_session().await;
        session.set_lease_timer(3).await.unwrap();

        session.stop_renewal(Duration::from_secs(1)).await;
        assert!(!session.has_renewal_task().await);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(transport.sequence_calls().await.is_empty());
    }
}
