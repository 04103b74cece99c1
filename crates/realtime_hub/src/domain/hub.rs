use crate::domain::SessionId;
use async_trait::async_trait;
use axum::extract::ws::Utf8Bytes;
use common::{encode_reading, DomainError, DomainResult, Reading, ReadingBroadcaster};
use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Serialized message delivered to every subscriber
pub type Payload = Utf8Bytes;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("hub dispatch loop has stopped")]
    Stopped,
}

/// A new session and the producer side of its outbound queue
#[derive(Debug)]
pub struct Registration {
    pub session_id: SessionId,
    pub outbound: mpsc::Sender<Payload>,
}

/// Single-writer owner of the subscriber registry
///
/// Every mutation of the registry happens inside [`Hub::run`]; other tasks
/// talk to it through a [`HubHandle`].
pub struct Hub {
    sessions: HashMap<SessionId, mpsc::Sender<Payload>>,
    register_rx: mpsc::UnboundedReceiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<SessionId>,
    broadcast_rx: mpsc::Receiver<Payload>,
    stats_rx: mpsc::UnboundedReceiver<oneshot::Sender<usize>>,
}

impl Hub {
    /// Create a hub whose broadcast stream buffers up to `broadcast_capacity` payloads
    pub fn new(broadcast_capacity: usize) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(broadcast_capacity.max(1));
        let (stats_tx, stats_rx) = mpsc::unbounded_channel();

        let hub = Self {
            sessions: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            stats_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            stats_tx,
        };

        (hub, handle)
    }

    /// Dispatch loop. Returns once `token` is cancelled.
    ///
    /// Pending events are not drained on shutdown and live sessions are not
    /// closed explicitly.
    pub async fn run(&mut self, token: CancellationToken) {
        info!("hub dispatch loop started");

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!("hub received shutdown signal");
                    break;
                }
                Some(registration) = self.register_rx.recv() => {
                    self.handle_register(registration);
                }
                Some(session_id) = self.unregister_rx.recv() => {
                    self.handle_unregister(session_id);
                }
                Some(payload) = self.broadcast_rx.recv() => {
                    self.handle_broadcast(payload);
                }
                Some(reply) = self.stats_rx.recv() => {
                    let _ = reply.send(self.sessions.len());
                }
            }
        }

        info!(
            subscribers = self.sessions.len(),
            "hub dispatch loop stopped"
        );
    }

    /// Number of registered sessions, as seen by the dispatch loop
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn handle_register(&mut self, registration: Registration) {
        let Registration {
            session_id,
            outbound,
        } = registration;

        self.sessions.insert(session_id, outbound);
        debug!(
            session_id = %session_id,
            subscribers = self.sessions.len(),
            "session registered"
        );
    }

    fn handle_unregister(&mut self, session_id: SessionId) {
        // dropping the sender closes the session's queue
        if self.sessions.remove(&session_id).is_some() {
            debug!(
                session_id = %session_id,
                subscribers = self.sessions.len(),
                "session unregistered"
            );
        }
    }

    fn handle_broadcast(&mut self, payload: Payload) {
        self.sessions
            .retain(|session_id, outbound| match outbound.try_send(payload.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(session_id = %session_id, "evicting slow subscriber, outbound queue full");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(session_id = %session_id, "dropping session with closed queue");
                    false
                }
            });
    }
}

/// Cloneable client side of the [`Hub`]
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<Registration>,
    unregister_tx: mpsc::UnboundedSender<SessionId>,
    broadcast_tx: mpsc::Sender<Payload>,
    stats_tx: mpsc::UnboundedSender<oneshot::Sender<usize>>,
}

impl HubHandle {
    /// Add a session. A stopped hub drops the request, which closes the queue.
    pub fn register(&self, session_id: SessionId, outbound: mpsc::Sender<Payload>) {
        let _ = self.register_tx.send(Registration {
            session_id,
            outbound,
        });
    }

    /// Remove a session if present
    pub fn unregister(&self, session_id: SessionId) {
        let _ = self.unregister_tx.send(session_id);
    }

    /// Queue `payload` for every registered session
    pub async fn broadcast(&self, payload: Payload) -> Result<(), HubError> {
        self.broadcast_tx
            .send(payload)
            .await
            .map_err(|_| HubError::Stopped)
    }

    /// Ask the dispatch loop how many sessions are registered
    ///
    /// The query is answered in order with the other events, so it reflects
    /// every register and unregister sent from this handle before it.
    /// Fails with [`HubError::Stopped`] once the hub has exited.
    pub async fn subscriber_count(&self) -> Result<usize, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.stats_tx
            .send(reply_tx)
            .map_err(|_| HubError::Stopped)?;
        reply_rx.await.map_err(|_| HubError::Stopped)
    }
}

#[async_trait]
impl ReadingBroadcaster for HubHandle {
    async fn broadcast_reading(&self, reading: &Reading) -> DomainResult<()> {
        let payload = encode_reading(reading)?;
        self.broadcast(Payload::from(payload))
            .await
            .map_err(|e| DomainError::Broadcast(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(hub: &mut Hub, capacity: usize) -> (SessionId, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity);
        let session_id = SessionId::next();
        hub.handle_register(Registration {
            session_id,
            outbound: tx,
        });
        (session_id, rx)
    }

    #[test]
    fn test_duplicate_register_keeps_one_entry() {
        let (mut hub, _handle) = Hub::new(8);
        let (tx, _rx) = mpsc::channel(4);
        let session_id = SessionId::next();

        hub.handle_register(Registration {
            session_id,
            outbound: tx.clone(),
        });
        hub.handle_register(Registration {
            session_id,
            outbound: tx,
        });

        assert_eq!(hub.session_count(), 1);
    }

    #[test]
    fn test_unregistered_session_receives_no_broadcast() {
        let (mut hub, _handle) = Hub::new(8);
        let (kept, mut kept_rx) = session(&mut hub, 4);
        let (removed, mut removed_rx) = session(&mut hub, 4);

        hub.handle_unregister(removed);
        hub.handle_broadcast(Payload::from("hello"));

        assert_eq!(kept_rx.try_recv().unwrap().as_str(), "hello");
        // queue closed by the hub, nothing delivered
        assert!(matches!(
            removed_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(hub.session_count(), 1);
        assert_ne!(kept, removed);
    }

    #[test]
    fn test_double_unregister_is_noop() {
        let (mut hub, _handle) = Hub::new(8);
        let (session_id, _rx) = session(&mut hub, 4);

        hub.handle_unregister(session_id);
        hub.handle_unregister(session_id);

        assert_eq!(hub.session_count(), 0);
    }

    #[test]
    fn test_full_queue_evicts_slow_subscriber() {
        let (mut hub, _handle) = Hub::new(8);
        let (_slow, mut slow_rx) = session(&mut hub, 2);
        let (_fast, mut fast_rx) = session(&mut hub, 8);

        hub.handle_broadcast(Payload::from("m1"));
        hub.handle_broadcast(Payload::from("m2"));
        assert_eq!(hub.session_count(), 2);

        // slow queue is at capacity, next broadcast evicts it
        hub.handle_broadcast(Payload::from("m3"));
        assert_eq!(hub.session_count(), 1);

        assert_eq!(slow_rx.try_recv().unwrap().as_str(), "m1");
        assert_eq!(slow_rx.try_recv().unwrap().as_str(), "m2");
        assert!(matches!(
            slow_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        for expected in ["m1", "m2", "m3"] {
            assert_eq!(fast_rx.try_recv().unwrap().as_str(), expected);
        }
    }

    #[test]
    fn test_broadcast_without_subscribers_is_noop() {
        let (mut hub, _handle) = Hub::new(8);
        hub.handle_broadcast(Payload::from("nobody"));
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_hub_ignores_pending_events() {
        let (mut hub, handle) = Hub::new(8);
        let token = CancellationToken::new();
        token.cancel();

        let (tx, _rx) = mpsc::channel(4);
        handle.register(SessionId::next(), tx);
        handle.broadcast(Payload::from("late")).await.unwrap();

        hub.run(token).await;
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_handle_round_trip_through_dispatch_loop() {
        let (mut hub, handle) = Hub::new(8);
        let token = CancellationToken::new();
        let run_token = token.clone();
        let task = tokio::spawn(async move {
            hub.run(run_token).await;
            hub
        });

        let (tx, mut rx) = mpsc::channel(4);
        let session_id = SessionId::next();
        handle.register(session_id, tx);
        assert_eq!(handle.subscriber_count().await.unwrap(), 1);

        let reading = Reading {
            device_id: "dev-1".to_string(),
            timestamp_ms: 1000,
            illumination: 42,
            motion_detected: false,
        };
        handle.broadcast_reading(&reading).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap().as_str(),
            r#"{"device_id":"dev-1","timestamp_ms":1000,"ldr":42,"pir":false}"#
        );

        handle.unregister(session_id);
        assert_eq!(handle.subscriber_count().await.unwrap(), 0);
        assert!(rx.recv().await.is_none());

        token.cancel();
        let hub = task.await.unwrap();
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_stopped_hub_reports_error() {
        let (hub, handle) = Hub::new(8);
        drop(hub);

        assert_eq!(
            handle.broadcast(Payload::from("x")).await,
            Err(HubError::Stopped)
        );
        assert_eq!(handle.subscriber_count().await, Err(HubError::Stopped));
    }
}
