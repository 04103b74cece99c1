use crate::domain::{HubHandle, Payload};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one subscriber connection, never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Frame observed from the subscriber; contents are never interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundFrame {
    Data,
    Close,
}

/// Frame written to the subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Payload(Payload),
    Ping,
    Close,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Outbound queue capacity, the slow-consumer threshold
    pub queue_capacity: usize,
    pub ping_interval: Duration,
    /// Maximum silence from the subscriber before the connection is considered dead
    pub pong_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            ping_interval: Duration::from_secs(54),
            pong_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// One live subscriber: a registered outbound queue plus its two pumps
pub struct Session {
    id: SessionId,
    hub: HubHandle,
    outbound: mpsc::Receiver<Payload>,
    config: SessionConfig,
}

impl Session {
    /// Create the session's queue and register it with the hub
    ///
    /// Only the hub holds the producer side, so the queue closes as soon as
    /// the hub forgets the session.
    pub fn open(hub: &HubHandle, config: SessionConfig) -> Self {
        let (outbound_tx, outbound) = mpsc::channel(config.queue_capacity.max(1));
        let id = SessionId::next();
        hub.register(id, outbound_tx);

        Self {
            id,
            hub: hub.clone(),
            outbound,
            config,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Drive both pumps until the connection ends or `token` is cancelled
    pub async fn run<S, R, E>(self, sink: S, stream: R, token: &CancellationToken)
    where
        S: Sink<OutboundFrame> + Unpin + Send,
        S::Error: fmt::Display,
        R: Stream<Item = Result<InboundFrame, E>> + Unpin + Send,
        E: fmt::Display,
    {
        let Session {
            id,
            hub,
            outbound,
            config,
        } = self;

        let session_token = token.child_token();
        let unregister = UnregisterOnce::new(id, hub);

        tokio::join!(
            read_pump(id, stream, config.pong_timeout, &unregister, &session_token),
            write_pump(id, sink, outbound, &config, &unregister, &session_token),
        );
    }
}

/// Collapses unregister requests from both pumps into one
struct UnregisterOnce {
    id: SessionId,
    hub: HubHandle,
    fired: AtomicBool,
}

impl UnregisterOnce {
    fn new(id: SessionId, hub: HubHandle) -> Self {
        Self {
            id,
            hub,
            fired: AtomicBool::new(false),
        }
    }

    fn fire(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            self.hub.unregister(self.id);
        }
    }
}

async fn read_pump<R, E>(
    id: SessionId,
    mut stream: R,
    pong_timeout: Duration,
    unregister: &UnregisterOnce,
    token: &CancellationToken,
) where
    R: Stream<Item = Result<InboundFrame, E>> + Unpin,
    E: fmt::Display,
{
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            next = timeout(pong_timeout, stream.next()) => match next {
                Ok(Some(Ok(InboundFrame::Data))) => continue,
                Ok(Some(Ok(InboundFrame::Close))) | Ok(None) => {
                    debug!(session_id = %id, "subscriber closed connection");
                    break;
                }
                Ok(Some(Err(e))) => {
                    debug!(session_id = %id, error = %e, "subscriber read failed");
                    break;
                }
                Err(_) => {
                    debug!(session_id = %id, timeout = ?pong_timeout, "subscriber went silent");
                    break;
                }
            }
        }
    }

    unregister.fire();
    token.cancel();
}

async fn write_pump<S>(
    id: SessionId,
    mut sink: S,
    mut outbound: mpsc::Receiver<Payload>,
    config: &SessionConfig,
    unregister: &UnregisterOnce,
    token: &CancellationToken,
) where
    S: Sink<OutboundFrame> + Unpin,
    S::Error: fmt::Display,
{
    let mut ping = interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            biased;

            _ = token.cancelled() => break,
            payload = outbound.recv() => match payload {
                Some(payload) => OutboundFrame::Payload(payload),
                // hub closed the queue
                None => OutboundFrame::Close,
            },
            _ = ping.tick() => OutboundFrame::Ping,
        };

        let closing = frame == OutboundFrame::Close;
        match timeout(config.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(session_id = %id, error = %e, "subscriber write failed");
                unregister.fire();
                break;
            }
            Err(_) => {
                warn!(session_id = %id, timeout = ?config.write_timeout, "subscriber write timed out");
                unregister.fire();
                break;
            }
        }

        if closing {
            break;
        }
    }

    token.cancel();
}
