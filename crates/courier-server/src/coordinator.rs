//! Persistence-then-delivery for every outgoing message, plus the lifecycle
//! of push connections.
//!
//! A message is always written to the store before it is pushed anywhere.
//! Storage failures are returned to the caller; delivery failures only cost
//! immediacy, since the recipient will find the message on its next query.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use courier_shared::constants::DEFAULT_PUSH_BUFFER;
use courier_shared::{FrameError, InboundFrame, UserId};
use courier_store::{Message, MessageStore, NewMessage, SqliteStore, StoreError};

use crate::registry::{Connection, ConnectionRegistry, Outgoing};

/// Reported to a sender whose pushed frame could not be stored.
const STORE_FAILED_NOTICE: &str = "Failed to save message";

/// A unit read from a push transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Text(String),
    /// A binary frame of the given length; never valid for this protocol.
    Binary(usize),
    /// Transport-level liveness traffic (ping or pong); resets the idle
    /// deadline and nothing else.
    Keepalive,
    /// The peer asked to close.
    Close,
}

/// Run a blocking store operation off the async runtime.
pub(crate) async fn run_blocking<S, T, F>(store: &Arc<S>, op: F) -> Result<T, StoreError>
where
    S: MessageStore,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
}

pub struct DeliveryCoordinator<S = SqliteStore> {
    store: Arc<S>,
    registry: Arc<ConnectionRegistry>,
    push_buffer: usize,
    idle_timeout: Option<Duration>,
}

impl<S: MessageStore> DeliveryCoordinator<S> {
    pub fn new(store: Arc<S>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            store,
            registry,
            push_buffer: DEFAULT_PUSH_BUFFER,
            idle_timeout: None,
        }
    }

    pub fn with_push_buffer(mut self, push_buffer: usize) -> Self {
        self.push_buffer = push_buffer;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Persist a message, then push it to the recipient if connected.
    ///
    /// Fails only when persistence fails, in which case nothing is pushed.
    pub async fn send(&self, message: NewMessage) -> Result<Message, StoreError> {
        let stored = run_blocking(&self.store, move |store| store.persist(message))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to persist message");
                e
            })?;

        self.relay(&stored);
        Ok(stored)
    }

    /// Messages exchanged between two users, oldest first.
    pub async fn history(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError> {
        let (a, b) = (a.clone(), b.clone());
        run_blocking(&self.store, move |store| store.fetch_between(&a, &b)).await
    }

    /// Best-effort single push of a stored message.
    fn relay(&self, message: &Message) {
        let Some(conn) = self.registry.lookup(&message.receiver_id) else {
            debug!(
                message = %message.id,
                receiver = %message.receiver_id,
                "Recipient not connected, skipping push"
            );
            return;
        };

        match conn.push(message.clone()) {
            Ok(()) => debug!(
                message = %message.id,
                receiver = %message.receiver_id,
                conn = conn.id(),
                "Message pushed"
            ),
            Err(e) => {
                warn!(
                    message = %message.id,
                    receiver = %message.receiver_id,
                    conn = conn.id(),
                    error = %e,
                    "Push failed, dropping connection"
                );
                self.registry.detach(&conn);
                conn.close();
            }
        }
    }

    /// Register a new connection for `user_id`, closing any it replaces.
    pub fn attach(&self, user_id: UserId) -> (Connection, mpsc::Receiver<Outgoing>) {
        let (conn, receiver) = Connection::new(user_id, self.push_buffer);
        if let Some(previous) = self.registry.attach(conn.clone()) {
            info!(
                user = %conn.user_id(),
                replaced = previous.id(),
                conn = conn.id(),
                "Closing connection replaced by a newer attach"
            );
            previous.close();
        }
        info!(user = %conn.user_id(), conn = conn.id(), "User connected");
        (conn, receiver)
    }

    /// Remove the connection from the registry (if still current) and
    /// shut it down.
    pub fn detach(&self, conn: &Connection) {
        self.registry.detach(conn);
        conn.close();
        info!(user = %conn.user_id(), conn = conn.id(), "User disconnected");
    }

    /// Drive one push connection until either side closes.
    ///
    /// Every well-formed inbound frame is sent on behalf of `user_id`.
    /// Malformed frames are logged and dropped without closing the
    /// connection. With an idle timeout set, the peer is pinged at half
    /// that interval so a receive-only client stays attached.
    pub async fn handle_connection<R, E, W>(&self, user_id: UserId, inbound: R, outbound: W)
    where
        R: Stream<Item = Result<Incoming, E>> + Unpin,
        E: Display,
        W: Sink<Outgoing> + Unpin,
        W::Error: Display,
    {
        let (conn, receiver) = self.attach(user_id);

        let keepalive = self
            .idle_timeout
            .map(|idle| (idle / 2).max(Duration::from_millis(1)));

        tokio::join!(
            self.read_loop(&conn, inbound),
            write_loop(&conn, receiver, outbound, keepalive),
        );

        self.detach(&conn);
    }

    async fn read_loop<R, E>(&self, conn: &Connection, mut inbound: R)
    where
        R: Stream<Item = Result<Incoming, E>> + Unpin,
        E: Display,
    {
        loop {
            let next = tokio::select! {
                _ = conn.closed() => break,
                next = next_with_deadline(&mut inbound, self.idle_timeout) => next,
            };

            match next {
                Ok(Some(Ok(Incoming::Text(text)))) => {
                    self.handle_frame(conn, &text).await;
                }
                Ok(Some(Ok(Incoming::Keepalive))) => {
                    trace!(user = %conn.user_id(), conn = conn.id(), "Keepalive");
                }
                Ok(Some(Ok(Incoming::Binary(len)))) => {
                    warn!(
                        user = %conn.user_id(),
                        len,
                        error = %FrameError::Binary,
                        "Dropping malformed frame"
                    );
                }
                Ok(Some(Ok(Incoming::Close))) | Ok(None) => {
                    debug!(user = %conn.user_id(), conn = conn.id(), "Transport closed by peer");
                    break;
                }
                Ok(Some(Err(e))) => {
                    warn!(
                        user = %conn.user_id(),
                        conn = conn.id(),
                        error = %e,
                        "Transport read error"
                    );
                    break;
                }
                Err(idle) => {
                    info!(
                        user = %conn.user_id(),
                        conn = conn.id(),
                        idle = ?idle,
                        "Closing idle connection"
                    );
                    break;
                }
            }
        }

        conn.close();
    }

    async fn handle_frame(&self, conn: &Connection, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(user = %conn.user_id(), error = %e, "Dropping malformed frame");
                return;
            }
        };

        let message = NewMessage {
            id: None,
            sender_id: conn.user_id().clone(),
            receiver_id: frame.receiver_id,
            content: frame.content,
            file: frame.file,
            created_at: None,
        };

        // Already logged by `send`. The sender is told and the connection
        // stays open.
        if self.send(message).await.is_err() {
            if let Err(e) = conn.report_error(STORE_FAILED_NOTICE) {
                debug!(user = %conn.user_id(), error = %e, "Error notice not queued");
            }
        }
    }
}

/// Read the next item, giving up after `deadline` if one is set.
async fn next_with_deadline<R>(
    inbound: &mut R,
    deadline: Option<Duration>,
) -> Result<Option<R::Item>, Duration>
where
    R: Stream + Unpin,
{
    match deadline {
        Some(d) => tokio::time::timeout(d, inbound.next()).await.map_err(|_| d),
        None => Ok(inbound.next().await),
    }
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending().await,
    }
}

async fn write_loop<W>(
    conn: &Connection,
    mut receiver: mpsc::Receiver<Outgoing>,
    mut outbound: W,
    keepalive: Option<Duration>,
) where
    W: Sink<Outgoing> + Unpin,
    W::Error: Display,
{
    let mut keepalive = keepalive.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let frame = tokio::select! {
            biased;
            _ = conn.closed() => break,
            frame = receiver.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = tick(&mut keepalive) => Outgoing::Ping,
        };

        if let Err(e) = outbound.send(frame).await {
            warn!(user = %conn.user_id(), conn = conn.id(), error = %e, "Transport write error");
            conn.close();
            return;
        }
    }

    if let Err(e) = outbound.send(Outgoing::Close).await {
        debug!(user = %conn.user_id(), conn = conn.id(), error = %e, "Close frame not delivered");
    }
}
