//! Process-wide table of live push connections, one per user.
//!
//! Attaching a user that already has a connection replaces it (last attach
//! wins). Detaching is identity-checked: a connection can only remove its
//! own entry, never one that replaced it.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use courier_shared::UserId;
use courier_store::Message;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A frame written to a push transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Message(Message),
    /// A problem with a frame the peer sent, reported back to it.
    Error(String),
    Ping,
    Close,
}

/// Failure to hand a push frame to a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("push queue full")]
    Full,
}

/// One user's live push channel.
///
/// Cloning is cheap; every clone refers to the same underlying transport.
/// Two connections are the same connection iff their [`id`](Self::id)s
/// match.
#[derive(Debug, Clone)]
pub struct Connection {
    id: u64,
    user_id: UserId,
    sender: mpsc::Sender<Outgoing>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Create a connection with a bounded push queue. The receiver is
    /// drained by whatever writes to the underlying transport.
    pub fn new(user_id: UserId, buffer: usize) -> (Self, mpsc::Receiver<Outgoing>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let conn = Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            user_id,
            sender,
            shutdown: CancellationToken::new(),
        };
        (conn, receiver)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Queue a stored message for delivery without waiting.
    pub fn push(&self, message: Message) -> Result<(), TransportError> {
        self.enqueue(Outgoing::Message(message))
    }

    /// Queue an error notice for the peer without waiting.
    pub fn report_error(&self, reason: impl Into<String>) -> Result<(), TransportError> {
        self.enqueue(Outgoing::Error(reason.into()))
    }

    fn enqueue(&self, frame: Outgoing) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Full,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Signal the transport to shut down. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.sender.is_closed()
    }

    /// Resolves once [`close`](Self::close) has been called on any clone.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    pub fn same_as(&self, other: &Connection) -> bool {
        self.id == other.id
    }
}

/// Registry mapping user identifiers to their current connection.
///
/// Backed by a [`DashMap`] so `lookup` never waits on a global lock and
/// `detach` is an atomic compare-and-remove.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<UserId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for the connection's user.
    ///
    /// Returns the connection that was replaced, if any. The caller owns
    /// closing it.
    #[instrument(skip_all, fields(user = %conn.user_id(), conn = conn.id()))]
    pub fn attach(&self, conn: Connection) -> Option<Connection> {
        let previous = self.connections.insert(conn.user_id.clone(), conn);
        match &previous {
            Some(prev) => debug!(replaced = prev.id, "Replaced existing connection"),
            None => debug!("Registered new connection"),
        }
        previous
    }

    /// Remove the entry for the connection's user, but only if it is still
    /// this exact connection. Returns whether anything was removed.
    #[instrument(skip_all, fields(user = %conn.user_id(), conn = conn.id()))]
    pub fn detach(&self, conn: &Connection) -> bool {
        let removed = self
            .connections
            .remove_if(&conn.user_id, |_, current| current.same_as(conn))
            .is_some();
        if removed {
            debug!("Unregistered connection");
        } else {
            debug!("Connection already replaced or removed");
        }
        removed
    }

    /// The user's live connection, if any.
    ///
    /// An entry whose transport has already shut down is purged and
    /// reported as absent.
    pub fn lookup(&self, user_id: &UserId) -> Option<Connection> {
        let conn = self.connections.get(user_id).map(|e| e.value().clone())?;
        if conn.is_closed() {
            self.detach(&conn);
            return None;
        }
        Some(conn)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
