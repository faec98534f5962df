//! The message-store contract and its shared SQLite implementation.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use courier_shared::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, NewMessage};

/// Durable append-and-query log of messages between pairs of users.
///
/// Implementations must accept concurrent calls from many threads without
/// interleaving writes. Methods may block on I/O, so async callers should
/// run them on a blocking thread.
pub trait MessageStore: Send + Sync + 'static {
    /// Durably record a message, assigning its identifier and timestamp if
    /// absent. On error nothing was recorded.
    fn persist(&self, message: NewMessage) -> Result<Message>;

    /// Messages between `a` and `b` in either direction, oldest first.
    fn fetch_between(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>>;

    /// Every distinct counterpart of `user` across sent and received messages.
    fn fetch_participants(&self, user: &UserId) -> Result<BTreeSet<UserId>>;
}

/// A [`Database`] shared between threads behind a mutex.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open the database at `path` with a bounded wait on lock contention.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let db = Database::open_at(path)?;
        db.set_busy_timeout(busy_timeout)?;
        Ok(Self::new(db))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| StoreError::Unavailable("database lock poisoned".to_string()))
    }
}

impl MessageStore for SqliteStore {
    fn persist(&self, message: NewMessage) -> Result<Message> {
        self.lock()?.insert_message(message)
    }

    fn fetch_between(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>> {
        self.lock()?.get_messages_between(a, b)
    }

    fn fetch_participants(&self, user: &UserId) -> Result<BTreeSet<UserId>> {
        self.lock()?.get_participants(user)
    }
}
