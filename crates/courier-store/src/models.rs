//! Domain model structs persisted in the `messages` table.
//!
//! [`Message`] serialises to the same flat JSON shape used both by the HTTP
//! API and by push frames sent to connected recipients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_shared::{FileKind, FileRef, UserId};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A stored message between two users. Immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique message identifier.
    pub id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// Text body, absent for pure file messages.
    pub content: Option<String>,
    /// Retrievable location of an attached file.
    pub file_url: Option<String>,
    /// `text` for plain messages, otherwise the declared kind of the file.
    pub file_type: FileKind,
    /// Original name of the attached file.
    pub file_name: Option<String>,
    /// Assigned by the store; strictly increasing per store.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// NewMessage
// ---------------------------------------------------------------------------

/// A message submitted for persistence.
///
/// `id` and `created_at` are filled in by the store when absent. Callers are
/// responsible for supplying either non-empty content or a file; the store
/// does not enforce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub id: Option<Uuid>,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: Option<String>,
    pub file: Option<FileRef>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    pub fn text(sender_id: UserId, receiver_id: UserId, content: impl Into<String>) -> Self {
        Self {
            id: None,
            sender_id,
            receiver_id,
            content: Some(content.into()),
            file: None,
            created_at: None,
        }
    }

    pub fn file(sender_id: UserId, receiver_id: UserId, file: FileRef) -> Self {
        Self {
            id: None,
            sender_id,
            receiver_id,
            content: None,
            file: Some(file),
            created_at: None,
        }
    }
}
