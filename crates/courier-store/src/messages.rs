use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use courier_shared::{FileKind, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Message, NewMessage};

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, content, file_url, file_type, file_name, created_at";

impl Database {
    /// Insert a message and return its stored form.
    ///
    /// Assigns an identifier and `created_at` when the caller left them
    /// empty. A duplicate identifier fails with [`StoreError::Sqlite`].
    pub fn insert_message(&self, new: NewMessage) -> Result<Message> {
        let id = new.id.unwrap_or_else(Uuid::new_v4);
        let created_at_us = self.next_created_at(new.created_at);
        let created_at = micros_to_datetime(created_at_us).ok_or_else(|| {
            StoreError::Unavailable(format!("timestamp out of range: {created_at_us}"))
        })?;

        let (file_url, file_type, file_name) = match new.file {
            Some(file) => (Some(file.url), file.kind, file.name),
            None => (None, FileKind::Text, None),
        };

        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, file_url, file_type, file_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id.to_string(),
                new.sender_id.as_str(),
                new.receiver_id.as_str(),
                new.content,
                file_url,
                file_type.as_str(),
                file_name,
                created_at_us,
            ],
        )?;

        tracing::debug!(
            message = %id,
            sender = %new.sender_id,
            receiver = %new.receiver_id,
            "message persisted"
        );

        Ok(Message {
            id,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            content: new.content,
            file_url,
            file_type,
            file_name,
            created_at,
        })
    }

    /// All messages exchanged between `a` and `b`, in either direction,
    /// oldest first. Ties on `created_at` are broken by identifier.
    pub fn get_messages_between(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC, id ASC"
        ))?;

        let rows = stmt.query_map(params![a.as_str(), b.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

fn micros_to_datetime(us: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(us)
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

pub(crate) fn user_id_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<UserId> {
    let raw: String = row.get(idx)?;
    UserId::new(&raw).ok_or_else(|| conversion_error(idx, "empty user id".to_string()))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_id = user_id_column(row, 1)?;
    let receiver_id = user_id_column(row, 2)?;
    let content: Option<String> = row.get(3)?;
    let file_url: Option<String> = row.get(4)?;
    let file_type_str: String = row.get(5)?;
    let file_name: Option<String> = row.get(6)?;
    let created_at_us: i64 = row.get(7)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let file_type = FileKind::parse(&file_type_str)
        .ok_or_else(|| conversion_error(5, format!("unknown file_type {file_type_str:?}")))?;

    let created_at = micros_to_datetime(created_at_us).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {created_at_us}").into(),
        )
    })?;

    Ok(Message {
        id,
        sender_id,
        receiver_id,
        content,
        file_url,
        file_type,
        file_name,
        created_at,
    })
}
