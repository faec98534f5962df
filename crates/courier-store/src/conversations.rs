use std::collections::BTreeSet;

use rusqlite::params;

use courier_shared::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::messages::user_id_column;

impl Database {
    /// Every distinct user that `user` has sent a message to or received
    /// one from.
    pub fn get_participants(&self, user: &UserId) -> Result<BTreeSet<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT DISTINCT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END
             FROM messages
             WHERE sender_id = ?1 OR receiver_id = ?1",
        )?;

        let rows = stmt.query_map(params![user.as_str()], |row| user_id_column(row, 0))?;

        let mut participants = BTreeSet::new();
        for row in rows {
            participants.insert(row?);
        }
        Ok(participants)
    }
}
