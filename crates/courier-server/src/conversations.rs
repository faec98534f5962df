//! Read-through view of a user's correspondents.

use std::collections::BTreeSet;
use std::sync::Arc;

use courier_shared::UserId;
use courier_store::{MessageStore, SqliteStore, StoreError};

use crate::coordinator::run_blocking;

/// Derives the set of users someone has exchanged messages with.
///
/// Not cached: every call reads the store, so a completed send is always
/// reflected by the next listing.
pub struct ConversationIndex<S = SqliteStore> {
    store: Arc<S>,
}

impl<S> Clone for ConversationIndex<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: MessageStore> ConversationIndex<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn list_conversations(&self, user_id: &UserId) -> Result<BTreeSet<UserId>, StoreError> {
        let user_id = user_id.clone();
        run_blocking(&self.store, move |store| store.fetch_participants(&user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use courier_store::NewMessage;

    use super::*;
    use crate::coordinator::DeliveryCoordinator;
    use crate::registry::ConnectionRegistry;

    fn user(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_lists_counterparts_after_sends() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let coord = DeliveryCoordinator::new(Arc::clone(&store), Arc::new(ConnectionRegistry::new()));
        let index = ConversationIndex::new(store);

        coord
            .send(NewMessage::text(user("alice"), user("bob"), "hi"))
            .await
            .unwrap();
        coord
            .send(NewMessage::text(user("alice"), user("bob"), "bye"))
            .await
            .unwrap();

        assert_eq!(
            index.list_conversations(&user("alice")).await.unwrap(),
            BTreeSet::from([user("bob")])
        );
        assert_eq!(
            index.list_conversations(&user("bob")).await.unwrap(),
            BTreeSet::from([user("alice")])
        );
        assert!(index.list_conversations(&user("carol")).await.unwrap().is_empty());
    }
}
