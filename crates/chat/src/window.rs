//! History windowing: the K most recent stored messages as model turns.

use std::sync::Arc;

use {
    helpdesk_providers::Turn,
    helpdesk_sessions::{HistoryStore, MessageQuery, Sender, StoredMessage},
};

use crate::error::Result;

/// Map a stored message onto the model's two-role vocabulary.
pub fn turn_from_message(message: &StoredMessage) -> Turn {
    match message.sender {
        Sender::User => Turn::user(message.text.as_str()),
        Sender::Assistant => Turn::model(message.text.as_str()),
    }
}

/// Loads bounded, oldest-first windows of a conversation.
#[derive(Clone)]
pub struct HistoryWindower {
    store: Arc<dyn HistoryStore>,
    limit: usize,
}

impl HistoryWindower {
    pub fn new(store: Arc<dyn HistoryStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The `limit` most recent messages, oldest first.
    pub async fn load_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let mut messages = self
            .store
            .query_messages(conversation_id, &MessageQuery::latest(self.limit))
            .await?;
        messages.reverse();
        Ok(messages)
    }

    /// The same window converted to turns.
    pub async fn load(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        let messages = self.load_messages(conversation_id).await?;
        Ok(messages.iter().map(turn_from_message).collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        helpdesk_common::time::from_millis,
        helpdesk_providers::Role,
        helpdesk_sessions::SqliteHistoryStore,
    };

    async fn seeded(count: i64) -> Arc<SqliteHistoryStore> {
        let store = Arc::new(SqliteHistoryStore::in_memory().await.unwrap());
        store.create_conversation("c").await.unwrap();
        for i in 0..count {
            let sender = if i % 2 == 0 {
                Sender::User
            } else {
                Sender::Assistant
            };
            store
                .append_message("c", sender, &format!("m{i}"), from_millis(10_000 + i))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn returns_most_recent_k_oldest_first() {
        let windower = HistoryWindower::new(seeded(25).await, 20);
        let turns = windower.load("c").await.unwrap();

        assert_eq!(turns.len(), 20);
        let texts: Vec<String> = turns.iter().map(|t| t.text.clone()).collect();
        let expected: Vec<String> = (5..25).map(|i| format!("m{i}")).collect();
        assert_eq!(texts, expected);
    }

    #[tokio::test]
    async fn fewer_than_k_returns_all() {
        let windower = HistoryWindower::new(seeded(3).await, 20);
        let messages = windower.load_messages("c").await.unwrap();
        assert_eq!(messages.len(), 3);
        assert!(messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn maps_senders_to_roles() {
        let windower = HistoryWindower::new(seeded(2).await, 20);
        let turns = windower.load("c").await.unwrap();
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Model);
    }

    #[tokio::test]
    async fn unknown_conversation_is_empty() {
        let windower = HistoryWindower::new(seeded(0).await, 20);
        assert!(windower.load("missing").await.unwrap().is_empty());
        assert_eq!(windower.limit(), 20);
    }
}
