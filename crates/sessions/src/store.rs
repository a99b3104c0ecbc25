use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::{
    error::Result,
    message::{Conversation, MessageQuery, Sender, StoredMessage},
};

/// Durable conversation history.
///
/// Implementations must make [`create_conversation`](Self::create_conversation)
/// idempotent: racing creators for the same id all succeed and exactly one
/// record exists afterwards. No other cross-request coordination is assumed.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    /// Create the conversation if missing and return the stored record.
    async fn create_conversation(&self, id: &str) -> Result<Conversation>;

    /// Append a message and bump the conversation's `updated_at`.
    async fn append_message(
        &self,
        conversation_id: &str,
        sender: Sender,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<StoredMessage>;

    async fn query_messages(
        &self,
        conversation_id: &str,
        query: &MessageQuery,
    ) -> Result<Vec<StoredMessage>>;

    /// Count messages strictly older than `before` (all messages when `None`).
    async fn count_messages(
        &self,
        conversation_id: &str,
        before: Option<DateTime<Utc>>,
    ) -> Result<u64>;

    /// Most recently updated conversations first.
    async fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>>;
}
