//! Read-only history views served to clients and operators.

use std::sync::Arc;

use {
    chrono::{DateTime, TimeDelta, Utc},
    helpdesk_sessions::{Conversation, HistoryStore, MessageQuery, StoredMessage},
    serde::Serialize,
};

use crate::error::Result;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
pub const CONVERSATION_LIST_LIMIT: usize = 50;

/// One page of a conversation, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub conversation: Option<Conversation>,
    pub messages: Vec<StoredMessage>,
    /// Older messages exist before the first one in `messages`.
    pub has_more: bool,
}

/// A conversation with its total message count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub message_count: u64,
}

#[derive(Clone)]
pub struct HistoryReader {
    store: Arc<dyn HistoryStore>,
}

impl HistoryReader {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Up to `limit` messages older than `before`, newest first from the
    /// store, returned oldest first.
    ///
    /// `limit` is clamped to `1..=MAX_PAGE_SIZE`. `before` is a timestamp, so
    /// a page never ends inside a run of messages sharing the oldest
    /// returned timestamp: the whole run is included, even past `limit`.
    /// Passing the oldest returned `created_at` as the next `before` then
    /// loses nothing.
    pub async fn page(
        &self,
        conversation_id: &str,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<HistoryPage> {
        let Some(conversation) = self.store.find_conversation(conversation_id).await? else {
            return Ok(HistoryPage {
                conversation: None,
                messages: Vec::new(),
                has_more: false,
            });
        };

        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let mut query = MessageQuery::latest(limit);
        query.before = before;
        let mut messages = self.store.query_messages(conversation_id, &query).await?;

        if messages.len() == limit
            && let Some(oldest) = messages.last()
        {
            let ts = oldest.created_at;
            let in_page = messages.iter().filter(|m| m.created_at == ts).count() as u64;
            let tied = self
                .store
                .count_messages(conversation_id, Some(ts + TimeDelta::milliseconds(1)))
                .await?
                .saturating_sub(self.store.count_messages(conversation_id, Some(ts)).await?);
            if tied > in_page {
                let missing = usize::try_from(tied - in_page).unwrap_or(usize::MAX);
                query.limit = Some(limit.saturating_add(missing));
                messages = self.store.query_messages(conversation_id, &query).await?;
            }
        }
        messages.reverse();

        let has_more = match messages.first() {
            Some(oldest) => {
                self.store
                    .count_messages(conversation_id, Some(oldest.created_at))
                    .await?
                    > 0
            },
            None => false,
        };

        Ok(HistoryPage {
            conversation: Some(conversation),
            messages,
            has_more,
        })
    }

    /// Full transcript, oldest first. `None` when the conversation is unknown.
    pub async fn transcript(
        &self,
        conversation_id: &str,
    ) -> Result<Option<(Conversation, Vec<StoredMessage>)>> {
        let Some(conversation) = self.store.find_conversation(conversation_id).await? else {
            return Ok(None);
        };
        let messages = self
            .store
            .query_messages(conversation_id, &MessageQuery::all())
            .await?;
        Ok(Some((conversation, messages)))
    }

    /// Most recently updated conversations with their message counts.
    pub async fn conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        let conversations = self.store.list_conversations(limit).await?;
        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let message_count = self.store.count_messages(&conversation.id, None).await?;
            summaries.push(ConversationSummary {
                conversation,
                message_count,
            });
        }
        Ok(summaries)
    }
}
