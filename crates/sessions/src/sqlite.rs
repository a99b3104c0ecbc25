//! SQLite-backed history store using sqlx.

use std::path::Path;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    helpdesk_common::time::{from_millis, to_millis},
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::debug,
};

use crate::{
    error::{Error, Result},
    message::{Conversation, MessageQuery, Sender, SortOrder, StoredMessage},
    store::HistoryStore,
};

const SELECT_MESSAGES_ASC: &str = "SELECT id, conversation_id, sender, text, created_at FROM messages \
     WHERE conversation_id = ? AND (? IS NULL OR created_at < ?) \
     ORDER BY created_at ASC, id ASC LIMIT ?";

const SELECT_MESSAGES_DESC: &str = "SELECT id, conversation_id, sender, text, created_at FROM messages \
     WHERE conversation_id = ? AND (? IS NULL OR created_at < ?) \
     ORDER BY created_at DESC, id DESC LIMIT ?";

#[derive(sqlx::FromRow)]
struct ConversationRow {
    conversation_id: String,
    created_at: i64,
    updated_at: i64,
}

impl From<ConversationRow> for Conversation {
    fn from(r: ConversationRow) -> Self {
        Self {
            id: r.conversation_id,
            created_at: from_millis(r.created_at),
            updated_at: from_millis(r.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: String,
    sender: String,
    text: String,
    created_at: i64,
}

impl TryFrom<MessageRow> for StoredMessage {
    type Error = Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            conversation_id: r.conversation_id,
            sender: r.sender.parse()?,
            text: r.text,
            created_at: from_millis(r.created_at),
        })
    }
}

/// SQLite persistence for conversations and messages.
#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Connect to `database_url` with its own pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        crate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path.display());
        debug!(path = %path.display(), "opening history store");
        Self::new(&url).await
    }

    /// A private in-memory database.
    ///
    /// Pinned to a single never-recycled connection: every SQLite
    /// `:memory:` connection is a separate database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        crate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Use an existing pool. [`crate::run_migrations`] must already have run.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn find_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT conversation_id, created_at, updated_at FROM conversations WHERE conversation_id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn create_conversation(&self, id: &str) -> Result<Conversation> {
        let now = to_millis(&helpdesk_common::time::now());
        let inserted = sqlx::query(
            "INSERT INTO conversations (conversation_id, created_at, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(conversation_id) DO NOTHING",
        )
        .bind(id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if inserted > 0 {
            debug!(conversation_id = id, "created conversation");
        }

        self.find_conversation(id)
            .await?
            .ok_or_else(|| Error::MissingConversation { id: id.to_string() })
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        sender: Sender,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<StoredMessage> {
        let ts = to_millis(&timestamp);
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO messages (conversation_id, sender, text, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(sender.as_str())
        .bind(text)
        .bind(ts)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            "UPDATE conversations SET updated_at = MAX(updated_at, ?) WHERE conversation_id = ?",
        )
        .bind(ts)
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(StoredMessage {
            id,
            conversation_id: conversation_id.to_string(),
            sender,
            text: text.to_string(),
            created_at: from_millis(ts),
        })
    }

    async fn query_messages(
        &self,
        conversation_id: &str,
        query: &MessageQuery,
    ) -> Result<Vec<StoredMessage>> {
        let sql = match query.order {
            SortOrder::Asc => SELECT_MESSAGES_ASC,
            SortOrder::Desc => SELECT_MESSAGES_DESC,
        };
        let before = query.before.as_ref().map(to_millis);
        // SQLite treats a negative LIMIT as "no limit".
        let limit = query
            .limit
            .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));

        let rows = sqlx::query_as::<_, MessageRow>(sql)
            .bind(conversation_id)
            .bind(before)
            .bind(before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count_messages(
        &self,
        conversation_id: &str,
        before: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let before = before.as_ref().map(to_millis);
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ? AND (? IS NULL OR created_at < ?)",
        )
        .bind(conversation_id)
        .bind(before)
        .bind(before)
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            "SELECT conversation_id, created_at, updated_at FROM conversations \
             ORDER BY updated_at DESC, conversation_id ASC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc};

    fn ts(ms: i64) -> DateTime<Utc> {
        from_millis(ms)
    }

    async fn store_with(conversation: &str, count: i64) -> SqliteHistoryStore {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        store.create_conversation(conversation).await.unwrap();
        for i in 0..count {
            let sender = if i % 2 == 0 {
                Sender::User
            } else {
                Sender::Assistant
            };
            store
                .append_message(conversation, sender, &format!("m{i}"), ts(1_000 + i))
                .await
                .unwrap();
        }
        store
    }

    fn texts(messages: &[StoredMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[tokio::test]
    async fn find_missing_conversation() {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        assert!(store.find_conversation("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        let first = store.create_conversation("session_a").await.unwrap();
        let second = store.create_conversation("session_a").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list_conversations(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creation_yields_one_record() {
        let store = Arc::new(SqliteHistoryStore::in_memory().await.unwrap());
        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create_conversation("session_race").await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create_conversation("session_race").await })
        };
        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a.id, b.id);
        assert_eq!(store.list_conversations(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_requires_existing_conversation() {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        let result = store
            .append_message("ghost", Sender::User, "hi", ts(1))
            .await;
        assert!(matches!(result, Err(Error::Sqlx(_))));
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids_and_bumps_updated_at() {
        let store = store_with("c", 0).await;
        let a = store
            .append_message("c", Sender::User, "a", ts(5_000_000_000_000))
            .await
            .unwrap();
        let b = store
            .append_message("c", Sender::Assistant, "b", ts(5_000_000_000_000))
            .await
            .unwrap();
        assert!(b.id > a.id);
        let conv = store.find_conversation("c").await.unwrap().unwrap();
        assert_eq!(conv.updated_at, ts(5_000_000_000_000));
    }

    #[tokio::test]
    async fn ascending_query_breaks_ties_by_insertion_order() {
        let store = store_with("c", 0).await;
        for text in ["first", "second", "third"] {
            store
                .append_message("c", Sender::User, text, ts(42))
                .await
                .unwrap();
        }
        let asc = store.query_messages("c", &MessageQuery::all()).await.unwrap();
        assert_eq!(texts(&asc), ["first", "second", "third"]);

        let desc = store
            .query_messages("c", &MessageQuery::latest(2))
            .await
            .unwrap();
        assert_eq!(texts(&desc), ["third", "second"]);
    }

    #[tokio::test]
    async fn latest_limit_and_before_bound() {
        let store = store_with("c", 30).await;

        let newest = store
            .query_messages("c", &MessageQuery::latest(20))
            .await
            .unwrap();
        assert_eq!(newest.len(), 20);
        assert_eq!(newest[0].text, "m29");
        assert_eq!(newest[19].text, "m10");

        let older = store
            .query_messages("c", &MessageQuery::latest(20).before(newest[19].created_at))
            .await
            .unwrap();
        assert_eq!(older.len(), 10);
        assert_eq!(older[0].text, "m9");
        assert_eq!(older[9].text, "m0");
    }

    #[tokio::test]
    async fn count_before_is_exclusive() {
        let store = store_with("c", 10).await;
        assert_eq!(store.count_messages("c", None).await.unwrap(), 10);
        assert_eq!(store.count_messages("c", Some(ts(1_003))).await.unwrap(), 3);
        assert_eq!(store.count_messages("c", Some(ts(0))).await.unwrap(), 0);
        assert_eq!(store.count_messages("other", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let store = store_with("a", 3).await;
        store.create_conversation("b").await.unwrap();
        store
            .append_message("b", Sender::User, "only b", ts(9))
            .await
            .unwrap();
        let b = store.query_messages("b", &MessageQuery::all()).await.unwrap();
        assert_eq!(texts(&b), ["only b"]);
        assert_eq!(store.count_messages("a", None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn list_orders_by_last_update() {
        let store = SqliteHistoryStore::in_memory().await.unwrap();
        store.create_conversation("old").await.unwrap();
        store.create_conversation("new").await.unwrap();
        store
            .append_message("old", Sender::User, "x", ts(4_000_000_000_000))
            .await
            .unwrap();
        store
            .append_message("new", Sender::User, "y", ts(4_000_000_000_001))
            .await
            .unwrap();

        let ids: Vec<String> = store
            .list_conversations(50)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, ["new", "old"]);
        assert_eq!(store.list_conversations(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helpdesk.db");
        {
            let store = SqliteHistoryStore::open(&path).await.unwrap();
            store.create_conversation("c").await.unwrap();
            store
                .append_message("c", Sender::User, "hello", ts(7))
                .await
                .unwrap();
            store.pool().close().await;
        }
        let store = SqliteHistoryStore::open(&path).await.unwrap();
        let messages = store.query_messages("c", &MessageQuery::all()).await.unwrap();
        assert_eq!(texts(&messages), ["hello"]);
        assert_eq!(messages[0].sender, Sender::User);
    }
}
