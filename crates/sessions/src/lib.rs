//! Conversation history storage.
//!
//! Conversations and their messages live in SQLite (`conversations` and
//! `messages` tables). Messages are append-only and ordered by timestamp,
//! ties broken by insertion order. The store is the only source of truth for
//! history; nothing above it keeps conversation state in memory.

pub mod error;
pub mod message;
pub mod sqlite;
pub mod store;

pub use {
    error::{Error, Result},
    message::{Conversation, MessageQuery, Sender, SortOrder, StoredMessage},
    sqlite::SqliteHistoryStore,
    store::HistoryStore,
};

/// Run database migrations for the history tables.
///
/// Creates the `conversations` and `messages` tables. Call once at startup
/// before handing the pool to [`SqliteHistoryStore::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
