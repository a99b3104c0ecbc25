//! Typed records stored in the history tables.

use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::error::Error;

/// Who wrote a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(Error::invalid_sender(other)),
        }
    }
}

/// A conversation row. Created lazily on the first message, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Bumped every time a message is appended.
    pub updated_at: DateTime<Utc>,
}

/// An immutable, append-only message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Store-assigned, strictly increasing; breaks timestamp ties.
    pub id: i64,
    pub conversation_id: String,
    pub sender: Sender,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Result ordering for [`MessageQuery`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    Asc,
    /// Newest first.
    Desc,
}

/// Window selection over one conversation's messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    /// Exclusive upper bound on `created_at`.
    pub before: Option<DateTime<Utc>>,
    /// Maximum number of rows; `None` returns everything.
    pub limit: Option<usize>,
    pub order: SortOrder,
}

impl MessageQuery {
    /// The `limit` most recent messages, newest first.
    #[must_use]
    pub fn latest(limit: usize) -> Self {
        Self {
            before: None,
            limit: Some(limit),
            order: SortOrder::Desc,
        }
    }

    /// Every message, oldest first.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn before(mut self, ts: DateTime<Utc>) -> Self {
        self.before = Some(ts);
        self
    }
}
