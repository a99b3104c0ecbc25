use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("unknown message sender '{value}'")]
    InvalidSender { value: String },

    #[error("conversation '{id}' vanished after creation")]
    MissingConversation { id: String },
}

impl Error {
    #[must_use]
    pub fn invalid_sender(value: impl Into<String>) -> Self {
        Self::InvalidSender {
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
