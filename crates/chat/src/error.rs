use {helpdesk_providers::GatewayError, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before anything was persisted; safe to show to the client.
    #[error("{message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Store(#[from] helpdesk_sessions::Error),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Whether the model provider asked us to back off.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Gateway(e) if e.is_rate_limited())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
