use thiserror::Error;

/// Failure categories of a model call.
///
/// `RateLimited` is kept apart from everything else so the HTTP layer can
/// answer 429 instead of 500.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("model provider rate limit exceeded: {message}")]
    RateLimited { message: String },

    #[error("model API error HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response blocked by provider: {reason}")]
    Blocked { reason: String },

    #[error("model returned no text")]
    EmptyResponse,

    #[error("malformed model response: {message}")]
    InvalidResponse { message: String },

    #[error("model API key is not configured")]
    MissingApiKey,
}

impl GatewayError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
