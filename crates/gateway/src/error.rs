//! HTTP error responses.
//!
//! Decides what crosses the trust boundary: validation messages are shown
//! verbatim, everything unexpected is logged here and answered generically.

use {
    axum::{
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    tracing::error,
};

pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please try again later.";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";
pub const MISSING_MESSAGE: &str = "Invalid Input: 'message' is required";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    RateLimited,
    Internal,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::BadRequest(m) | Self::NotFound(m) => m,
            Self::RateLimited => RATE_LIMITED_MESSAGE,
            Self::Internal => INTERNAL_ERROR_MESSAGE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "error": self.message() })),
        )
            .into_response()
    }
}

impl From<helpdesk_chat::Error> for ApiError {
    fn from(err: helpdesk_chat::Error) -> Self {
        match err {
            helpdesk_chat::Error::InvalidInput { message } => Self::BadRequest(message),
            e if e.is_rate_limited() => Self::RateLimited,
            e => {
                error!(error = %e, "request failed");
                Self::Internal
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, helpdesk_providers::GatewayError};

    #[test]
    fn chat_errors_map_to_statuses() {
        let bad: ApiError = helpdesk_chat::Error::invalid_input("too long").into();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
        assert_eq!(bad.message(), "too long");

        let limited: ApiError = helpdesk_chat::Error::Gateway(GatewayError::RateLimited {
            message: "quota".into(),
        })
        .into();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.message(), RATE_LIMITED_MESSAGE);

        let internal: ApiError = helpdesk_chat::Error::Gateway(GatewayError::Api {
            status: 500,
            message: "secret upstream detail".into(),
        })
        .into();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.message(), INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn not_found_keeps_message() {
        let err = ApiError::NotFound("Conversation not found".into());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Conversation not found");
    }
}
