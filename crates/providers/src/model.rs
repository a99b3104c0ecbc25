use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::error::GatewayError;

// ── Typed turns ─────────────────────────────────────────────────────────────

/// Speaker of a history turn as the model API sees it.
///
/// Only two roles exist; the system instruction travels separately in
/// [`GenerateRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One role-tagged unit of conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Everything a single stateless generation call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub system_instruction: String,
    /// Prior turns, oldest first. Does not include `new_message`.
    pub history: Vec<Turn>,
    pub new_message: String,
    pub max_output_tokens: u32,
}

// ── Gateway trait ───────────────────────────────────────────────────────────

/// Request/response access to a hosted text-generation model.
///
/// Implementations hold no conversation state; every call carries its full
/// context.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Provider name (e.g. "gemini").
    fn name(&self) -> &str;

    /// Model identifier sent to the provider.
    fn model(&self) -> &str;

    /// Generate the reply text for `request`.
    async fn generate(&self, request: GenerateRequest) -> Result<String, GatewayError>;
}
