//! Config schema types (server, database, model provider, chat, rate limiting).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Prompt sent as the system instruction when the config does not set one.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful support agent for a small e-commerce store. Answer clearly and concisely.
Store Details:
- Shipping: USA only. Standard shipping 5-7 business days.
- Returns: Accepted within 30 days if original condition. Email support@example.com.
- Support Hours: Mon-Fri, 9 AM - 5 PM EST.";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpdeskConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gemini: GeminiConfig,
    pub chat: ChatConfig,
    pub rate_limit: RateLimitConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on. Defaults to 5000.
    pub port: u16,
    /// Trust `X-Forwarded-For` / `X-Real-IP` when resolving client addresses.
    pub behind_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 5000,
            behind_proxy: false,
        }
    }
}

/// History store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. `None` means `<data_dir>/helpdesk.db`.
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// The configured path, or the default file in the data directory.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("helpdesk.db"))
    }
}

/// Google Gemini model gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub base_url: String,
    /// Block threshold applied to the harassment safety category.
    pub safety_threshold: String,
    /// Request timeout in seconds (0 = no timeout).
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.into(),
            base_url: DEFAULT_GEMINI_BASE_URL.into(),
            safety_threshold: "BLOCK_LOW_AND_ABOVE".into(),
            timeout_secs: 60,
        }
    }
}

impl GeminiConfig {
    /// Whether a non-empty API key is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty())
    }
}

/// Conversation handling: windowing, budget and model call limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum number of stored turns loaded as model context.
    pub history_limit: usize,
    /// Maximum estimated token cost of the history sent per request.
    pub token_budget: usize,
    /// Response-length cap passed to the model.
    pub max_output_tokens: u32,
    /// Maximum accepted length of an inbound message, in characters.
    pub max_message_chars: usize,
    pub system_instruction: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            token_budget: 200,
            max_output_tokens: 1000,
            max_message_chars: 1000,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.into(),
        }
    }
}

/// Per-client fixed-window request limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_secs: 15 * 60,
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
