//! Semantic validation of a loaded configuration.
//!
//! Parsing already rejects malformed files; this pass catches values that
//! parse fine but would make the server misbehave (a zero budget, a missing
//! API key, an unexpanded `${VAR}`).

use secrecy::ExposeSecret;

use crate::{env_subst::has_placeholder, schema::HelpdeskConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "chat.token_budget"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Validate a configuration.
#[must_use]
pub fn validate(config: &HelpdeskConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    match config.gemini.api_key.as_ref().map(|k| k.expose_secret()) {
        None => result.push(
            Severity::Error,
            "gemini.api_key",
            "missing; set GEMINI_API_KEY or gemini.api_key",
        ),
        Some(key) if key.trim().is_empty() => {
            result.push(Severity::Error, "gemini.api_key", "is empty")
        },
        Some(key) if has_placeholder(key) => result.push(
            Severity::Error,
            "gemini.api_key",
            format!("unresolved environment placeholder {key}"),
        ),
        Some(_) => {},
    }

    if config.gemini.model.trim().is_empty() {
        result.push(Severity::Error, "gemini.model", "must not be empty");
    }
    if !config.gemini.base_url.starts_with("http://")
        && !config.gemini.base_url.starts_with("https://")
    {
        result.push(
            Severity::Error,
            "gemini.base_url",
            format!("'{}' is not an http(s) URL", config.gemini.base_url),
        );
    }

    let chat = &config.chat;
    for (path, value) in [
        ("chat.history_limit", chat.history_limit),
        ("chat.token_budget", chat.token_budget),
        ("chat.max_message_chars", chat.max_message_chars),
    ] {
        if value == 0 {
            result.push(Severity::Error, path, "must be greater than zero");
        }
    }
    if chat.max_output_tokens == 0 {
        result.push(
            Severity::Error,
            "chat.max_output_tokens",
            "must be greater than zero",
        );
    }
    if chat.system_instruction.trim().is_empty() {
        result.push(
            Severity::Warning,
            "chat.system_instruction",
            "empty; the model will answer without store context",
        );
    }

    if config.rate_limit.enabled {
        if config.rate_limit.max_requests == 0 {
            result.push(
                Severity::Warning,
                "rate_limit.max_requests",
                "0 rejects every request",
            );
        }
        if config.rate_limit.window_secs == 0 {
            result.push(
                Severity::Error,
                "rate_limit.window_secs",
                "must be greater than zero",
            );
        }
    }

    if config.server.bind == "0.0.0.0" && !config.server.behind_proxy {
        result.push(
            Severity::Info,
            "server.bind",
            "listening on all interfaces; set server.behind_proxy if a reverse proxy forwards client IPs",
        );
    }

    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn valid_config() -> HelpdeskConfig {
        let mut cfg = HelpdeskConfig::default();
        cfg.gemini.api_key = Some(Secret::new("key".into()));
        cfg
    }

    #[test]
    fn default_with_key_is_clean() {
        let result = validate(&valid_config());
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.count(Severity::Warning), 0);
    }

    #[test]
    fn missing_key_is_an_error() {
        let result = validate(&HelpdeskConfig::default());
        assert!(result.has_errors());
        assert!(result.diagnostics.iter().any(|d| d.path == "gemini.api_key"));
    }

    #[test]
    fn unresolved_placeholder_key_is_an_error() {
        let mut cfg = valid_config();
        cfg.gemini.api_key = Some(Secret::new("${GEMINI_API_KEY}".into()));
        let result = validate(&cfg);
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.path == "gemini.api_key")
            .unwrap();
        assert_eq!(d.severity, Severity::Error);
        assert!(d.message.contains("placeholder"));
    }

    #[test]
    fn zero_limits_are_errors() {
        let mut cfg = valid_config();
        cfg.chat.token_budget = 0;
        cfg.chat.history_limit = 0;
        let result = validate(&cfg);
        assert_eq!(result.count(Severity::Error), 2);
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.to_string() == "error: chat.token_budget: must be greater than zero")
        );
    }

    #[test]
    fn non_http_base_url_is_an_error() {
        let mut cfg = valid_config();
        cfg.gemini.base_url = "ftp://example.com".into();
        assert!(validate(&cfg).has_errors());
    }

    #[test]
    fn disabled_rate_limit_skips_its_checks() {
        let mut cfg = valid_config();
        cfg.rate_limit.enabled = false;
        cfg.rate_limit.max_requests = 0;
        cfg.rate_limit.window_secs = 0;
        assert!(validate(&cfg).diagnostics.is_empty());
    }
}
