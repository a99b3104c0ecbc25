//! Configuration loading, env substitution and validation.
//!
//! Config files: `helpdesk.toml`, `helpdesk.yaml`, `helpdesk.yml` or
//! `helpdesk.json`, searched in `./` then `~/.config/helpdesk/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, load_config, set_config_dir,
        set_data_dir,
    },
    schema::{
        ChatConfig, DatabaseConfig, GeminiConfig, HelpdeskConfig, RateLimitConfig, ServerConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
