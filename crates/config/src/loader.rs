use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::HelpdeskConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "helpdesk.toml",
    "helpdesk.yaml",
    "helpdesk.yml",
    "helpdesk.json",
];

static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);
static DATA_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Use `dir` instead of the user-global config directory.
pub fn set_config_dir(dir: PathBuf) {
    if let Ok(mut guard) = CONFIG_DIR_OVERRIDE.lock() {
        *guard = Some(dir);
    }
}

/// Use `dir` instead of the platform data directory.
pub fn set_data_dir(dir: PathBuf) {
    if let Ok(mut guard) = DATA_DIR_OVERRIDE.lock() {
        *guard = Some(dir);
    }
}

fn override_of(slot: &Mutex<Option<PathBuf>>) -> Option<PathBuf> {
    slot.lock().ok().and_then(|guard| guard.clone())
}

/// The config directory: the override if set, else `~/.config/helpdesk/`.
pub fn config_dir() -> Option<PathBuf> {
    override_of(&CONFIG_DIR_OVERRIDE).or_else(|| {
        directories::ProjectDirs::from("", "", "helpdesk").map(|d| d.config_dir().to_path_buf())
    })
}

/// The data directory holding the SQLite history store.
pub fn data_dir() -> PathBuf {
    override_of(&DATA_DIR_OVERRIDE)
        .or_else(|| {
            directories::ProjectDirs::from("", "", "helpdesk")
                .map(|d| d.data_dir().to_path_buf())
        })
        .unwrap_or_else(|| PathBuf::from(".helpdesk"))
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<HelpdeskConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply environment
/// overrides.
///
/// Search order:
/// 1. `./helpdesk.{toml,yaml,yml,json}`
/// 2. `<config_dir>/helpdesk.{toml,yaml,yml,json}`
///
/// Falls back to `HelpdeskConfig::default()` when nothing is found or the
/// file fails to parse.
pub fn discover_and_load() -> HelpdeskConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                HelpdeskConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            HelpdeskConfig::default()
        },
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config
}

/// Apply the supported environment variables on top of a loaded config.
///
/// `GEMINI_API_KEY`, `GEMINI_MODEL`, `PORT` and `HELPDESK_DB_PATH` win over
/// file values. Unparseable values are ignored with a warning.
pub fn apply_env_overrides(config: &mut HelpdeskConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(key) = lookup("GEMINI_API_KEY").filter(|v| !v.trim().is_empty()) {
        config.gemini.api_key = Some(Secret::new(key));
    }
    if let Some(model) = lookup("GEMINI_MODEL").filter(|v| !v.trim().is_empty()) {
        config.gemini.model = model.trim().to_string();
    }
    if let Some(port) = lookup("PORT") {
        match port.trim().parse::<u16>().context("invalid PORT") {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(error = %e, "ignoring PORT override"),
        }
    }
    if let Some(path) = lookup("HELPDESK_DB_PATH").filter(|v| !v.trim().is_empty()) {
        config.database.path = Some(PathBuf::from(path));
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> Result<HelpdeskConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helpdesk.toml");
        std::fs::write(&path, "[server]\nport = 8088\n\n[chat]\nhistory_limit = 5\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 8088);
        assert_eq!(cfg.chat.history_limit, 5);
    }

    #[test]
    fn loads_yaml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("helpdesk.yaml");
        std::fs::write(&yaml, "chat:\n  token_budget: 42\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().chat.token_budget, 42);

        let json = dir.path().join("helpdesk.json");
        std::fs::write(&json, r#"{"gemini": {"model": "gemini-x"}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().gemini.model, "gemini-x");
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helpdesk.ini");
        std::fs::write(&path, "port=1").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { extension }) if extension == "ini"
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }

    #[test]
    fn env_overrides_win() {
        let mut cfg = HelpdeskConfig::default();
        apply_env_overrides(&mut cfg, |name| match name {
            "GEMINI_API_KEY" => Some("from-env".into()),
            "GEMINI_MODEL" => Some("gemini-pro".into()),
            "PORT" => Some("7000".into()),
            "HELPDESK_DB_PATH" => Some("/tmp/h.db".into()),
            _ => None,
        });
        assert_eq!(
            cfg.gemini.api_key.as_ref().map(|k| k.expose_secret().as_str()),
            Some("from-env")
        );
        assert_eq!(cfg.gemini.model, "gemini-pro");
        assert_eq!(cfg.server.port, 7000);
        assert_eq!(cfg.database.path, Some(PathBuf::from("/tmp/h.db")));
    }

    #[test]
    fn bad_port_override_is_ignored() {
        let mut cfg = HelpdeskConfig::default();
        apply_env_overrides(&mut cfg, |name| (name == "PORT").then(|| "http".to_string()));
        assert_eq!(cfg.server.port, 5000);
    }
}
