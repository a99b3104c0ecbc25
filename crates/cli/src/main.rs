mod db_commands;

use std::sync::Arc;

use {
    anyhow::bail,
    clap::{Parser, Subcommand},
    helpdesk_chat::HistoryReader,
    helpdesk_config::{HelpdeskConfig, Severity},
    helpdesk_providers::GeminiGateway,
    helpdesk_sessions::SqliteHistoryStore,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "helpdesk", about = "Helpdesk customer-support chat backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Custom config directory (overrides default ~/.config/helpdesk/).
    #[arg(long, global = true, env = "HELPDESK_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,
    /// Custom data directory (overrides default data dir).
    #[arg(long, global = true, env = "HELPDESK_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default when no subcommand is provided).
    Serve,
    /// List Gemini models that support content generation.
    Models,
    /// Database management (migrate, reset).
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
    /// Print the stored transcript of a conversation.
    History {
        /// Conversation id, e.g. `session_abc` or `ip_203.0.113.9`.
        conversation: String,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Resolve directories, load the config file and apply CLI overrides.
fn load_config(cli: &Cli) -> HelpdeskConfig {
    if let Some(ref dir) = cli.config_dir {
        helpdesk_config::set_config_dir(dir.clone());
    }
    if let Some(ref dir) = cli.data_dir {
        helpdesk_config::set_data_dir(dir.clone());
    }

    let mut config = helpdesk_config::discover_and_load();
    if let Some(ref bind) = cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config
}

/// Log every diagnostic and refuse to continue when any of them is an error.
fn check_config(config: &HelpdeskConfig) -> anyhow::Result<()> {
    let result = helpdesk_config::validate(config);
    for diagnostic in &result.diagnostics {
        match diagnostic.severity {
            Severity::Error => error!("{diagnostic}"),
            Severity::Warning => warn!("{diagnostic}"),
            Severity::Info => info!("{diagnostic}"),
        }
    }
    if result.has_errors() {
        bail!(
            "invalid configuration ({} error(s))",
            result.count(Severity::Error)
        );
    }
    Ok(())
}

async fn list_models(config: &HelpdeskConfig) -> anyhow::Result<()> {
    let gateway = GeminiGateway::from_config(&config.gemini)?;
    let models = gateway.list_available_models().await?;
    if models.is_empty() {
        println!("No models found.");
        return Ok(());
    }
    for model in &models {
        let marker = if model.model_id() == config.gemini.model {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {:<40} {} (in {}, out {})",
            model.model_id(),
            model.display_name,
            model.input_token_limit,
            model.output_token_limit
        );
    }
    Ok(())
}

async fn print_history(config: &HelpdeskConfig, conversation_id: &str) -> anyhow::Result<()> {
    let db_path = config.database.resolved_path();
    if !db_path.exists() {
        bail!("no database at {}", db_path.display());
    }
    let store = Arc::new(SqliteHistoryStore::open(&db_path).await?);
    let reader = HistoryReader::new(store);

    let Some((conversation, messages)) = reader.transcript(conversation_id).await? else {
        bail!("conversation '{conversation_id}' not found");
    };

    println!(
        "{} (created {}, updated {}, {} message(s))",
        conversation.id,
        conversation.created_at.to_rfc3339(),
        conversation.updated_at.to_rfc3339(),
        messages.len()
    );
    for message in &messages {
        println!(
            "[{}] {:>9}: {}",
            message.created_at.format("%Y-%m-%d %H:%M:%S"),
            message.sender,
            message.text
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "helpdesk starting");

    let config = load_config(&cli);

    match cli.command {
        None | Some(Commands::Serve) => {
            check_config(&config)?;
            helpdesk_gateway::start_gateway(config).await
        },
        Some(Commands::Models) => list_models(&config).await,
        Some(Commands::Db { action }) => {
            db_commands::handle_db(action, &config.database.resolved_path()).await
        },
        Some(Commands::History { conversation }) => print_history(&config, &conversation).await,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["helpdesk"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli =
            Cli::try_parse_from(["helpdesk", "serve", "--port", "9000", "--bind", "0.0.0.0"])
                .unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.bind.as_deref(), Some("0.0.0.0"));
    }

    #[test]
    fn history_takes_a_conversation_id() {
        let cli = Cli::try_parse_from(["helpdesk", "history", "session_abc"]).unwrap();
        match cli.command {
            Some(Commands::History { conversation }) => assert_eq!(conversation, "session_abc"),
            _ => panic!("expected history command"),
        }
    }

    #[test]
    fn db_requires_an_action() {
        assert!(Cli::try_parse_from(["helpdesk", "db"]).is_err());
        let cli = Cli::try_parse_from(["helpdesk", "db", "migrate"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Db {
                action: db_commands::DbAction::Migrate
            })
        ));
    }

    #[test]
    fn missing_api_key_fails_the_check() {
        let config = HelpdeskConfig::default();
        assert!(config.gemini.api_key.is_none());
        let err = check_config(&config).unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration (1 error(s))");
    }
}
