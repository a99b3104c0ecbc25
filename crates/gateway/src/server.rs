use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::State,
        http::{HeaderValue, header},
        response::{IntoResponse, Json},
        routing::{get, post},
    },
    helpdesk_chat::{ConversationService, HistoryReader},
    helpdesk_config::HelpdeskConfig,
    helpdesk_providers::{GeminiGateway, ModelGateway},
    helpdesk_sessions::{HistoryStore, SqliteHistoryStore},
    tower_http::{
        cors::{Any, CorsLayer},
        limit::RequestBodyLimitLayer,
        set_header::SetResponseHeaderLayer,
        trace::TraceLayer,
    },
    tracing::info,
};

use crate::{
    chat_routes,
    request_throttle::{RequestThrottle, throttle_gate},
};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 16 * 1024;

// ── Shared app state ─────────────────────────────────────────────────────────

/// Long-lived services shared by every request.
pub struct GatewayState {
    pub service: ConversationService,
    pub history: HistoryReader,
    /// Trust `X-Forwarded-For` when resolving client addresses.
    pub behind_proxy: bool,
    pub version: String,
}

impl GatewayState {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        gateway: Arc<dyn ModelGateway>,
        config: &HelpdeskConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            service: ConversationService::new(Arc::clone(&store), gateway, &config.chat),
            history: HistoryReader::new(store),
            behind_proxy: config.server.behind_proxy,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
    pub request_throttle: Option<RequestThrottle>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the router (shared between production startup and tests).
pub fn build_gateway_app(
    state: Arc<GatewayState>,
    request_throttle: Option<RequestThrottle>,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app_state = AppState {
        gateway: state,
        request_throttle,
    };

    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/chat/message", post(chat_routes::send_message_handler))
        .route("/chat/history", get(chat_routes::history_handler))
        .route(
            "/chat/history/{conversation_id}",
            get(chat_routes::conversation_history_handler),
        )
        .route(
            "/chat/conversations",
            get(chat_routes::conversations_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            throttle_gate,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Open the store, build the model gateway and serve until Ctrl-C.
pub async fn start_gateway(config: HelpdeskConfig) -> anyhow::Result<()> {
    let db_path = config.database.resolved_path();
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let store: Arc<dyn HistoryStore> = Arc::new(SqliteHistoryStore::open(&db_path).await?);
    let gateway: Arc<dyn ModelGateway> = Arc::new(GeminiGateway::from_config(&config.gemini)?);

    let state = GatewayState::new(store, Arc::clone(&gateway), &config);
    let app = build_gateway_app(state, RequestThrottle::from_config(&config.rate_limit));

    let listener =
        tokio::net::TcpListener::bind((config.server.bind.as_str(), config.server.port)).await?;
    let addr = listener.local_addr()?;

    let lines = [
        format!("helpdesk v{}", env!("CARGO_PKG_VERSION")),
        format!("listening on http://{addr}"),
        format!("model: {} ({})", gateway.model(), gateway.name()),
        format!("database: {}", db_path.display()),
        format!(
            "history: {} turns, budget {} tokens",
            config.chat.history_limit, config.chat.token_budget
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let gateway = state.gateway.service.gateway();
    Json(serde_json::json!({
        "status": "ok",
        "provider": gateway.name(),
        "model": gateway.model(),
        "version": state.gateway.version,
    }))
}
