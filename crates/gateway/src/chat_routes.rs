//! `/chat/*` handlers.

use std::net::SocketAddr;

use {
    axum::{
        extract::{ConnectInfo, Path, Query, State, rejection::JsonRejection},
        http::HeaderMap,
        response::Json,
    },
    chrono::{DateTime, Utc},
    helpdesk_chat::history::{CONVERSATION_LIST_LIMIT, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    helpdesk_sessions::{Sender, StoredMessage},
    serde::{Deserialize, Serialize},
    tracing::{debug, error},
};

use crate::{
    conversation_id::derive_conversation_id,
    error::{ApiError, MISSING_MESSAGE},
    request_throttle::resolve_client_ip,
    server::AppState,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub reply: String,
    pub conversation_id: String,
}

/// A message as shown to clients.
#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<StoredMessage> for MessageView {
    fn from(m: StoredMessage) -> Self {
        Self {
            id: m.id,
            sender: m.sender,
            text: m.text,
            timestamp: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationRef {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub conversation: Option<ConversationRef>,
    pub messages: Vec<MessageView>,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub conversation: ConversationDetail,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<String>,
    pub before: Option<String>,
}

impl HistoryParams {
    /// Missing, unparseable or zero means the default page size.
    fn page_size(&self) -> usize {
        match self.limit.as_deref().map(str::trim).map(str::parse::<i64>) {
            Some(Ok(0)) | Some(Err(_)) | None => DEFAULT_PAGE_SIZE,
            Some(Ok(n)) => usize::try_from(n.clamp(1, MAX_PAGE_SIZE as i64)).unwrap_or(1),
        }
    }

    fn before(&self) -> Result<Option<DateTime<Utc>>, ApiError> {
        match self.before.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => helpdesk_common::time::parse_timestamp(raw)
                .map(Some)
                .map_err(|_| ApiError::bad_request("Invalid 'before' timestamp")),
        }
    }
}

/// `POST /chat/message`
///
/// The service call runs on its own task so a client disconnect does not
/// cancel the model call or the persistence that follows it.
pub async fn send_message_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> ApiResult<SendMessageResponse> {
    let Json(body) = body.map_err(|e| {
        debug!(error = %e, "rejected chat message body");
        ApiError::bad_request(MISSING_MESSAGE)
    })?;
    let message = body
        .get("message")
        .and_then(serde_json::Value::as_str)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::bad_request(MISSING_MESSAGE))?
        .to_string();

    let client_ip = resolve_client_ip(&headers, addr, state.gateway.behind_proxy);
    let body_id = body.get("conversationId").and_then(serde_json::Value::as_str);
    let conversation_id = derive_conversation_id(&headers, body_id, client_ip);

    let gateway = std::sync::Arc::clone(&state.gateway);
    let task = tokio::spawn(async move {
        gateway
            .service
            .send_message(&conversation_id, &message)
            .await
    });

    match task.await {
        Ok(Ok(outcome)) => Ok(Json(SendMessageResponse {
            reply: outcome.reply,
            conversation_id: outcome.conversation_id,
        })),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => {
            error!(error = %e, "chat message task failed");
            Err(ApiError::Internal)
        },
    }
}

/// `GET /chat/history?limit=&before=`
pub async fn history_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> ApiResult<HistoryResponse> {
    let before = params.before()?;
    let client_ip = resolve_client_ip(&headers, addr, state.gateway.behind_proxy);
    let conversation_id = derive_conversation_id(&headers, None, client_ip);

    let page = state
        .gateway
        .history
        .page(&conversation_id, params.page_size(), before)
        .await?;

    Ok(Json(HistoryResponse {
        conversation: page.conversation.map(|c| ConversationRef { id: c.id }),
        messages: page.messages.into_iter().map(Into::into).collect(),
        has_more: page.has_more,
    }))
}

/// `GET /chat/history/{conversation_id}` (admin/debug)
pub async fn conversation_history_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult<TranscriptResponse> {
    let Some((conversation, messages)) =
        state.gateway.history.transcript(&conversation_id).await?
    else {
        return Err(ApiError::NotFound("Conversation not found".into()));
    };

    Ok(Json(TranscriptResponse {
        conversation: ConversationDetail {
            id: conversation.id,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        },
        messages: messages.into_iter().map(Into::into).collect(),
    }))
}

/// `GET /chat/conversations` (admin/debug)
pub async fn conversations_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conversations = state
        .gateway
        .history
        .conversations(CONVERSATION_LIST_LIMIT)
        .await?;
    Ok(Json(serde_json::json!({ "conversations": conversations })))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn params(limit: Option<&str>, before: Option<&str>) -> HistoryParams {
        HistoryParams {
            limit: limit.map(str::to_string),
            before: before.map(str::to_string),
        }
    }

    #[test]
    fn page_size_defaults_and_clamps() {
        assert_eq!(params(None, None).page_size(), 20);
        assert_eq!(params(Some("abc"), None).page_size(), 20);
        assert_eq!(params(Some("0"), None).page_size(), 20);
        assert_eq!(params(Some("-5"), None).page_size(), 1);
        assert_eq!(params(Some("7"), None).page_size(), 7);
        assert_eq!(params(Some("5000"), None).page_size(), 100);
    }

    #[test]
    fn before_accepts_rfc3339_and_millis() {
        assert!(params(None, Some("")).before().unwrap().is_none());
        let a = params(None, Some("2025-01-02T03:04:05.678Z")).before().unwrap();
        let b = params(None, Some("1735787045678")).before().unwrap();
        assert_eq!(a, b);
        assert!(a.is_some());
        assert!(matches!(
            params(None, Some("yesterday")).before(),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn message_view_uses_timestamp_field() {
        let view = MessageView::from(StoredMessage {
            id: 3,
            conversation_id: "c".into(),
            sender: Sender::Assistant,
            text: "hi".into(),
            created_at: helpdesk_common::time::from_millis(0),
        });
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["sender"], "assistant");
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
        assert!(json.get("conversationId").is_none());
    }
}
