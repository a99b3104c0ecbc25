use std::time::Duration;

use {
    async_trait::async_trait,
    helpdesk_config::GeminiConfig,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, trace, warn},
};

use crate::{
    error::GatewayError,
    model::{GenerateRequest, ModelGateway, Turn},
};

/// Information about a Gemini model returned from the API.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiModelInfo {
    /// Full resource name (e.g., "models/gemini-2.0-flash")
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub input_token_limit: u32,
    #[serde(default)]
    pub output_token_limit: u32,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl GeminiModelInfo {
    /// "models/gemini-2.0-flash" -> "gemini-2.0-flash"
    pub fn model_id(&self) -> &str {
        self.name.strip_prefix("models/").unwrap_or(&self.name)
    }

    pub fn supports_generation(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == "generateContent")
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<GeminiModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// List models that support `generateContent`, sorted by name.
///
/// Follows `nextPageToken` until the listing is exhausted.
pub async fn list_models(
    client: &reqwest::Client,
    api_key: &str,
    base_url: &str,
) -> Result<Vec<GeminiModelInfo>, GatewayError> {
    let url = format!("{}/v1beta/models", base_url.trim_end_matches('/'));
    let mut all_models = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut req = client.get(&url).header("x-goog-api-key", api_key);
        if let Some(ref token) = page_token {
            req = req.query(&[("pageToken", token)]);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(error_for_status(status.as_u16(), &body));
        }

        let list_resp: ListModelsResponse = resp.json().await?;
        all_models.extend(list_resp.models);

        match list_resp.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    let mut models: Vec<_> = all_models
        .into_iter()
        .filter(GeminiModelInfo::supports_generation)
        .collect();
    models.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(models)
}

/// Google Gemini `generateContent` client.
pub struct GeminiGateway {
    api_key: Secret<String>,
    model: String,
    base_url: String,
    safety_threshold: String,
    client: reqwest::Client,
}

impl GeminiGateway {
    pub fn new(api_key: Secret<String>, model: String, base_url: String) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            safety_threshold: "BLOCK_LOW_AND_ABOVE".into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from configuration. Fails when no API key is configured.
    pub fn from_config(config: &GeminiConfig) -> Result<Self, GatewayError> {
        let api_key = config
            .api_key
            .as_ref()
            .filter(|_| config.has_api_key())
            .ok_or(GatewayError::MissingApiKey)?;

        let mut builder = reqwest::Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }

        Ok(Self {
            api_key: Secret::new(api_key.expose_secret().clone()),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            safety_threshold: config.safety_threshold.clone(),
            client: builder.build()?,
        })
    }

    /// List available models using this gateway's key and endpoint.
    pub async fn list_available_models(&self) -> Result<Vec<GeminiModelInfo>, GatewayError> {
        list_models(&self.client, self.api_key.expose_secret(), &self.base_url).await
    }
}

fn to_gemini_content(turn: &Turn) -> serde_json::Value {
    serde_json::json!({
        "role": turn.role.as_str(),
        "parts": [{ "text": turn.text }],
    })
}

/// Request body: history turns followed by the new user message.
fn build_request_body(request: &GenerateRequest, safety_threshold: &str) -> serde_json::Value {
    let mut contents: Vec<serde_json::Value> =
        request.history.iter().map(to_gemini_content).collect();
    contents.push(to_gemini_content(&Turn::user(request.new_message.as_str())));

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": {
            "maxOutputTokens": request.max_output_tokens,
        },
        "safetySettings": [{
            "category": "HARM_CATEGORY_HARASSMENT",
            "threshold": safety_threshold,
        }],
    });

    if !request.system_instruction.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{ "text": request.system_instruction }]
        });
    }
    body
}

fn extract_text(parts: &[serde_json::Value]) -> Option<String> {
    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();

    if texts.is_empty() {
        None
    } else {
        Some(texts.join(""))
    }
}

/// Pull the reply text out of a `generateContent` response.
fn parse_response(resp: &serde_json::Value) -> Result<String, GatewayError> {
    if let Some(reason) = resp["promptFeedback"]["blockReason"].as_str() {
        return Err(GatewayError::Blocked {
            reason: reason.to_string(),
        });
    }

    let candidate = &resp["candidates"][0];
    if candidate.is_null() {
        return Err(GatewayError::InvalidResponse {
            message: "no candidates in response".into(),
        });
    }

    let parts = candidate["content"]["parts"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default();

    match extract_text(parts) {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => match candidate["finishReason"].as_str() {
            Some(reason @ ("SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST")) => {
                Err(GatewayError::Blocked {
                    reason: reason.to_string(),
                })
            },
            _ => Err(GatewayError::EmptyResponse),
        },
    }
}

/// Map a non-success status and body to a typed error.
fn error_for_status(status: u16, body: &str) -> GatewayError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());

    if status == 429 {
        GatewayError::RateLimited { message }
    } else {
        GatewayError::Api { status, message }
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, GatewayError> {
        let body = build_request_body(&request, &self.safety_threshold);

        debug!(
            model = %self.model,
            history_turns = request.history.len(),
            max_output_tokens = request.max_output_tokens,
            "gemini generate request"
        );
        trace!(body = %body, "gemini request body");

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let http_resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body_text, "gemini API error");
            return Err(error_for_status(status.as_u16(), &body_text));
        }

        let resp = http_resp.json::<serde_json::Value>().await?;
        trace!(response = %resp, "gemini raw response");

        parse_response(&resp)
    }
}
