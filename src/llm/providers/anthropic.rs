use async_trait::async_trait;

use crate::errors::{PointClawError, PointClawResult};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, ContentPart, LlmResponse, MessageContent};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API adapter (`adapter = "anthropic"` in config.toml).
pub struct AnthropicProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn list_models(&self) -> PointClawResult<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/models", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PointClawError::LlmProvider(format!("{status}: {err_body}")));
        }
        let json: serde_json::Value = response.json().await?;
        Ok(json["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> PointClawResult<LlmResponse> {
        let body = build_body(&messages, cfg);
        tracing::debug!(provider = %self.id, model = %cfg.model, "sending Anthropic request");

        let response = self
            .client
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PointClawError::LlmProvider(format!("{status}: {err_body}")));
        }

        let json: serde_json::Value = response.json().await?;
        let content = json["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"].as_str() == Some("text"))
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        tracing::info!(
            content_len = content.len(),
            input_tokens = json["usage"]["input_tokens"].as_u64().unwrap_or(0),
            "Anthropic response received"
        );
        Ok(LlmResponse {
            content,
            reasoning: String::new(),
        })
    }
}

/// Map OpenAI-shaped messages onto the Messages API: system turns move to the
/// top-level `system` field and data-URL images become base64 source blocks.
fn build_body(messages: &[ChatMessage], cfg: &CallConfig) -> serde_json::Value {
    let system = messages
        .iter()
        .filter(|m| m.role == "system")
        .map(ChatMessage::text)
        .collect::<Vec<_>>()
        .join("\n\n");

    let turns: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != "system")
        .map(|m| {
            let content = match &m.content {
                MessageContent::Text(t) => serde_json::json!([{ "type": "text", "text": t }]),
                MessageContent::Parts(parts) => serde_json::Value::Array(
                    parts
                        .iter()
                        .map(|part| match part {
                            ContentPart::Text { text } => serde_json::json!({ "type": "text", "text": text }),
                            ContentPart::ImageUrl { image_url } => {
                                let (media_type, data) = split_data_url(&image_url.url);
                                serde_json::json!({
                                    "type": "image",
                                    "source": { "type": "base64", "media_type": media_type, "data": data },
                                })
                            }
                        })
                        .collect(),
                ),
            };
            serde_json::json!({ "role": m.role, "content": content })
        })
        .collect();

    let mut body = serde_json::json!({
        "model": cfg.model,
        "max_tokens": cfg.max_tokens,
        "temperature": cfg.temperature,
        "messages": turns,
    });
    if !system.is_empty() {
        body["system"] = serde_json::Value::String(system);
    }
    body
}

/// `data:image/png;base64,XXXX` → ("image/png", "XXXX"). Bare base64 is assumed PNG.
fn split_data_url(url: &str) -> (&str, &str) {
    url.strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .unwrap_or(("image/png", url))
}
