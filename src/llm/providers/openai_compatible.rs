use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{PointClawError, PointClawResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunkKind};

/// Chat-completions provider for OpenAI and compatible servers (Ollama `/v1`,
/// LM Studio, vLLM, ...). `api_base` is the URL prefix before `/chat/completions`.
pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn list_models(&self) -> PointClawResult<Vec<String>> {
        let url = format!("{}/models", self.api_base);
        let response = self.request(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PointClawError::LlmProvider(format!("{status}: {err_body}")));
        }
        let json: serde_json::Value = response.json().await?;
        let mut models: Vec<String> = json["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        models.sort();
        tracing::debug!(provider = %self.id, count = models.len(), "models listed");
        Ok(models)
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> PointClawResult<LlmResponse> {
        let body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
            "max_tokens": cfg.max_tokens,
        });

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            "sending LLM request"
        );
        tracing::trace!(body = %sanitized_body(&body), "request body (sanitized, base64 omitted)");

        let url = format!("{}/chat/completions", self.api_base);
        let response = self.request(self.client.post(&url)).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PointClawError::LlmProvider(format!("{status}: {err_body}")));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Handle SSE streaming response, accumulating the full text.
    async fn handle_stream(&self, response: reqwest::Response) -> PointClawResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut line_buf = String::new();
        let mut resp_content = String::new();
        let mut resp_reasoning = String::new();

        'stream: while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            line_buf.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = line_buf.find('\n') {
                let line = line_buf[..pos].trim().to_string();
                line_buf.drain(..=pos);
                if line.is_empty() {
                    continue;
                }

                match sse_parser::parse_sse_line(&line) {
                    Ok(Some(chunk)) => match chunk.kind {
                        StreamChunkKind::Reasoning => resp_reasoning.push_str(&chunk.content),
                        StreamChunkKind::Content => resp_content.push_str(&chunk.content),
                        StreamChunkKind::Done => break 'stream,
                    },
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!("SSE parse skipped: {e}");
                    }
                }
            }
        }

        tracing::info!(
            content_len = resp_content.len(),
            reasoning_len = resp_reasoning.len(),
            "LLM stream complete"
        );

        Ok(LlmResponse {
            content: resp_content,
            reasoning: resp_reasoning,
        })
    }

    /// Handle a non-streaming JSON response.
    async fn handle_json(&self, response: reqwest::Response) -> PointClawResult<LlmResponse> {
        let json: serde_json::Value = response.json().await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        let reasoning = json["choices"][0]["message"]["reasoning_content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        tracing::info!(
            content_len = content.len(),
            total_tokens = json["usage"]["total_tokens"].as_u64().unwrap_or(0),
            "LLM JSON response received"
        );

        Ok(LlmResponse { content, reasoning })
    }
}

/// Clone the body with every image payload replaced, for logging.
fn sanitized_body(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            // content can be string or array of parts; we only touch the array case.
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    if let Some(url) = part.get_mut("image_url").and_then(|u| u.get_mut("url")) {
                        *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_body_hides_images() {
        let msg = ChatMessage::user_with_png("QUJDREVG", "what now?");
        let body = serde_json::json!({ "model": "m", "messages": [msg] });
        let logged = sanitized_body(&body);
        assert!(logged.contains("<omitted_base64_image>"));
        assert!(!logged.contains("QUJDREVG"));
        assert!(logged.contains("what now?"));
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let p = OpenAiCompatibleProvider::new("local".into(), "http://localhost:11434/v1/".into(), String::new());
        assert_eq!(p.api_base, "http://localhost:11434/v1");
        assert_eq!(p.name(), "local");
    }
}
