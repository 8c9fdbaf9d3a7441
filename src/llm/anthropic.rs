use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::ChatModel;
use super::types::ChatRequest;
use crate::errors::BotError;

const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The messages API requires max_tokens; used when the request leaves it unset.
const FALLBACK_MAX_TOKENS: u32 = 1024;

/// Chat client for the Anthropic messages API. System segments are hoisted
/// into the top-level `system` field; the messages array carries only
/// user/assistant turns.
#[derive(Clone)]
pub struct AnthropicProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        timeout: Duration,
    ) -> Result<Self, BotError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BotError::internal)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client,
        })
    }

    fn map_request_error(err: reqwest::Error) -> BotError {
        if err.is_timeout() {
            BotError::GenerationTimeout
        } else {
            BotError::GenerationUnavailable(err.to_string())
        }
    }
}

#[async_trait]
impl ChatModel for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, request: ChatRequest) -> Result<String, BotError> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut system_parts: Vec<&str> = Vec::new();
        let mut turns: Vec<Value> = Vec::new();
        for message in &request.messages {
            if message.role == "system" {
                system_parts.push(&message.content);
            } else {
                turns.push(json!({
                    "role": message.role,
                    "content": message.content,
                }));
            }
        }

        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens.unwrap_or(FALLBACK_MAX_TOKENS),
            "messages": turns,
        });

        if let Some(obj) = body.as_object_mut() {
            if !system_parts.is_empty() {
                obj.insert("system".to_string(), json!(system_parts.join("\n\n")));
            }
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
        }

        let mut req = self
            .client
            .post(&url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }

        let res = req.send().await.map_err(Self::map_request_error)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(BotError::GenerationUnavailable(format!(
                "messages request failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(Self::map_request_error)?;

        payload["content"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                BotError::GenerationUnavailable("response carried no text content".to_string())
            })
    }
}
