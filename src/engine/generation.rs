// Lorekeep: OpenAI-compatible text generator
// Works against OpenAI, OpenRouter, Ollama (/v1), LM Studio, llama.cpp server
// and anything else exposing POST {base_url}/chat/completions.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::Client;
use serde_json::{json, Value};

use crate::atoms::error::{LoreError, LoreResult};
use crate::atoms::traits::TextGenerator;
use crate::atoms::types::GenerationConfig;
use crate::engine::http::{
    is_retryable_status, parse_retry_after, retry_delay, truncate_utf8, MAX_RETRIES,
};

const BACKEND: &str = "openai";

pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> LoreResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(OpenAiGenerator {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            temperature: config.temperature,
        })
    }

    fn request_body(&self, prompt: &str, max_tokens: Option<u32>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "stream": false,
        });
        if let Some(max) = max_tokens {
            body["max_tokens"] = json!(max);
        }
        body
    }
}

/// Pull the assistant text out of a chat completion response.
pub(crate) fn parse_completion(v: &Value) -> LoreResult<String> {
    let choice = v["choices"]
        .get(0)
        .ok_or_else(|| LoreError::generation(BACKEND, "response has no choices"))?;
    let text = choice["message"]["content"]
        .as_str()
        .or_else(|| choice["text"].as_str())
        .ok_or_else(|| LoreError::generation(BACKEND, "response has no message content"))?;
    Ok(text.to_string())
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn generate(&self, prompt: &str, max_tokens: Option<u32>) -> LoreResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(prompt, max_tokens);
        debug!("[lorekeep:summary] Completion request to {} model={}", url, self.model);

        let mut last_error = String::new();
        let mut retry_after: Option<u64> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = retry_delay(attempt - 1, retry_after.take()).await;
                warn!(
                    "[lorekeep:summary] Completion retry {}/{} after {}ms",
                    attempt,
                    MAX_RETRIES,
                    delay.as_millis()
                );
            }

            let mut req = self.client.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }

            let response = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("HTTP request failed: {}", e);
                    if attempt < MAX_RETRIES {
                        continue;
                    }
                    return Err(LoreError::generation(BACKEND, last_error));
                }
            };

            let status = response.status().as_u16();
            if !response.status().is_success() {
                retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let body_text = response.text().await.unwrap_or_default();
                last_error = format!("API error {}: {}", status, truncate_utf8(&body_text, 200));
                error!(
                    "[lorekeep:summary] Completion error {}: {}",
                    status,
                    truncate_utf8(&body_text, 500)
                );
                // Auth errors are never retried
                if status == 401 || status == 403 {
                    return Err(LoreError::generation(BACKEND, last_error));
                }
                if is_retryable_status(status) && attempt < MAX_RETRIES {
                    continue;
                }
                return Err(LoreError::generation(BACKEND, last_error));
            }

            let v: Value = response.json().await?;
            return parse_completion(&v);
        }

        Err(LoreError::generation(BACKEND, last_error))
    }
}
