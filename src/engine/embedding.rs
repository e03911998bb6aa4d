// Lorekeep: Embedding client
//
// Calls Ollama or an OpenAI-compatible embedding API. Tries, in order:
//   1. Ollama POST /api/embed       { model, input }  → { embeddings: [[..]] }
//   2. Ollama POST /api/embeddings  { model, prompt } → { embedding: [..] }
//   3. OpenAI POST /v1/embeddings   { model, input }  → { data: [{ embedding }] }
// The first endpoint that answers successfully is remembered.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde_json::{json, Value};

use crate::atoms::error::{LoreError, LoreResult};
use crate::atoms::traits::Embedder;
use crate::atoms::types::EmbeddingConfig;
use crate::engine::http::truncate_utf8;

const API_UNKNOWN: u8 = 0;
const API_OLLAMA: u8 = 1;
const API_OLLAMA_LEGACY: u8 = 2;
const API_OPENAI: u8 = 3;

pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    detected: AtomicU8,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> LoreResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(EmbeddingClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            detected: AtomicU8::new(API_UNKNOWN),
        })
    }

    async fn post(&self, path: &str, body: Value) -> LoreResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|e| {
            LoreError::embedding(format!("{} not reachable: {}", self.base_url, e))
        })?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LoreError::embedding(format!(
                "{} {} - {}",
                path,
                status,
                truncate_utf8(&text, 200)
            )));
        }
        Ok(resp.json().await?)
    }

    async fn embed_with(&self, api: u8, text: &str) -> LoreResult<Vec<f32>> {
        let v = match api {
            API_OLLAMA => self.post("/api/embed", json!({ "model": self.model, "input": text })).await?,
            API_OLLAMA_LEGACY => {
                self.post("/api/embeddings", json!({ "model": self.model, "prompt": text }))
                    .await?
            }
            _ => self.post("/v1/embeddings", json!({ "model": self.model, "input": text })).await?,
        };
        parse_embedding(&v)
    }

    /// Embed a short sample string and return the vector dimension.
    pub async fn test_connection(&self) -> LoreResult<usize> {
        let v = self.embed("connection test").await?;
        info!("[lorekeep:vector] Embedding backend OK, {} dimensions", v.len());
        Ok(v.len())
    }
}

/// Accepts every response shape the supported endpoints return.
pub(crate) fn parse_embedding(v: &Value) -> LoreResult<Vec<f32>> {
    let array = v["embeddings"]
        .get(0)
        .and_then(Value::as_array)
        .or_else(|| v["embedding"].as_array())
        .or_else(|| v["data"][0]["embedding"].as_array())
        .ok_or_else(|| LoreError::embedding("no embedding array in response"))?;
    let vec: Vec<f32> = array
        .iter()
        .filter_map(|x| x.as_f64().map(|f| f as f32))
        .collect();
    if vec.is_empty() {
        return Err(LoreError::embedding("empty embedding vector"));
    }
    Ok(vec)
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> LoreResult<Vec<f32>> {
        let known = self.detected.load(Ordering::Relaxed);
        if known != API_UNKNOWN {
            return self.embed_with(known, text).await;
        }

        let mut errors = Vec::new();
        for api in [API_OLLAMA, API_OLLAMA_LEGACY, API_OPENAI] {
            match self.embed_with(api, text).await {
                Ok(vec) => {
                    self.detected.store(api, Ordering::Relaxed);
                    info!(
                        "[lorekeep:vector] Using embedding endpoint #{} at {} ({} dims)",
                        api,
                        self.base_url,
                        vec.len()
                    );
                    return Ok(vec);
                }
                Err(e) => errors.push(e.to_string()),
            }
        }
        warn!("[lorekeep:vector] No embedding endpoint answered at {}", self.base_url);
        Err(LoreError::embedding(errors.join(" | ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_response_shapes() {
        let ollama = json!({"embeddings": [[0.1, 0.2]]});
        let legacy = json!({"embedding": [0.3]});
        let openai = json!({"data": [{"embedding": [0.5, 0.5, 0.5]}]});
        assert_eq!(parse_embedding(&ollama).unwrap().len(), 2);
        assert_eq!(parse_embedding(&legacy).unwrap(), vec![0.3f32]);
        assert_eq!(parse_embedding(&openai).unwrap().len(), 3);
    }

    #[test]
    fn empty_or_missing_vectors_are_errors() {
        assert!(parse_embedding(&json!({"embeddings": [[]]})).is_err());
        assert!(matches!(
            parse_embedding(&json!({"status": "ok"})),
            Err(LoreError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_backend_reports_every_attempt() {
        let client = EmbeddingClient::new(&EmbeddingConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..Default::default()
        })
        .unwrap();
        let err = client.embed("hello").await.unwrap_err().to_string();
        assert_eq!(err.matches("not reachable").count(), 3);
    }
}
