//! OpenAI-compatible chat and embedding provider.
//!
//! Talks to any endpoint exposing `/v1/chat/completions` and
//! `/v1/embeddings`. Streaming uses SSE `data:` line framing.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::ChatMessage;
use crate::core::config::ProviderConfig;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    embedding_model: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            client,
        })
    }

    fn post(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        let mut request = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        request
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/v1/models", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.chat_model,
            "messages": messages,
            "stream": false,
        });

        let response = self
            .post(&url, &body)
            .send()
            .await
            .map_err(ApiError::provider)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::provider(format!(
                "chat request failed: {} {}",
                status, text
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::provider)?;
        let content = payload
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.chat_model,
            "messages": messages,
            "stream": true,
        });

        let response = self
            .post(&url, &body)
            .send()
            .await
            .map_err(ApiError::provider)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::provider(format!(
                "stream request failed: {} {}",
                status, text
            )));
        }

        let (tx, rx) = mpsc::channel(64);
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim().to_string();
                            buffer = buffer[pos + 1..].to_string();
                            if line.is_empty() {
                                continue;
                            }
                            let Some(payload) = line.strip_prefix("data:") else {
                                continue;
                            };
                            let data = payload.trim();
                            if data == "[DONE]" {
                                return;
                            }
                            if let Ok(value) = serde_json::from_str::<Value>(data) {
                                if let Some(delta) = extract_delta(&value) {
                                    if !delta.is_empty() && tx.send(Ok(delta)).await.is_err() {
                                        // receiver dropped; stop generating
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(ApiError::provider(err))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.embedding_model,
            "input": inputs,
        });

        let response = self
            .post(&url, &body)
            .send()
            .await
            .map_err(ApiError::provider)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::provider(format!(
                "embedding request failed: {} {}",
                status, text
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::provider)?;
        parse_embedding_response(&payload)
    }
}

fn extract_delta(payload: &Value) -> Option<String> {
    let choice = payload
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first());
    let delta = choice.and_then(|c| c.get("delta"));
    if let Some(content) = delta
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())
    {
        return Some(content.to_string());
    }
    if let Some(content) = choice
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
    {
        return Some(content.to_string());
    }
    None
}

fn parse_embedding_response(payload: &Value) -> Result<Vec<Vec<f32>>, ApiError> {
    let Some(data) = payload.get("data").and_then(|v| v.as_array()) else {
        return Err(ApiError::provider("embedding response missing data array"));
    };

    let mut indexed_embeddings = Vec::with_capacity(data.len());
    for (fallback_idx, item) in data.iter().enumerate() {
        let Some(values) = item.get("embedding").and_then(|v| v.as_array()) else {
            return Err(ApiError::provider(
                "embedding response item missing embedding array",
            ));
        };

        let mut embedding = Vec::with_capacity(values.len());
        for value in values {
            let Some(float_value) = value.as_f64() else {
                return Err(ApiError::provider("embedding contains non-numeric value"));
            };
            embedding.push(float_value as f32);
        }

        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(fallback_idx);
        indexed_embeddings.push((index, embedding));
    }

    indexed_embeddings.sort_by_key(|(idx, _)| *idx);
    Ok(indexed_embeddings
        .into_iter()
        .map(|(_, embedding)| embedding)
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{extract_delta, parse_embedding_response};

    #[test]
    fn parse_embedding_response_preserves_input_order_by_index() {
        let payload = json!({
            "data": [
                {"index": 1, "embedding": [0.3, 0.4]},
                {"index": 0, "embedding": [0.1, 0.2]}
            ]
        });

        let parsed = parse_embedding_response(&payload).expect("embedding payload should parse");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], vec![0.1_f32, 0.2_f32]);
        assert_eq!(parsed[1], vec![0.3_f32, 0.4_f32]);
    }

    #[test]
    fn extract_delta_reads_streaming_and_full_shapes() {
        let streaming = json!({"choices": [{"delta": {"content": "tok"}}]});
        assert_eq!(extract_delta(&streaming).as_deref(), Some("tok"));

        let full = json!({"choices": [{"message": {"content": "whole"}}]});
        assert_eq!(extract_delta(&full).as_deref(), Some("whole"));

        let empty = json!({"choices": []});
        assert_eq!(extract_delta(&empty), None);
    }
}
