//! Gemini chat provider (generateContent / streamGenerateContent).
//!
//! Gemini has no "system" role in `contents`; system messages are lifted into
//! the `systemInstruction` field instead.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::core::errors::ApiError;

use super::provider::LlmProvider;
use super::sse::SseLineBuffer;
use super::types::ChatRequest;

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl GeminiProvider {
    pub fn new(client: Client, api_key: String) -> Self {
        Self::with_base_url(
            client,
            "https://generativelanguage.googleapis.com".to_string(),
            api_key,
        )
    }

    pub fn with_base_url(client: Client, base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    fn request_body(request: &ChatRequest) -> Value {
        let mut system_parts: Vec<Value> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for message in &request.messages {
            match message.role.as_str() {
                "system" => system_parts.push(json!({ "text": message.content })),
                role => {
                    let gemini_role = if role == "assistant" { "model" } else { "user" };
                    contents.push(json!({
                        "role": gemini_role,
                        "parts": [{ "text": message.content }],
                    }));
                }
            }
        }

        let mut body = json!({ "contents": contents });

        if let Some(obj) = body.as_object_mut() {
            if !system_parts.is_empty() {
                obj.insert(
                    "systemInstruction".to_string(),
                    json!({ "parts": system_parts }),
                );
            }

            let mut generation_config = serde_json::Map::new();
            if let Some(t) = request.temperature {
                generation_config.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                generation_config.insert("maxOutputTokens".to_string(), json!(t));
            }
            if let Some(s) = &request.stop {
                generation_config.insert("stopSequences".to_string(), json!(s));
            }
            if !generation_config.is_empty() {
                obj.insert(
                    "generationConfig".to_string(),
                    Value::Object(generation_config),
                );
            }
        }

        body
    }

    fn extract_text(payload: &Value) -> Option<&str> {
        payload["candidates"][0]["content"]["parts"][0]["text"].as_str()
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, ApiError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model_id, self.api_key
        );
        let body = Self::request_body(&request);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::network)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Network(format!("Gemini chat error: {text}")));
        }

        let payload: Value = res.json().await.map_err(ApiError::network)?;

        Ok(Self::extract_text(&payload).unwrap_or_default().to_string())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, model_id, self.api_key
        );
        let body = Self::request_body(&request);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::network)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Network(format!("Gemini stream error: {text}")));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut lines = SseLineBuffer::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        for line in lines.push(&bytes) {
                            let Some(data) = line.strip_prefix("data: ") else {
                                continue;
                            };
                            if let Ok(json) = serde_json::from_str::<Value>(data) {
                                if let Some(content) = Self::extract_text(&json) {
                                    if !content.is_empty()
                                        && tx.send(Ok(content.to_string())).await.is_err()
                                    {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::network(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
