//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the streamed, child-friendly answer LLM.
//! It implements the `CompletionStreamService` port from the `core` crate and
//! hands the raw event-stream body to the relay untouched.

const SYSTEM_INSTRUCTIONS: &str = "あなたは子供向けの優しい先生です。子供が理解しやすいように、簡単な言葉で説明してください。回答は200文字程度にしてください。";

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;
use sugoroku_core::ports::{
    CompletionByteStream, CompletionStreamService, PortError, PortResult,
};
use tracing::{debug, error};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CompletionStreamService` against an
/// OpenAI-compatible `/chat/completions` endpoint with `stream: true`.
#[derive(Clone)]
pub struct OpenAiChatStreamAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiChatStreamAdapter {
    /// Creates a new `OpenAiChatStreamAdapter`.
    ///
    /// `timeout` bounds the wait for the response headers; the body itself is
    /// guarded by the relay's idle timeout.
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            timeout,
        }
    }

    fn request_body(&self, query: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_INSTRUCTIONS },
                { "role": "user", "content": query }
            ],
            "stream": true
        })
    }
}

//=========================================================================================
// `CompletionStreamService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompletionStreamService for OpenAiChatStreamAdapter {
    async fn stream_answer(&self, query: &str) -> PortResult<CompletionByteStream> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting streamed answer from {}", url);

        let send = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(query))
            .send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| {
                PortError::Timeout(format!("Answer stream did not start within {:?}", self.timeout))
            })?
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            error!("OpenAI API error: {}", status);
            return Err(PortError::Unexpected(format!(
                "OpenAI API error: {}",
                status.as_u16()
            )));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| PortError::Unexpected(e.to_string())));
        Ok(Box::pin(body))
    }
}
