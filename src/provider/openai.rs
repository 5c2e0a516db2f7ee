use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::sse::{decode_stream, interpret_openai};
use super::{PromptProvider, PromptStream};
use crate::errors::StudioError;
use crate::prompt;
use crate::wire::{PromptMode, PromptRequest};

/// Streams chat completions straight from an OpenAI-compatible endpoint,
/// building the same messages the web backend would.
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
    connect_timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, connect_timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
            connect_timeout_secs,
        }
    }

    fn build_body(&self, req: &PromptRequest) -> Value {
        let (system, text) = match req.mode {
            PromptMode::Generate => (
                prompt::system_prompt_generate(),
                prompt::user_text_generate(&req.instruction, !req.images.is_empty()),
            ),
            PromptMode::Modify => (
                prompt::system_prompt_modify(),
                prompt::user_text_modify(req.current_document.as_deref().unwrap_or_default(), &req.instruction),
            ),
        };
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt::user_content(text, &req.images) }
            ],
            "stream": true
        })
    }
}

#[async_trait]
impl PromptProvider for OpenAiProvider {
    async fn open_stream(&self, req: &PromptRequest) -> Result<PromptStream, StudioError> {
        if self.api_key.is_empty() {
            return Err(StudioError::Validation(
                "no API key configured (set OPENAI_API_KEY or save one with `config set`)".into(),
            ));
        }
        let body = self.build_body(req);
        log::debug!(
            "POST {}/chat/completions model={} images={}",
            self.base_url,
            self.model,
            req.images.len()
        );

        // Only the first response byte is bounded; the stream itself may run long.
        let send = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();
        let resp = tokio::time::timeout(Duration::from_secs(self.connect_timeout_secs), send)
            .await
            .map_err(|_| StudioError::Transport(format!("no response after {}s", self.connect_timeout_secs)))??;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StudioError::Transport(format!("OpenAI API error ({status}): {text}")));
        }
        Ok(decode_stream(resp.bytes_stream(), interpret_openai))
    }
}
