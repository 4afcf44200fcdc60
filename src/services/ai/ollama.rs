use anyhow::Context;
use async_trait::async_trait;

use super::{JsonChatRequest, LlmProvider, Message};

pub struct OllamaProvider {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(url: String, model: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let request = JsonChatRequest::new(&self.model, system_prompt, messages);

        let resp = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&request.ollama_body())
            .send()
            .await
            .context("failed to call Ollama API")?
            .error_for_status()
            .context("Ollama API returned error")?;

        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse Ollama response")?;

        let content = data["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing content in Ollama response"))?;
        tracing::debug!(model = %self.model, reply_len = content.len(), "ollama structured reply");
        Ok(content.to_string())
    }
}
