pub mod groq;
pub mod intent;
pub mod ollama;
pub mod responder;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::ChatMessage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl From<&ChatMessage> for Message {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_chat_role().to_string(),
            content: msg.content.clone(),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String>;
}

/// A chat request whose reply must be a single JSON object.
///
/// Both collaborators (availability extraction and booking tool selection)
/// parse replies with [`parse_json_reply`], so every provider is asked for
/// deterministic JSON-only output. The system prompt always goes first.
#[derive(Debug, Clone, Serialize)]
pub struct JsonChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
}

impl JsonChatRequest {
    pub fn new(model: &str, system_prompt: &str, messages: &[Message]) -> Self {
        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(Message {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        });
        all.extend(messages.iter().cloned());

        Self {
            model: model.to_string(),
            messages: all,
            temperature: 0.0,
        }
    }

    /// OpenAI-compatible body; JSON mode is `response_format`.
    pub fn openai_body(&self) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": self.messages,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
        })
    }

    /// Ollama `/api/chat` body; JSON mode is `format`.
    pub fn ollama_body(&self) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": self.messages,
            "stream": false,
            "format": "json",
            "options": { "temperature": self.temperature },
        })
    }
}

/// Pulls a JSON object of type `T` out of a model reply, tolerating markdown
/// fences and surrounding prose.
pub(crate) fn parse_json_reply<T: DeserializeOwned>(response: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str::<T>(response) {
        return Some(value);
    }

    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(value) = serde_json::from_str::<T>(cleaned) {
        return Some(value);
    }

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<T>(&cleaned[start..=end]).ok()
}
