use drf_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Responder;
use crate::client::ApiClient;

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4.1-mini";

#[derive(Debug, Clone)]
pub struct OpenAiResponder {
    client: ApiClient,
    model: String,
}

impl OpenAiResponder {
    pub fn new(client: ApiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

impl Responder for OpenAiResponder {
    fn generate(&self, system_instructions: &str, prompt: &str) -> Result<String, AppError> {
        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_instructions,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "requesting completion");
        let resp: ChatResponse = self.client.post_json(
            "chat/completions",
            &req,
            "AI_GENERATE_FAILED",
            "chat completion",
        )?;

        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AppError::new(
                "AI_GENERATE_FAILED",
                "Chat completion response was empty",
            ));
        }
        Ok(text)
    }
}
