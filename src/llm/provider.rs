//! Provider-agnostic chat completion types and the `LlmProvider` seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Chat role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    /// Model that actually answered (may differ from the primary on fallback).
    pub model: String,
}

/// An LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Primary model identifier.
    fn model_name(&self) -> &str;

    /// Run a chat completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_sets_options() {
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")])
            .with_temperature(0.2)
            .with_max_tokens(16);
        assert_eq!(req.temperature, Some(0.2));
        assert_eq!(req.max_tokens, Some(16));
        assert_eq!(req.messages[0].role, Role::User);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_value(ChatMessage::system("x")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "x");
    }
}
