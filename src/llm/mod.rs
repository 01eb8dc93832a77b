//! LLM integration.
//!
//! The classification pipeline only sees the `LlmProvider` trait. The one
//! concrete backend talks to OpenRouter's OpenAI-compatible endpoint.

pub mod openrouter;
pub mod provider;

pub use openrouter::OpenRouterProvider;
pub use provider::*;

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    Ok(Arc::new(OpenRouterProvider::new(config)?))
}
