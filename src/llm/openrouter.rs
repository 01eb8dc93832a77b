//! OpenRouter (OpenAI-compatible) chat completion client with model fallback.
//!
//! Each model in the fallback list gets up to three attempts. Only rate-limit
//! and capacity errors are retried on the same model; anything else moves on
//! to the next model.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::retry::{BackoffPolicy, retry};

const PROVIDER: &str = "openrouter";

/// Wall-clock limit for one completion call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Free-tier models tried after the primary, in order.
pub const FALLBACK_MODELS: &[&str] = &[
    "mistralai/mistral-small:free",
    "meta-llama/llama-3.2-3b-instruct:free",
    "nousresearch/hermes-3-llama-3.1-405b:free",
    "openai/gpt-oss-20b:free",
];

/// Primary first, then the fallbacks, each model at most once.
pub fn model_chain(primary: &str) -> Vec<String> {
    let mut chain = vec![primary.to_string()];
    for m in FALLBACK_MODELS {
        if !chain.iter().any(|c| c == m) {
            chain.push((*m).to_string());
        }
    }
    chain
}

/// OpenRouter chat completion provider.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    models: Vec<String>,
    retry: BackoffPolicy,
}

impl OpenRouterProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        info!("Using OpenRouter (model: {})", config.model);
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            models: model_chain(&config.model),
            retry: BackoffPolicy::linear(3, Duration::from_millis(500)),
        })
    }

    /// Replace the fallback chain.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Replace the per-model retry policy.
    pub fn with_retry_policy(mut self, policy: BackoffPolicy) -> Self {
        self.retry = policy;
        self
    }

    async fn complete_once(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<String, LlmError> {
        let mut body = serde_json::json!({
            "model": model,
            "messages": request.messages,
            "temperature": request.temperature.unwrap_or(0.2),
        });
        if let Some(max) = request.max_tokens {
            body["max_tokens"] = Value::from(max);
        }

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited {
                provider: PROVIDER.into(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            if text.to_lowercase().contains("capacity") {
                return Err(LlmError::OverCapacity {
                    provider: PROVIDER.into(),
                    model: model.to_string(),
                });
            }
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("HTTP {status}: {}", text.chars().take(200).collect::<String>()),
            });
        }

        let data: Value = resp.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;

        extract_content(&data).ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: "empty completion".into(),
        })
    }
}

/// Pull the reply text out of a chat completion body.
fn extract_content(data: &Value) -> Option<String> {
    let choice = data.get("choices")?.get(0)?;
    let text = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| choice.get("text").and_then(Value::as_str))?;
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn model_name(&self) -> &str {
        self.models.first().map(String::as_str).unwrap_or("")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        for model in &self.models {
            let result = retry(&self.retry, LlmError::is_transient, |attempt| {
                let request = &request;
                async move {
                    let out = self.complete_once(model, request).await;
                    if let Err(ref e) = out {
                        warn!(model = %model, attempt = attempt + 1, error = %e, "Model call failed");
                    }
                    out
                }
            })
            .await;

            match result {
                Ok(content) => {
                    debug!(model = %model, "Completion succeeded");
                    return Ok(CompletionResponse {
                        content,
                        model: model.clone(),
                    });
                }
                Err(_) => info!(model = %model, "Falling back from model"),
            }
        }

        Err(LlmError::AllModelsFailed {
            provider: PROVIDER.into(),
            attempted: self.models.len(),
        })
    }
}
