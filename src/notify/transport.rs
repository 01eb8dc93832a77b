//! JSON webhook POST.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::NotifyError;

/// Delivers a JSON body to a webhook URL.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// POST `body` to `url`. Non-2xx responses are errors.
    async fn post_json(
        &self,
        channel: &str,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<(), NotifyError>;
}

/// reqwest-backed transport.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post_json(
        &self,
        channel: &str,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout {
                        channel: channel.to_string(),
                        timeout,
                    }
                } else {
                    NotifyError::RequestFailed {
                        channel: channel.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                channel: channel.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
