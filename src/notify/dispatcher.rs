//! Notification dispatcher.
//!
//! Two independent channels:
//! - primary chat webhook, retried with exponential backoff
//! - secondary automation hook, one attempt with a short timeout
//!
//! Neither channel reports failure to the caller. Outcomes come back as a
//! `NotifyReport` for logging and tests.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::NotifyConfig;
use crate::notify::payload::{automation_event, chat_message};
use crate::notify::transport::{HttpTransport, WebhookTransport};
use crate::pipeline::types::NotificationPayload;
use crate::retry::{BackoffPolicy, retry};

const PRIMARY_CHANNEL: &str = "chat";
const SECONDARY_CHANNEL: &str = "automation";

/// Per-attempt timeout on the chat webhook.
pub const PRIMARY_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout on the automation hook.
pub const SECONDARY_TIMEOUT: Duration = Duration::from_secs(5);
/// Default delivery attempts on the chat webhook.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Delay after the first failed attempt; doubles each time.
pub const BASE_DELAY: Duration = Duration::from_millis(500);

/// What happened on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// No URL configured.
    Skipped,
    Delivered { attempts: u32 },
    Failed { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyReport {
    pub primary: ChannelOutcome,
    pub secondary: ChannelOutcome,
}

pub struct Notifier {
    transport: Arc<dyn WebhookTransport>,
    primary_url: Option<String>,
    secondary_url: Option<String>,
    max_attempts: u32,
}

impl Notifier {
    pub fn new(config: &NotifyConfig, transport: Arc<dyn WebhookTransport>) -> Self {
        if config.slack_webhook_url.is_none() {
            warn!("SLACK_WEBHOOK_URL not set, chat notifications disabled");
        }
        Self {
            transport,
            primary_url: config.slack_webhook_url.clone(),
            secondary_url: config.external_webhook_url.clone(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Notifier posting over HTTP.
    pub fn from_config(config: &NotifyConfig) -> Self {
        Self::new(config, Arc::new(HttpTransport::new()))
    }

    /// Notifier with no channels configured.
    pub fn disabled() -> Self {
        Self {
            transport: Arc::new(HttpTransport::new()),
            primary_url: None,
            secondary_url: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Deliver on both channels concurrently. Never fails.
    pub async fn notify(&self, payload: &NotificationPayload) -> NotifyReport {
        let (primary, secondary) =
            tokio::join!(self.send_primary(payload), self.send_secondary(payload));
        NotifyReport { primary, secondary }
    }

    async fn send_primary(&self, payload: &NotificationPayload) -> ChannelOutcome {
        let Some(url) = self.primary_url.as_deref() else {
            debug!(id = %payload.id, "Chat notification skipped, no webhook configured");
            return ChannelOutcome::Skipped;
        };

        let body = chat_message(payload);
        let policy = BackoffPolicy::exponential(self.max_attempts, BASE_DELAY);
        let max = policy.max_attempts.max(1);
        let mut tried = 0;

        let result = retry(&policy, |_| true, |attempt| {
            tried = attempt + 1;
            let post = self
                .transport
                .post_json(PRIMARY_CHANNEL, url, &body, PRIMARY_TIMEOUT);
            async move {
                let res = post.await;
                if let Err(e) = &res {
                    warn!(attempt = attempt + 1, max, error = %e, "Chat webhook post failed");
                }
                res
            }
        })
        .await;

        match result {
            Ok(()) => {
                info!(id = %payload.id, attempts = tried, "Chat notification sent");
                ChannelOutcome::Delivered { attempts: tried }
            }
            Err(e) => {
                error!(id = %payload.id, attempts = tried, error = %e, "Chat notification permanently failed");
                ChannelOutcome::Failed { attempts: tried }
            }
        }
    }

    async fn send_secondary(&self, payload: &NotificationPayload) -> ChannelOutcome {
        let Some(url) = self.secondary_url.as_deref() else {
            return ChannelOutcome::Skipped;
        };

        let body = automation_event(payload);
        match self
            .transport
            .post_json(SECONDARY_CHANNEL, url, &body, SECONDARY_TIMEOUT)
            .await
        {
            Ok(()) => {
                debug!(id = %payload.id, "Automation hook delivered");
                ChannelOutcome::Delivered { attempts: 1 }
            }
            Err(e) => {
                warn!(id = %payload.id, error = %e, "Automation hook failed");
                ChannelOutcome::Failed { attempts: 1 }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use crate::error::NotifyError;
    use crate::pipeline::types::Label;

    /// Records each call; fails the channels listed in `failing`.
    struct RecordingTransport {
        calls: Mutex<Vec<(String, Instant, serde_json::Value)>>,
        failing: Vec<&'static str>,
    }

    impl RecordingTransport {
        fn new(failing: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                failing,
            })
        }

        fn calls_for(&self, channel: &str) -> Vec<(Instant, serde_json::Value)> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _, _)| c == channel)
                .map(|(_, t, v)| (*t, v.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl WebhookTransport for RecordingTransport {
        async fn post_json(
            &self,
            channel: &str,
            _url: &str,
            body: &serde_json::Value,
            _timeout: Duration,
        ) -> Result<(), NotifyError> {
            self.calls
                .lock()
                .unwrap()
                .push((channel.to_string(), Instant::now(), body.clone()));
            if self.failing.contains(&channel) {
                Err(NotifyError::Status {
                    channel: channel.to_string(),
                    status: 503,
                })
            } else {
                Ok(())
            }
        }
    }

    fn config(primary: bool, secondary: bool) -> NotifyConfig {
        NotifyConfig {
            slack_webhook_url: primary.then(|| "http://chat.invalid/hook".to_string()),
            external_webhook_url: secondary.then(|| "http://auto.invalid/hook".to_string()),
        }
    }

    fn payload() -> NotificationPayload {
        NotificationPayload {
            id: "sales@acme.io_9".into(),
            account: "sales@acme.io".into(),
            subject: "Let's go".into(),
            from: "dave@buyer.com".into(),
            body: "Count me in".into(),
            label: Label::Interested,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn primary_retries_with_exponential_gaps() {
        let transport = RecordingTransport::new(vec![PRIMARY_CHANNEL]);
        let notifier = Notifier::new(&config(true, false), transport.clone());

        let report = notifier.notify(&payload()).await;
        assert_eq!(report.primary, ChannelOutcome::Failed { attempts: 3 });
        assert_eq!(report.secondary, ChannelOutcome::Skipped);

        let calls = transport.calls_for(PRIMARY_CHANNEL);
        assert_eq!(calls.len(), 3);
        let gap1 = calls[1].0 - calls[0].0;
        let gap2 = calls[2].0 - calls[1].0;
        assert!(gap1 >= Duration::from_millis(500) && gap1 < Duration::from_millis(550));
        assert!(gap2 >= Duration::from_millis(1000) && gap2 < Duration::from_millis(1050));
    }

    #[tokio::test(start_paused = true)]
    async fn secondary_failure_is_isolated() {
        let transport = RecordingTransport::new(vec![SECONDARY_CHANNEL]);
        let notifier = Notifier::new(&config(true, true), transport.clone());

        let report = notifier.notify(&payload()).await;
        assert_eq!(report.primary, ChannelOutcome::Delivered { attempts: 1 });
        assert_eq!(report.secondary, ChannelOutcome::Failed { attempts: 1 });
        assert_eq!(transport.calls_for(SECONDARY_CHANNEL).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn secondary_sent_even_when_primary_fails() {
        let transport = RecordingTransport::new(vec![PRIMARY_CHANNEL]);
        let notifier = Notifier::new(&config(true, true), transport.clone());

        let report = notifier.notify(&payload()).await;
        assert!(matches!(report.primary, ChannelOutcome::Failed { .. }));
        assert_eq!(report.secondary, ChannelOutcome::Delivered { attempts: 1 });

        let event = &transport.calls_for(SECONDARY_CHANNEL)[0].1;
        assert_eq!(event["category"], "Interested");
    }

    #[tokio::test]
    async fn nothing_configured_skips_both() {
        let transport = RecordingTransport::new(vec![]);
        let notifier = Notifier::new(&config(false, false), transport.clone());
        let report = notifier.notify(&payload()).await;
        assert_eq!(report.primary, ChannelOutcome::Skipped);
        assert_eq!(report.secondary, ChannelOutcome::Skipped);
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn custom_attempt_count() {
        let transport = RecordingTransport::new(vec![PRIMARY_CHANNEL]);
        let notifier =
            Notifier::new(&config(true, false), transport.clone()).with_max_attempts(5);
        let report = notifier.notify(&payload()).await;
        assert_eq!(report.primary, ChannelOutcome::Failed { attempts: 5 });
    }
}
