//! Integration tests for the outbound HTTP paths.
//!
//! Each test spins up an Axum server on a random port standing in for the
//! chat webhook, the automation hook, or the model API, and drives the real
//! reqwest clients against it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use chrono::Utc;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use mail_triage::config::{LlmConfig, NotifyConfig};
use mail_triage::error::LlmError;
use mail_triage::llm::{ChatMessage, CompletionRequest, LlmProvider, OpenRouterProvider};
use mail_triage::notify::{ChannelOutcome, Notifier};
use mail_triage::pipeline::Classifier;
use mail_triage::pipeline::types::{Label, MessageEnvelope};
use mail_triage::retry::BackoffPolicy;
use mail_triage::store::{IngestionSink, MemorySink};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Requests received by the stub, tagged by route.
#[derive(Clone, Default)]
struct Received {
    hits: Arc<Mutex<Vec<(String, Value)>>>,
    /// Chat webhook answers 500 until this many calls have failed.
    chat_failures: Arc<Mutex<u32>>,
}

impl Received {
    fn for_route(&self, route: &str) -> Vec<Value> {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == route)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

async fn chat_hook(State(rx): State<Received>, Json(body): Json<Value>) -> StatusCode {
    rx.hits.lock().unwrap().push(("chat".into(), body));
    let mut failures = rx.chat_failures.lock().unwrap();
    if *failures > 0 {
        *failures -= 1;
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

async fn automation_hook(State(rx): State<Received>, Json(body): Json<Value>) -> StatusCode {
    rx.hits.lock().unwrap().push(("automation".into(), body));
    StatusCode::OK
}

/// Model stub: `busy/*` models are rate limited, `broken/*` fail hard,
/// anything else answers "Interested".
async fn completions(State(rx): State<Received>, Json(body): Json<Value>) -> impl IntoResponse {
    let model = body["model"].as_str().unwrap_or_default().to_string();
    rx.hits.lock().unwrap().push((model.clone(), body));
    if model.starts_with("busy/") {
        (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": "slow down"})))
    } else if model.starts_with("full/") {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "model is at capacity"})),
        )
    } else if model.starts_with("broken/") {
        (StatusCode::BAD_REQUEST, Json(json!({"error": "bad model"})))
    } else {
        (
            StatusCode::OK,
            Json(json!({"choices": [{"message": {"role": "assistant", "content": "Interested"}}]})),
        )
    }
}

/// Start the stub server, return (base url, received log).
async fn start_server(chat_failures: u32) -> (String, Received) {
    let received = Received {
        chat_failures: Arc::new(Mutex::new(chat_failures)),
        ..Received::default()
    };
    let app = Router::new()
        .route("/chat", post(chat_hook))
        .route("/automation", post(automation_hook))
        .route("/api/v1/chat/completions", post(completions))
        .with_state(received.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), received)
}

fn envelope() -> MessageEnvelope {
    MessageEnvelope {
        account: "sales@acme.io".into(),
        folder: "INBOX".into(),
        uid: 77,
        subject: "Re: proposal".into(),
        from: "Frank <frank@buyer.com>".into(),
        to: "sales@acme.io".into(),
        body: "Great, let's move forward.\nThanks".into(),
        date: Utc::now(),
    }
}

fn llm_config(base: &str, model: &str) -> LlmConfig {
    LlmConfig {
        api_key: secrecy::SecretString::from("sk-test"),
        model: model.into(),
        base_url: format!("{base}/api/v1"),
    }
}

fn fast_retry() -> BackoffPolicy {
    BackoffPolicy::linear(3, Duration::from_millis(10))
}

fn request() -> CompletionRequest {
    CompletionRequest::new(vec![ChatMessage::user("Classify this")]).with_temperature(0.2)
}

// ── Notification ────────────────────────────────────────────────────────

#[tokio::test]
async fn interested_message_reaches_both_hooks() {
    timeout(TEST_TIMEOUT, async {
        let (base, received) = start_server(0).await;
        let notify = NotifyConfig {
            slack_webhook_url: Some(format!("{base}/chat")),
            external_webhook_url: Some(format!("{base}/automation")),
        };
        let llm = OpenRouterProvider::new(&llm_config(&base, "good/model"))
            .unwrap()
            .with_models(vec!["good/model".into()]);
        let sink = Arc::new(MemorySink::new());
        let classifier = Classifier::new(
            Some(Arc::new(llm)),
            sink.clone(),
            Arc::new(Notifier::from_config(&notify)),
        );

        let env = envelope();
        assert_eq!(classifier.classify_and_notify(&env).await, Label::Interested);
        assert_eq!(
            sink.get_by_id("sales@acme.io_77").await.unwrap().category,
            Some(Label::Interested)
        );

        let chat = received.for_route("chat");
        assert_eq!(chat.len(), 1);
        assert_eq!(chat[0]["text"], "Interested email: Re: proposal");
        assert_eq!(chat[0]["blocks"].as_array().unwrap().len(), 4);

        let auto = received.for_route("automation");
        assert_eq!(auto.len(), 1);
        assert_eq!(
            auto[0],
            json!({
                "id": "sales@acme.io_77",
                "account": "sales@acme.io",
                "subject": "Re: proposal",
                "from": "Frank <frank@buyer.com>",
                "category": "Interested",
            })
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn chat_hook_recovers_after_transient_failures() {
    timeout(TEST_TIMEOUT, async {
        let (base, received) = start_server(2).await;
        let notify = NotifyConfig {
            slack_webhook_url: Some(format!("{base}/chat")),
            external_webhook_url: None,
        };
        let notifier = Notifier::from_config(&notify);
        let payload = mail_triage::pipeline::types::NotificationPayload::for_label(
            &envelope(),
            Label::Interested,
        )
        .unwrap();

        let report = notifier.notify(&payload).await;
        assert_eq!(report.primary, ChannelOutcome::Delivered { attempts: 3 });
        assert_eq!(report.secondary, ChannelOutcome::Skipped);
        assert_eq!(received.for_route("chat").len(), 3);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreachable_automation_hook_does_not_affect_chat() {
    timeout(TEST_TIMEOUT, async {
        let (base, received) = start_server(0).await;
        let notify = NotifyConfig {
            slack_webhook_url: Some(format!("{base}/chat")),
            external_webhook_url: Some("http://127.0.0.1:1/hook".into()),
        };
        let payload = mail_triage::pipeline::types::NotificationPayload::for_label(
            &envelope(),
            Label::Interested,
        )
        .unwrap();

        let report = Notifier::from_config(&notify).notify(&payload).await;
        assert_eq!(report.primary, ChannelOutcome::Delivered { attempts: 1 });
        assert_eq!(report.secondary, ChannelOutcome::Failed { attempts: 1 });
        assert_eq!(received.for_route("chat").len(), 1);
    })
    .await
    .expect("test timed out");
}

// ── Model fallback ──────────────────────────────────────────────────────

#[tokio::test]
async fn rate_limited_model_is_retried_then_skipped() {
    timeout(TEST_TIMEOUT, async {
        let (base, received) = start_server(0).await;
        let provider = OpenRouterProvider::new(&llm_config(&base, "busy/model"))
            .unwrap()
            .with_models(vec!["busy/model".into(), "good/model".into()])
            .with_retry_policy(fast_retry());

        let resp = provider.complete(request()).await.unwrap();
        assert_eq!(resp.content, "Interested");
        assert_eq!(resp.model, "good/model");
        assert_eq!(received.for_route("busy/model").len(), 3);
        assert_eq!(received.for_route("good/model").len(), 1);

        let sent = &received.for_route("good/model")[0];
        assert_eq!(sent["messages"][0]["role"], "user");
        assert_eq!(sent["messages"][0]["content"], "Classify this");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn capacity_errors_are_retried_but_hard_errors_are_not() {
    timeout(TEST_TIMEOUT, async {
        let (base, received) = start_server(0).await;
        let provider = OpenRouterProvider::new(&llm_config(&base, "broken/model"))
            .unwrap()
            .with_models(vec![
                "broken/model".into(),
                "full/model".into(),
                "good/model".into(),
            ])
            .with_retry_policy(fast_retry());

        let resp = provider.complete(request()).await.unwrap();
        assert_eq!(resp.model, "good/model");
        assert_eq!(received.for_route("broken/model").len(), 1);
        assert_eq!(received.for_route("full/model").len(), 3);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn all_models_failing_is_reported() {
    timeout(TEST_TIMEOUT, async {
        let (base, _received) = start_server(0).await;
        let provider = OpenRouterProvider::new(&llm_config(&base, "broken/a"))
            .unwrap()
            .with_models(vec!["broken/a".into(), "busy/b".into()])
            .with_retry_policy(fast_retry());

        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::AllModelsFailed { attempted: 2, .. }));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failing_model_falls_back_to_rules_in_classifier() {
    timeout(TEST_TIMEOUT, async {
        let (base, _received) = start_server(0).await;
        let provider = OpenRouterProvider::new(&llm_config(&base, "broken/a"))
            .unwrap()
            .with_models(vec!["broken/a".into()])
            .with_retry_policy(fast_retry());
        let sink: Arc<dyn IngestionSink> = Arc::new(MemorySink::new());
        let classifier = Classifier::new(
            Some(Arc::new(provider)),
            sink,
            Arc::new(Notifier::disabled()),
        );

        let result = classifier
            .classify("Auto-reply", "I am out of office until Monday")
            .await;
        assert_eq!(result.label, Label::OutOfOffice);
    })
    .await
    .expect("test timed out");
}
