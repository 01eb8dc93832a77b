//! Classification pipeline.
//!
//! `classify` asks the model for a single label and falls back to the
//! deterministic rules on any error or unrecognized reply.
//! `classify_and_notify` writes the label and alerts on `Interested`; it
//! never fails.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::notify::Notifier;
use crate::pipeline::rules::FallbackRules;
use crate::pipeline::types::{
    ClassificationResult, Label, MessageEnvelope, NotificationPayload, Provenance,
};
use crate::store::IngestionSink;

/// Subject characters sent to the model.
pub const MAX_SUBJECT_CHARS: usize = 800;
/// Body characters sent to the model.
pub const MAX_BODY_CHARS: usize = 3000;

const TEMPERATURE: f32 = 0.2;

pub struct Classifier {
    llm: Option<Arc<dyn LlmProvider>>,
    rules: FallbackRules,
    sink: Arc<dyn IngestionSink>,
    notifier: Arc<Notifier>,
}

impl Classifier {
    /// `llm: None` runs on the fallback rules alone.
    pub fn new(
        llm: Option<Arc<dyn LlmProvider>>,
        sink: Arc<dyn IngestionSink>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            llm,
            rules: FallbackRules::default_rules(),
            sink,
            notifier,
        }
    }

    /// Assign a label. Model failures are never surfaced.
    pub async fn classify(&self, subject: &str, body: &str) -> ClassificationResult {
        let subject = truncate_chars(subject, MAX_SUBJECT_CHARS);
        let body = truncate_chars(body, MAX_BODY_CHARS);

        if let Some(llm) = &self.llm {
            let request = CompletionRequest::new(vec![ChatMessage::user(build_prompt(
                subject, body,
            ))])
            .with_temperature(TEMPERATURE);

            match llm.complete(request).await {
                Ok(resp) => match Label::from_model_reply(&resp.content) {
                    Some(label) => {
                        return ClassificationResult {
                            label,
                            provenance: Provenance::Model,
                        };
                    }
                    None => debug!(
                        model = %resp.model,
                        reply = %resp.content.lines().next().unwrap_or(""),
                        "Model reply outside label set"
                    ),
                },
                Err(e) => warn!(error = %e, "LLM classification failed"),
            }
        }

        ClassificationResult {
            label: self.rules.classify(subject, body),
            provenance: Provenance::Heuristic,
        }
    }

    /// Classify, store the label, and notify when it qualifies.
    ///
    /// On a store failure the label is forced to `Not Interested` and one
    /// more best-effort write is attempted.
    pub async fn classify_and_notify(&self, envelope: &MessageEnvelope) -> Label {
        let id = envelope.doc_id();
        match self.label_and_notify(envelope, &id).await {
            Ok(label) => label,
            Err(e) => {
                warn!(id = %id, error = %e, "classify_and_notify failed, storing Not Interested");
                if let Err(e) = self.sink.update_label(&id, Label::NotInterested).await {
                    debug!(id = %id, error = %e, "Fallback label write failed");
                }
                Label::NotInterested
            }
        }
    }

    async fn label_and_notify(
        &self,
        envelope: &MessageEnvelope,
        id: &str,
    ) -> Result<Label, StoreError> {
        let result = self.classify(&envelope.subject, &envelope.body).await;
        self.sink.update_label(id, result.label).await?;
        info!(
            id = %id,
            label = %result.label,
            provenance = %result.provenance,
            "Message classified"
        );

        if let Some(payload) = NotificationPayload::for_label(envelope, result.label) {
            let report = self.notifier.notify(&payload).await;
            debug!(id = %id, ?report, "Notification dispatched");
        }
        Ok(result.label)
    }
}

/// Prefix of at most `max` characters, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn build_prompt(subject: &str, body: &str) -> String {
    let labels = Label::ALL.map(|l| l.as_str()).join(", ");
    format!(
        "You are a classifier. Choose exactly ONE label from the list below for the email:\n\
         [{labels}]\n\n\
         Return ONLY the label name on a single line (no explanation).\n\n\
         Email Subject:\n{subject}\n\n\
         Email Body:\n{body}"
    )
}
