//! Shared types for the classification pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Label ───────────────────────────────────────────────────────────

/// Classification outcome. Always exactly one of the five values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "Interested")]
    Interested,
    #[serde(rename = "Meeting Booked")]
    MeetingBooked,
    #[serde(rename = "Not Interested")]
    NotInterested,
    #[serde(rename = "Spam")]
    Spam,
    #[serde(rename = "Out of Office")]
    OutOfOffice,
}

impl Label {
    /// All labels, in the order they are offered to the model.
    pub const ALL: [Label; 5] = [
        Label::Interested,
        Label::MeetingBooked,
        Label::NotInterested,
        Label::Spam,
        Label::OutOfOffice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interested => "Interested",
            Self::MeetingBooked => "Meeting Booked",
            Self::NotInterested => "Not Interested",
            Self::Spam => "Spam",
            Self::OutOfOffice => "Out of Office",
        }
    }

    /// Case-insensitive exact match against a label name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s))
    }

    /// Match a model reply. Only the first line counts.
    pub fn from_model_reply(reply: &str) -> Option<Self> {
        let first = reply.lines().next().unwrap_or("");
        Self::parse(first)
    }

    /// Labels that trigger a notification.
    pub fn is_notifiable(&self) -> bool {
        matches!(self, Self::Interested)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a label came from. Used for logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Model,
    Heuristic,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model => write!(f, "model"),
            Self::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Result of a single classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationResult {
    pub label: Label,
    pub provenance: Provenance,
}

// ── Envelope ────────────────────────────────────────────────────────

/// A normalized message, immutable once built.
///
/// `(account, uid)` is unique within `folder` and forms the document id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub account: String,
    pub folder: String,
    pub uid: u32,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub date: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Canonical document id: `account_uid`.
    pub fn doc_id(&self) -> String {
        doc_id(&self.account, self.uid)
    }

    /// Index shape with no label yet.
    pub fn to_document(&self) -> EmailDocument {
        EmailDocument {
            account: self.account.clone(),
            folder: self.folder.clone(),
            uid: self.uid.to_string(),
            date: self.date,
            subject: self.subject.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            body: self.body.clone(),
            category: None,
        }
    }
}

/// Build a document id from its parts.
pub fn doc_id(account: &str, uid: u32) -> String {
    format!("{account}_{uid}")
}

// ── Stored document ─────────────────────────────────────────────────

/// Shape written to the ingestion sink, keyed by `account_uid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDocument {
    pub account: String,
    pub folder: String,
    pub uid: String,
    pub date: DateTime<Utc>,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub category: Option<Label>,
}

// ── Notification ────────────────────────────────────────────────────

/// Alert view of an envelope. Only built for notifiable labels.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub id: String,
    pub account: String,
    pub subject: String,
    pub from: String,
    pub body: String,
    pub label: Label,
}

impl NotificationPayload {
    /// Returns `None` unless `label` is notifiable.
    pub fn for_label(envelope: &MessageEnvelope, label: Label) -> Option<Self> {
        if !label.is_notifiable() {
            return None;
        }
        Some(Self {
            id: envelope.doc_id(),
            account: envelope.account.clone(),
            subject: envelope.subject.clone(),
            from: envelope.from.clone(),
            body: envelope.body.clone(),
            label,
        })
    }
}
