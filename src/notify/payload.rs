//! Webhook bodies.

use serde_json::{Value, json};

use crate::pipeline::types::NotificationPayload;

/// Characters of body shown in the chat preview.
const PREVIEW_CHARS: usize = 400;

/// Chat message: plain-text fallback plus Block Kit sections.
pub fn chat_message(p: &NotificationPayload) -> Value {
    let subject_line = if p.subject.is_empty() {
        "no-subject"
    } else {
        p.subject.as_str()
    };
    let from = if p.from.is_empty() { "unknown" } else { p.from.as_str() };
    let subject = if p.subject.is_empty() { "---" } else { p.subject.as_str() };
    let preview: String = p
        .body
        .chars()
        .take(PREVIEW_CHARS)
        .collect::<String>()
        .replace(['\r', '\n'], " ");

    json!({
        "text": format!("Interested email: {subject_line}"),
        "blocks": [
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": "*Interested email detected*" }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("*From:* {from}\n*Subject:* {subject}") }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("> {preview}") }
            },
            {
                "type": "context",
                "elements": [
                    { "type": "mrkdwn", "text": format!("Account: `{}`  •  ID: `{}`", p.account, p.id) }
                ]
            }
        ]
    })
}

/// Automation hook event.
pub fn automation_event(p: &NotificationPayload) -> Value {
    json!({
        "id": p.id,
        "account": p.account,
        "subject": p.subject,
        "from": p.from,
        "category": p.label,
    })
}
