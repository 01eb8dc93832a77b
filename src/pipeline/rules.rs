//! Deterministic fallback classifier.
//!
//! Applied when the model call fails or returns something outside the label
//! set. Rules are tested in a fixed priority order and the first match wins:
//!
//! 1. Out-of-office phrasing → `Out of Office`
//! 2. Scheduling phrasing → `Meeting Booked`
//! 3. Promotional phrasing → `Spam`
//! 4. Positive interest → `Interested`
//! 5. Otherwise → `Not Interested`
//!
//! Auto-replies often mention scheduling too, so out-of-office must stay first.

use regex::Regex;
use tracing::debug;

use crate::pipeline::types::Label;

/// One ordered rule: if `regex` matches, the message gets `label`.
#[derive(Debug, Clone)]
pub struct FallbackRule {
    pub label: Label,
    pub regex: Regex,
    /// Matches that are negated in context and must not count.
    pub negation: Option<Regex>,
}

impl FallbackRule {
    fn matches(&self, text: &str) -> bool {
        match &self.negation {
            None => self.regex.is_match(text),
            Some(neg) => {
                let cleaned = neg.replace_all(text, " ");
                self.regex.is_match(&cleaned)
            }
        }
    }
}

/// Priority-ordered rule list.
pub struct FallbackRules {
    rules: Vec<FallbackRule>,
}

impl FallbackRules {
    /// The standard rule set.
    pub fn default_rules() -> Self {
        let rules = vec![
            FallbackRule {
                label: Label::OutOfOffice,
                regex: Regex::new(r"out of office|on leave|away from the office|ooo").unwrap(),
                negation: None,
            },
            FallbackRule {
                label: Label::MeetingBooked,
                regex: Regex::new(r"schedule|book|available|slot|interview|call").unwrap(),
                negation: None,
            },
            FallbackRule {
                label: Label::Spam,
                regex: Regex::new(
                    r"unsubscribe|buy now|click here|free trial|win money|lottery|promo",
                )
                .unwrap(),
                negation: None,
            },
            FallbackRule {
                label: Label::Interested,
                regex: Regex::new(
                    r"interested|count me in|i am interested|sounds good|i would like",
                )
                .unwrap(),
                // "not interested" and friends are a decline, not interest.
                negation: Some(
                    Regex::new(r"(\bnot|n't|\bno longer|\bnever)\s+(be\s+|really\s+|very\s+)?interested")
                        .unwrap(),
                ),
            },
        ];
        Self { rules }
    }

    /// Classify `subject` + `body`. Never fails.
    pub fn classify(&self, subject: &str, body: &str) -> Label {
        let combined = format!("{subject}\n{body}").to_lowercase();
        for rule in &self.rules {
            if rule.matches(&combined) {
                debug!(label = %rule.label, "Fallback rule matched");
                return rule.label;
            }
        }
        Label::NotInterested
    }
}

impl Default for FallbackRules {
    fn default() -> Self {
        Self::default_rules()
    }
}
