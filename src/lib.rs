//! Mail triage: multi-account mailbox ingestion with intent classification.

pub mod config;
pub mod error;
pub mod health;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod retry;
pub mod store;
pub mod sync;
