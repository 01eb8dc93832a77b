//! `IngestionSink`: idempotent document store keyed by `account_uid`.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::pipeline::types::{EmailDocument, Label};

/// Document store consumed by the sync and classification paths.
///
/// Backfill and real-time listening may both write the same id; every
/// operation must converge when repeated.
#[async_trait]
pub trait IngestionSink: Send + Sync {
    /// Create or replace the document.
    ///
    /// A `None` category in `doc` keeps whatever label is already stored, so
    /// a label written first by `update_label` survives a late base write.
    async fn upsert(&self, id: &str, doc: &EmailDocument) -> Result<(), StoreError>;

    /// Set only the label, creating a stub document if `id` is absent.
    async fn update_label(&self, id: &str, label: Label) -> Result<(), StoreError>;

    /// Point lookup. Missing ids return `StoreError::NotFound`.
    async fn get_by_id(&self, id: &str) -> Result<EmailDocument, StoreError>;

    /// Number of stored documents.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Number of stored documents for one account.
    async fn count_for_account(&self, account: &str) -> Result<usize, StoreError>;
}
