//! In-process sink backed by a `HashMap`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::pipeline::types::{EmailDocument, Label};
use crate::store::traits::IngestionSink;

/// Volatile sink. Same convergence rules as the libSQL backend.
#[derive(Default)]
pub struct MemorySink {
    docs: RwLock<HashMap<String, EmailDocument>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Document created by a label write that arrived before the base upsert.
pub(crate) fn stub_document(id: &str, label: Label) -> EmailDocument {
    let (account, uid) = match id.rsplit_once('_') {
        Some((a, u)) => (a.to_string(), u.to_string()),
        None => (id.to_string(), String::new()),
    };
    EmailDocument {
        account,
        folder: String::new(),
        uid,
        date: DateTime::<Utc>::UNIX_EPOCH,
        subject: String::new(),
        from: String::new(),
        to: String::new(),
        body: String::new(),
        category: Some(label),
    }
}

#[async_trait]
impl IngestionSink for MemorySink {
    async fn upsert(&self, id: &str, doc: &EmailDocument) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        let mut next = doc.clone();
        if next.category.is_none() {
            next.category = docs.get(id).and_then(|d| d.category);
        }
        docs.insert(id.to_string(), next);
        Ok(())
    }

    async fn update_label(&self, id: &str, label: Label) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        docs.entry(id.to_string())
            .and_modify(|d| d.category = Some(label))
            .or_insert_with(|| stub_document(id, label));
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<EmailDocument, StoreError> {
        self.docs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.docs.read().await.len())
    }

    async fn count_for_account(&self, account: &str) -> Result<usize, StoreError> {
        Ok(self
            .docs
            .read()
            .await
            .values()
            .filter(|d| d.account == account)
            .count())
    }
}
