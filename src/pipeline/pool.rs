//! Bounded worker pool for background classification.
//!
//! `submit` waits for a permit before spawning, so a burst of new mail
//! applies back-pressure to the fetch loop instead of piling up tasks.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::pipeline::classifier::Classifier;
use crate::pipeline::types::{Label, MessageEnvelope};

#[derive(Clone)]
pub struct ClassifyPool {
    classifier: Arc<Classifier>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl ClassifyPool {
    /// A pool running at most `size` classifications at once (minimum 1).
    pub fn new(classifier: Arc<Classifier>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            classifier,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Queue one envelope. Waits while the pool is full.
    pub async fn submit(&self, envelope: MessageEnvelope) -> JoinHandle<Label> {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(e) => {
                warn!(error = %e, "Classification pool closed, running unbounded");
                None
            }
        };
        let classifier = Arc::clone(&self.classifier);
        tokio::spawn(async move {
            let _permit = permit;
            classifier.classify_and_notify(&envelope).await
        })
    }

    /// Tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Wait until every submitted task has finished.
    pub async fn wait_idle(&self) {
        let n = u32::try_from(self.size).unwrap_or(u32::MAX);
        if let Ok(all) = self.permits.acquire_many(n).await {
            drop(all);
        }
    }
}
