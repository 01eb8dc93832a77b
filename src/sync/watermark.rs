//! Per-account high-water mark of processed uids.
//!
//! Lives outside the session so a restarted session resumes from where the
//! previous one stopped. Uids are only comparable within one UIDVALIDITY
//! epoch; a change resets the mark.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Default)]
pub struct Watermark {
    validity: Mutex<Option<u32>>,
    last_uid: AtomicU32,
}

impl Watermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile with the folder's current UIDVALIDITY.
    ///
    /// `floor` is the highest uid already in the folder when it was opened.
    /// A first sync or an epoch change sets the mark to `floor`; otherwise
    /// the mark only moves up. Returns the resulting mark.
    pub fn sync_validity(&self, validity: Option<u32>, floor: u32) -> u32 {
        let mut current = self
            .validity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let same_epoch = current.is_some() && *current == validity;
        if same_epoch {
            self.last_uid.fetch_max(floor, Ordering::SeqCst);
        } else {
            *current = validity;
            self.last_uid.store(floor, Ordering::SeqCst);
        }
        self.last_uid.load(Ordering::SeqCst)
    }

    /// Record a processed uid. The mark never moves backwards.
    pub fn advance(&self, uid: u32) {
        self.last_uid.fetch_max(uid, Ordering::SeqCst);
    }

    /// Last processed uid.
    pub fn get(&self) -> u32 {
        self.last_uid.load(Ordering::SeqCst)
    }
}
