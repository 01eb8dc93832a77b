//! Mailbox connection seam.
//!
//! The session drives these traits; `imap.rs` implements them over a real
//! server, tests implement them over an in-memory mailbox.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::watch;

use crate::config::AccountConfig;
use crate::error::SyncError;

/// Folder metadata returned on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FolderStatus {
    pub exists: u32,
    pub uid_next: Option<u32>,
    pub uid_validity: Option<u32>,
}

impl FolderStatus {
    /// Highest uid that can already exist in the folder, derived from
    /// UIDNEXT. `None` when the server did not report UIDNEXT.
    pub fn highest_uid(&self) -> Option<u32> {
        self.uid_next.map(|n| n.saturating_sub(1))
    }
}

/// One fetched message.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub uid: u32,
    pub internal_date: Option<DateTime<Utc>>,
    pub body: Vec<u8>,
}

/// Why an idle wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxEvent {
    /// The server reported a change to the folder.
    NewData,
    /// The refresh interval elapsed without activity.
    Timeout,
    /// Shutdown was signalled while waiting.
    Shutdown,
}

/// Opens connections for an account.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Connect and authenticate.
    async fn connect(&self, account: &AccountConfig)
    -> Result<Box<dyn MailboxConnection>, SyncError>;
}

/// An authenticated connection.
#[async_trait]
pub trait MailboxConnection: Send {
    /// Select a folder for reading.
    async fn open_folder(&mut self, folder: &str) -> Result<FolderStatus, SyncError>;

    /// Uids of messages received on or after `since`.
    async fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>, SyncError>;

    /// Uid of the newest message in the open folder, `None` when empty.
    async fn last_uid(&mut self) -> Result<Option<u32>, SyncError>;

    /// Uids greater than `uid`. May include `uid` itself or the highest
    /// message when nothing newer exists; callers filter.
    async fn search_after(&mut self, uid: u32) -> Result<Vec<u32>, SyncError>;

    /// Full message by uid. `Ok(None)` if it was expunged in the meantime.
    async fn fetch(&mut self, uid: u32) -> Result<Option<RawMessage>, SyncError>;

    /// Block until the folder changes, `timeout` elapses, or shutdown.
    async fn wait_for_change(
        &mut self,
        timeout: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<MailboxEvent, SyncError>;

    /// Best-effort graceful close.
    async fn logout(&mut self) -> Result<(), SyncError>;
}

/// Resolves once `rx` reads `true`. A dropped sender never resolves.
pub async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
