//! One account's mailbox session.
//!
//! Connecting → Backfilling → Listening, then Closing → Disconnected when the
//! connection ends. A server hang-up while listening is a clean end; other
//! connection-level errors end the session and are returned to the
//! supervisor. Per-message errors are logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::AccountConfig;
use crate::error::SyncError;
use crate::pipeline::ClassifyPool;
use crate::pipeline::types::MessageEnvelope;
use crate::store::IngestionSink;
use crate::sync::connection::{MailboxConnection, MailboxConnector, MailboxEvent, RawMessage};
use crate::sync::normalize::normalize;
use crate::sync::state::SessionState;
use crate::sync::watermark::Watermark;

/// Primary folder.
pub const INBOX: &str = "INBOX";

/// Session timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub backfill_days: i64,
    pub idle_refresh: Duration,
}

/// Cloning yields a fresh session for the same account that shares the
/// watermark, pool and published state.
#[derive(Clone)]
pub struct MailboxSession {
    account: AccountConfig,
    connector: Arc<dyn MailboxConnector>,
    sink: Arc<dyn IngestionSink>,
    pool: ClassifyPool,
    watermark: Arc<Watermark>,
    settings: SessionSettings,
    state: SessionState,
    state_tx: Arc<watch::Sender<SessionState>>,
    shutdown: watch::Receiver<bool>,
}

impl MailboxSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account: AccountConfig,
        connector: Arc<dyn MailboxConnector>,
        sink: Arc<dyn IngestionSink>,
        pool: ClassifyPool,
        watermark: Arc<Watermark>,
        settings: SessionSettings,
        state_tx: watch::Sender<SessionState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            account,
            connector,
            sink,
            pool,
            watermark,
            settings,
            state: SessionState::Disconnected,
            state_tx: Arc::new(state_tx),
            shutdown,
        }
    }

    pub fn account(&self) -> &str {
        &self.account.user
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, to: SessionState) {
        if !self.state.can_transition_to(to) {
            warn!(account = %self.account.user, from = %self.state, to = %to, "Invalid session transition");
            return;
        }
        debug!(account = %self.account.user, from = %self.state, to = %to, "Session transition");
        self.state = to;
        self.state_tx.send_replace(to);
    }

    /// Publish `Disconnected` for a run that never reached the end of
    /// `run` (it panicked).
    pub fn mark_disconnected(&self) {
        self.state_tx.send_replace(SessionState::Disconnected);
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run one session to completion. Always ends Disconnected.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        self.transition(SessionState::Connecting);

        let result = match self.connector.connect(&self.account).await {
            Ok(mut conn) => {
                let result = self.drive(conn.as_mut()).await;
                self.transition(SessionState::Closing);
                if let Err(e) = conn.logout().await {
                    debug!(account = %self.account.user, error = %e, "Logout failed");
                }
                result
            }
            Err(e) => Err(e),
        };

        self.transition(SessionState::Disconnected);
        result
    }

    async fn drive(&mut self, conn: &mut dyn MailboxConnection) -> Result<(), SyncError> {
        let status = conn.open_folder(INBOX).await?;
        let highest = match status.highest_uid() {
            Some(uid) => uid,
            // No UIDNEXT in the SELECT response; ask for the last message.
            None => conn.last_uid().await?.unwrap_or(0),
        };
        let mark = self.watermark.sync_validity(status.uid_validity, highest);
        info!(
            account = %self.account.user,
            exists = status.exists,
            watermark = mark,
            "Mailbox opened"
        );

        self.transition(SessionState::Backfilling);
        self.backfill(conn).await?;

        self.transition(SessionState::Listening);
        self.listen(conn).await
    }

    async fn backfill(&mut self, conn: &mut dyn MailboxConnection) -> Result<(), SyncError> {
        let since = backfill_since(Utc::now(), self.settings.backfill_days);
        let mut uids = conn.search_since(since).await?;
        uids.sort_unstable();
        uids.dedup();
        info!(account = %self.account.user, since = %since, count = uids.len(), "Backfill started");

        let mut ingested = 0usize;
        for uid in uids {
            if self.shutdown_requested() {
                info!(account = %self.account.user, "Backfill interrupted by shutdown");
                return Ok(());
            }
            if self.ingest(conn, uid).await? {
                ingested += 1;
            }
        }

        info!(account = %self.account.user, ingested, "Backfill complete");
        Ok(())
    }

    async fn listen(&mut self, conn: &mut dyn MailboxConnection) -> Result<(), SyncError> {
        loop {
            if self.shutdown_requested() {
                info!(account = %self.account.user, "Listener stopping for shutdown");
                return Ok(());
            }

            let mut shutdown = self.shutdown.clone();
            let event = match conn
                .wait_for_change(self.settings.idle_refresh, &mut shutdown)
                .await
            {
                Ok(event) => event,
                Err(SyncError::Closed) => {
                    info!(account = %self.account.user, "Server closed the connection");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            match event {
                MailboxEvent::NewData => self.fetch_new(conn).await?,
                // Catch anything a missed notification would have announced.
                MailboxEvent::Timeout => self.fetch_new(conn).await?,
                MailboxEvent::Shutdown => {
                    info!(account = %self.account.user, "Listener stopping for shutdown");
                    return Ok(());
                }
            }
        }
    }

    /// Ingest everything in `(watermark, highest]`.
    async fn fetch_new(&mut self, conn: &mut dyn MailboxConnection) -> Result<(), SyncError> {
        let mark = self.watermark.get();
        let mut uids: Vec<u32> = conn
            .search_after(mark)
            .await?
            .into_iter()
            .filter(|uid| *uid > mark)
            .collect();
        uids.sort_unstable();
        uids.dedup();

        if !uids.is_empty() {
            debug!(account = %self.account.user, watermark = mark, count = uids.len(), "New mail");
        }
        for uid in uids {
            self.ingest(conn, uid).await?;
        }
        Ok(())
    }

    /// Fetch, normalize, store, and queue one message.
    ///
    /// Returns `Ok(false)` when the message was skipped. Only
    /// connection-level errors are returned.
    async fn ingest(
        &mut self,
        conn: &mut dyn MailboxConnection,
        uid: u32,
    ) -> Result<bool, SyncError> {
        let raw = match conn.fetch(uid).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(account = %self.account.user, uid, "Message vanished before fetch");
                return Ok(false);
            }
            Err(e) if e.is_message_level() => {
                warn!(account = %self.account.user, uid, error = %e, "Skipping message");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        self.watermark.advance(uid);

        let envelope = self.envelope(raw);
        let id = envelope.doc_id();
        if let Err(e) = self.sink.upsert(&id, &envelope.to_document()).await {
            warn!(account = %self.account.user, id = %id, error = %e, "Index write failed, skipping");
            return Ok(false);
        }
        debug!(account = %self.account.user, id = %id, "Message indexed");

        // Handle is dropped; the classification outcome is logged by the pipeline.
        let _ = self.pool.submit(envelope).await;
        Ok(true)
    }

    fn envelope(&self, raw: RawMessage) -> MessageEnvelope {
        let fields = normalize(&raw.body, raw.internal_date);
        MessageEnvelope {
            account: self.account.user.clone(),
            folder: INBOX.to_string(),
            uid: raw.uid,
            subject: fields.subject,
            from: fields.from,
            to: fields.to,
            body: fields.body,
            date: fields.date,
        }
    }
}

/// First day of the backfill window. A window reaching past the earliest
/// representable date covers everything.
fn backfill_since(now: DateTime<Utc>, days: i64) -> NaiveDate {
    TimeDelta::try_days(days.max(0))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
        .date_naive()
}
