//! Account supervisor.
//!
//! One task per account, each looping: run a session, wait a fixed delay,
//! run it again. Accounts share nothing mutable, so one account failing
//! never holds up another. The loop only stops when shutdown is signalled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{AccountConfig, SyncConfig};
use crate::pipeline::{Classifier, ClassifyPool};
use crate::store::IngestionSink;
use crate::sync::connection::{MailboxConnector, shutdown_signalled};
use crate::sync::session::{MailboxSession, SessionSettings};
use crate::sync::state::SessionState;
use crate::sync::watermark::Watermark;

/// Live view of one account's session.
#[derive(Debug, Clone)]
pub struct AccountStatus {
    pub account: String,
    pub state: watch::Receiver<SessionState>,
}

/// Running supervisor.
pub struct SupervisorHandle {
    pub statuses: Vec<AccountStatus>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Wait for every account loop to exit (after shutdown).
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Account task panicked");
            }
        }
    }
}

pub struct Supervisor {
    config: SyncConfig,
    connector: Arc<dyn MailboxConnector>,
    sink: Arc<dyn IngestionSink>,
    classifier: Arc<Classifier>,
}

impl Supervisor {
    pub fn new(
        config: SyncConfig,
        connector: Arc<dyn MailboxConnector>,
        sink: Arc<dyn IngestionSink>,
        classifier: Arc<Classifier>,
    ) -> Self {
        Self {
            config,
            connector,
            sink,
            classifier,
        }
    }

    /// Spawn one restarting loop per account.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> SupervisorHandle {
        let settings = SessionSettings {
            backfill_days: self.config.backfill_days,
            idle_refresh: self.config.idle_refresh,
        };

        let mut statuses = Vec::with_capacity(self.config.accounts.len());
        let mut tasks = Vec::with_capacity(self.config.accounts.len());

        for account in &self.config.accounts {
            let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
            statuses.push(AccountStatus {
                account: account.user.clone(),
                state: state_rx,
            });

            let session = self.session_for(account.clone(), settings, state_tx, shutdown.clone());
            tasks.push(spawn_account_loop(
                session,
                self.config.restart_delay,
                shutdown.clone(),
            ));
        }

        info!(accounts = tasks.len(), "Account supervisor started");
        SupervisorHandle { statuses, tasks }
    }

    fn session_for(
        &self,
        account: AccountConfig,
        settings: SessionSettings,
        state_tx: watch::Sender<SessionState>,
        shutdown: watch::Receiver<bool>,
    ) -> MailboxSession {
        let pool = ClassifyPool::new(
            Arc::clone(&self.classifier),
            self.config.classify_concurrency,
        );
        MailboxSession::new(
            account,
            Arc::clone(&self.connector),
            Arc::clone(&self.sink),
            pool,
            Arc::new(Watermark::new()),
            settings,
            state_tx,
            shutdown,
        )
    }
}

/// Spawn the run/sleep/restart loop for one account.
///
/// Each run gets its own task, so a panicking session is restarted like
/// any other failure.
pub fn spawn_account_loop(
    session: MailboxSession,
    restart_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut runs: u64 = 0;
        loop {
            runs += 1;
            let mut attempt = session.clone();
            match tokio::spawn(async move { attempt.run().await }).await {
                Ok(Ok(())) => info!(account = %session.account(), runs, "Session ended"),
                Ok(Err(e)) => {
                    error!(account = %session.account(), runs, error = %e, "Session failed")
                }
                Err(e) => {
                    session.mark_disconnected();
                    error!(account = %session.account(), runs, error = %e, "Session panicked");
                }
            }

            if *shutdown.borrow() {
                break;
            }
            let stop = tokio::select! {
                _ = tokio::time::sleep(restart_delay) => false,
                _ = shutdown_signalled(&mut shutdown) => true,
            };
            if stop {
                break;
            }
            info!(account = %session.account(), delay_secs = restart_delay.as_secs(), "Restarting session");
        }
        info!(account = %session.account(), "Account loop stopped");
    })
}
