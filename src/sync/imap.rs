//! IMAP implementation of the mailbox traits (async-imap over tokio).
//!
//! Implicit TLS uses rustls with the webpki root store. Plain TCP is used
//! when the account is not marked secure.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_imap::Session;
use async_imap::extensions::idle::IdleResponse;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::TryStreamExt;
use secrecy::ExposeSecret;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::config::AccountConfig;
use crate::error::SyncError;
use crate::sync::connection::{
    FolderStatus, MailboxConnection, MailboxConnector, MailboxEvent, RawMessage,
    shutdown_signalled,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Byte stream the IMAP client runs over, TLS or plain.
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + Send + Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Debug> ImapStream for T {}

type ImapSession = Session<Box<dyn ImapStream>>;

/// Connector for real IMAP servers.
#[derive(Clone)]
pub struct ImapConnector {
    tls: TlsConnector,
}

impl ImapConnector {
    pub fn new() -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        Self {
            tls: TlsConnector::from(Arc::new(config)),
        }
    }

    async fn open_stream(&self, account: &AccountConfig) -> Result<Box<dyn ImapStream>, SyncError> {
        let connect_err = |reason: String| SyncError::Connect {
            host: account.host.clone(),
            port: account.port,
            reason,
        };

        let tcp = tokio::time::timeout(
            CONNECT_TIMEOUT,
            TcpStream::connect((account.host.as_str(), account.port)),
        )
        .await
        .map_err(|_| connect_err(format!("timed out after {CONNECT_TIMEOUT:?}")))?
        .map_err(|e| connect_err(e.to_string()))?;

        if !account.secure {
            return Ok(Box::new(tcp));
        }

        let tls_err = |reason: String| SyncError::Tls {
            host: account.host.clone(),
            reason,
        };
        let server_name = rustls_pki_types::ServerName::try_from(account.host.clone())
            .map_err(|e| tls_err(e.to_string()))?;
        let stream = self
            .tls
            .connect(server_name, tcp)
            .await
            .map_err(|e| tls_err(e.to_string()))?;
        Ok(Box::new(stream))
    }
}

impl Default for ImapConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(
        &self,
        account: &AccountConfig,
    ) -> Result<Box<dyn MailboxConnection>, SyncError> {
        let stream = self.open_stream(account).await?;
        let client = async_imap::Client::new(stream);
        let session = client
            .login(&account.user, account.password.expose_secret())
            .await
            .map_err(|(e, _)| SyncError::Login {
                user: account.user.clone(),
                reason: e.to_string(),
            })?;

        info!(account = %account.user, host = %account.host, "IMAP login succeeded");
        Ok(Box::new(ImapConnection {
            session: Some(session),
            account: account.user.clone(),
        }))
    }
}

/// An authenticated IMAP session.
///
/// IDLE takes the session by value, so it is held in an `Option`; `None`
/// means the session was lost mid-IDLE and every later call fails.
pub struct ImapConnection {
    session: Option<ImapSession>,
    account: String,
}

impl ImapConnection {
    fn session(&mut self) -> Result<&mut ImapSession, SyncError> {
        self.session.as_mut().ok_or(SyncError::Closed)
    }

    async fn search(&mut self, query: &str) -> Result<Vec<u32>, SyncError> {
        let uids = self
            .session()?
            .uid_search(query)
            .await
            .map_err(map_imap_error)?;
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }
}

fn map_imap_error(e: async_imap::error::Error) -> SyncError {
    use async_imap::error::Error;
    match e {
        Error::Io(io) => SyncError::Io(io),
        Error::ConnectionLost => SyncError::Closed,
        other => SyncError::Protocol(other.to_string()),
    }
}

/// IMAP SEARCH date, e.g. `01-Oct-2026`.
fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

#[async_trait]
impl MailboxConnection for ImapConnection {
    async fn open_folder(&mut self, folder: &str) -> Result<FolderStatus, SyncError> {
        let mailbox = self
            .session()?
            .select(folder)
            .await
            .map_err(|e| SyncError::Folder {
                folder: folder.to_string(),
                reason: e.to_string(),
            })?;
        debug!(
            account = %self.account,
            folder,
            exists = mailbox.exists,
            uid_next = ?mailbox.uid_next,
            "Folder selected"
        );
        Ok(FolderStatus {
            exists: mailbox.exists,
            uid_next: mailbox.uid_next,
            uid_validity: mailbox.uid_validity,
        })
    }

    async fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>, SyncError> {
        self.search(&format!("SINCE {}", imap_date(since))).await
    }

    async fn last_uid(&mut self) -> Result<Option<u32>, SyncError> {
        // `*` is the highest sequence number; UID SEARCH answers with its uid.
        Ok(self.search("*").await?.last().copied())
    }

    async fn search_after(&mut self, uid: u32) -> Result<Vec<u32>, SyncError> {
        self.search(&format!("UID {}:*", uid.saturating_add(1)))
            .await
    }

    async fn fetch(&mut self, uid: u32) -> Result<Option<RawMessage>, SyncError> {
        let fetches = self
            .session()?
            .uid_fetch(uid.to_string(), "(UID RFC822 INTERNALDATE)")
            .await
            .map_err(map_imap_error)?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| match map_imap_error(e) {
                SyncError::Protocol(reason) => SyncError::Fetch { uid, reason },
                fatal => fatal,
            })?;

        let Some(fetch) = fetches.iter().find(|f| f.uid == Some(uid)) else {
            return Ok(None);
        };
        let Some(body) = fetch.body() else {
            return Err(SyncError::Fetch {
                uid,
                reason: "response carried no RFC822 body".into(),
            });
        };

        Ok(Some(RawMessage {
            uid,
            internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
            body: body.to_vec(),
        }))
    }

    async fn wait_for_change(
        &mut self,
        timeout: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<MailboxEvent, SyncError> {
        let session = self.session.take().ok_or(SyncError::Closed)?;
        let mut handle = session.idle();
        handle.init().await.map_err(map_imap_error)?;

        let outcome = {
            let (idle_wait, _stop) = handle.wait_with_timeout(timeout);
            tokio::select! {
                res = idle_wait => res.map(|r| match r {
                    IdleResponse::NewData(_) => MailboxEvent::NewData,
                    IdleResponse::Timeout | IdleResponse::ManualInterrupt => MailboxEvent::Timeout,
                }),
                _ = shutdown_signalled(shutdown) => Ok(MailboxEvent::Shutdown),
            }
        };

        let session = handle.done().await.map_err(map_imap_error)?;
        self.session = Some(session);
        outcome.map_err(map_imap_error)
    }

    async fn logout(&mut self) -> Result<(), SyncError> {
        if let Some(mut session) = self.session.take() {
            session.logout().await.map_err(map_imap_error)?;
            debug!(account = %self.account, "IMAP logout");
        }
        Ok(())
    }
}
