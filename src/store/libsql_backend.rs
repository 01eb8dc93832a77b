//! libSQL sink, the async `IngestionSink` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::pipeline::types::{EmailDocument, Label};
use crate::store::migrations;
use crate::store::traits::IngestionSink;

/// libSQL-backed ingestion sink.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlSink {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlSink {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let sink = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(sink)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn count_where(&self, sql: &str, args: Vec<libsql::Value>) -> Result<usize, StoreError> {
        let mut rows = self
            .conn()
            .query(sql, args)
            .await
            .map_err(|e| StoreError::Query(format!("count: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => {
                let n: i64 = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("count row parse: {e}")))?;
                Ok(usize::try_from(n).unwrap_or(0))
            }
            Ok(None) => Ok(0),
            Err(e) => Err(StoreError::Query(format!("count: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 datetime, falling back to the epoch.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn opt_label(label: Option<Label>) -> libsql::Value {
    match label {
        Some(l) => libsql::Value::Text(l.as_str().to_string()),
        None => libsql::Value::Null,
    }
}

/// Column order matches `EMAIL_COLUMNS`.
fn row_to_document(row: &libsql::Row) -> Result<EmailDocument, libsql::Error> {
    let date_str: String = row.get(3)?;
    let category: Option<String> = row.get(8).ok();

    Ok(EmailDocument {
        account: row.get(0)?,
        folder: row.get(1)?,
        uid: row.get(2)?,
        date: parse_datetime(&date_str),
        subject: row.get(4)?,
        from: row.get(5)?,
        to: row.get(6)?,
        body: row.get(7)?,
        category: category.as_deref().and_then(Label::parse),
    })
}

const EMAIL_COLUMNS: &str = "account, folder, uid, date, subject, from_addr, to_addr, body, category";

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl IngestionSink for LibSqlSink {
    async fn upsert(&self, id: &str, doc: &EmailDocument) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO emails (id, account, folder, uid, date, subject, from_addr, to_addr, body, category, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    account = excluded.account,
                    folder = excluded.folder,
                    uid = excluded.uid,
                    date = excluded.date,
                    subject = excluded.subject,
                    from_addr = excluded.from_addr,
                    to_addr = excluded.to_addr,
                    body = excluded.body,
                    category = COALESCE(excluded.category, emails.category),
                    updated_at = excluded.updated_at",
                params![
                    id,
                    doc.account.as_str(),
                    doc.folder.as_str(),
                    doc.uid.as_str(),
                    doc.date.to_rfc3339(),
                    doc.subject.as_str(),
                    doc.from.as_str(),
                    doc.to.as_str(),
                    doc.body.as_str(),
                    opt_label(doc.category),
                    now,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("upsert: {e}")))?;

        debug!(id = %id, "Document upserted");
        Ok(())
    }

    async fn update_label(&self, id: &str, label: Label) -> Result<(), StoreError> {
        let stub = crate::store::memory::stub_document(id, label);
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO emails (id, account, uid, category, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    category = excluded.category,
                    updated_at = excluded.updated_at",
                params![id, stub.account, stub.uid, label.as_str(), now],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_label: {e}")))?;

        debug!(id = %id, label = %label, "Label updated");
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<EmailDocument, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_by_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_document(&row)
                .map_err(|e| StoreError::Query(format!("get_by_id row parse: {e}"))),
            Ok(None) => Err(StoreError::NotFound { id: id.to_string() }),
            Err(e) => Err(StoreError::Query(format!("get_by_id: {e}"))),
        }
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.count_where("SELECT COUNT(*) FROM emails", Vec::new())
            .await
    }

    async fn count_for_account(&self, account: &str) -> Result<usize, StoreError> {
        self.count_where(
            "SELECT COUNT(*) FROM emails WHERE account = ?1",
            vec![libsql::Value::Text(account.to_string())],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(subject: &str) -> EmailDocument {
        EmailDocument {
            account: "sales@acme.io".into(),
            folder: "INBOX".into(),
            uid: "12".into(),
            date: DateTime::parse_from_rfc3339("2026-10-01T09:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            subject: subject.into(),
            from: "Carol <carol@buyer.com>".into(),
            to: "sales@acme.io".into(),
            body: "Let's talk".into(),
            category: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_roundtrips_fields() {
        let sink = LibSqlSink::new_memory().await.unwrap();
        sink.upsert("sales@acme.io_12", &doc("Pricing")).await.unwrap();
        let got = sink.get_by_id("sales@acme.io_12").await.unwrap();
        assert_eq!(got, doc("Pricing"));
    }

    #[tokio::test]
    async fn reingest_yields_single_latest_document() {
        let sink = LibSqlSink::new_memory().await.unwrap();
        sink.upsert("sales@acme.io_12", &doc("v1")).await.unwrap();
        sink.upsert("sales@acme.io_12", &doc("v2")).await.unwrap();
        assert_eq!(sink.count().await.unwrap(), 1);
        assert_eq!(sink.get_by_id("sales@acme.io_12").await.unwrap().subject, "v2");
    }

    #[tokio::test]
    async fn update_label_creates_missing_document() {
        let sink = LibSqlSink::new_memory().await.unwrap();
        sink.update_label("sales@acme.io_99", Label::Spam).await.unwrap();
        let got = sink.get_by_id("sales@acme.io_99").await.unwrap();
        assert_eq!(got.category, Some(Label::Spam));
        assert_eq!(got.account, "sales@acme.io");
        assert_eq!(got.uid, "99");
    }

    #[tokio::test]
    async fn base_upsert_keeps_earlier_label() {
        let sink = LibSqlSink::new_memory().await.unwrap();
        sink.update_label("sales@acme.io_12", Label::Interested).await.unwrap();
        sink.upsert("sales@acme.io_12", &doc("late")).await.unwrap();
        let got = sink.get_by_id("sales@acme.io_12").await.unwrap();
        assert_eq!(got.subject, "late");
        assert_eq!(got.category, Some(Label::Interested));
    }

    #[tokio::test]
    async fn label_overwrite_is_last_write_wins() {
        let sink = LibSqlSink::new_memory().await.unwrap();
        sink.upsert("sales@acme.io_12", &doc("x")).await.unwrap();
        sink.update_label("sales@acme.io_12", Label::Spam).await.unwrap();
        sink.update_label("sales@acme.io_12", Label::MeetingBooked).await.unwrap();
        let got = sink.get_by_id("sales@acme.io_12").await.unwrap();
        assert_eq!(got.category, Some(Label::MeetingBooked));
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let sink = LibSqlSink::new_memory().await.unwrap();
        let err = sink.get_by_id("ghost_1").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id } if id == "ghost_1"));
    }

    #[tokio::test]
    async fn file_backed_sink_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mail.db");
        {
            let sink = LibSqlSink::new_local(&path).await.unwrap();
            sink.upsert("sales@acme.io_12", &doc("kept")).await.unwrap();
        }
        let sink = LibSqlSink::new_local(&path).await.unwrap();
        assert_eq!(sink.count_for_account("sales@acme.io").await.unwrap(), 1);
        assert_eq!(sink.get_by_id("sales@acme.io_12").await.unwrap().subject, "kept");
    }
}
