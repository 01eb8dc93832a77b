//! Version-tracked schema migrations for the libSQL sink.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::StoreError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "emails",
        sql: r#"
            CREATE TABLE IF NOT EXISTS emails (
                id TEXT PRIMARY KEY,
                account TEXT NOT NULL DEFAULT '',
                folder TEXT NOT NULL DEFAULT '',
                uid TEXT NOT NULL DEFAULT '',
                date TEXT NOT NULL DEFAULT '1970-01-01T00:00:00+00:00',
                subject TEXT NOT NULL DEFAULT '',
                from_addr TEXT NOT NULL DEFAULT '',
                to_addr TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                category TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_emails_account ON emails(account);
            CREATE INDEX IF NOT EXISTS idx_emails_category ON emails(category);
        "#,
    },
    Migration {
        version: 2,
        name: "emails_date_index",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_emails_account_date ON emails(account, date);
        "#,
    },
];

/// Run all pending migrations against the given connection.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| StoreError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                StoreError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::debug!(
        version = get_current_version(conn).await?,
        "Database migrations complete"
    );
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, StoreError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| StoreError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| StoreError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get::<i64>(0).map_err(|e| {
            StoreError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| StoreError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_conn() -> (libsql::Database, Connection) {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        let conn = db.connect().unwrap();
        (db, conn)
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let (_db, conn) = memory_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();
        let v = get_current_version(&conn).await.unwrap();
        assert_eq!(v, MIGRATIONS.last().unwrap().version);
    }

    #[tokio::test]
    async fn emails_table_exists_after_migration() {
        let (_db, conn) = memory_conn().await;
        run_migrations(&conn).await.unwrap();
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='emails'",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }
}
