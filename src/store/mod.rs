//! Ingestion sink: idempotent document storage keyed by `account_uid`.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlSink;
pub use memory::MemorySink;
pub use traits::IngestionSink;
