//! Error types for mail-triage.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Mailbox connection and protocol errors.
///
/// Everything except `Fetch` ends the current session; the supervisor
/// restarts it.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Connection to {host}:{port} failed: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS handshake with {host} failed: {reason}")]
    Tls { host: String, reason: String },

    #[error("Login failed for {user}: {reason}")]
    Login { user: String, reason: String },

    #[error("Failed to open folder {folder}: {reason}")]
    Folder { folder: String, reason: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("Fetch of uid {uid} failed: {reason}")]
    Fetch { uid: u32, reason: String },

    #[error("Connection closed by server")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// A single message failed; the connection is still usable.
    pub fn is_message_level(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

/// Ingestion sink errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Document not found: {id}")]
    NotFound { id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited (status {status})")]
    RateLimited { provider: String, status: u16 },

    #[error("Model {model} over capacity on {provider}")]
    OverCapacity { provider: String, model: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("All {attempted} models failed on {provider}")]
    AllModelsFailed { provider: String, attempted: usize },
}

impl LlmError {
    /// Whether the same model is worth another attempt after a short wait.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::OverCapacity { .. })
    }
}

/// Notification delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Webhook {channel} request failed: {reason}")]
    RequestFailed { channel: String, reason: String },

    #[error("Webhook {channel} returned status {status}")]
    Status { channel: String, status: u16 },

    #[error("Webhook {channel} timed out after {timeout:?}")]
    Timeout { channel: String, timeout: Duration },
}
