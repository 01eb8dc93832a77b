//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default primary model on OpenRouter.
pub const DEFAULT_MODEL: &str = "mistralai/mistral-small:free";

/// Default OpenAI-compatible API base.
pub const DEFAULT_OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";

/// One mailbox account.
#[derive(Clone)]
pub struct AccountConfig {
    pub host: String,
    pub port: u16,
    /// Implicit TLS on connect (IMAPS). Plain TCP otherwise.
    pub secure: bool,
    pub user: String,
    pub password: SecretString,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Wire shape of an account record in `IMAP_ACCOUNTS_JSON`.
#[derive(Deserialize)]
struct RawAccount {
    host: String,
    #[serde(default = "default_imap_port")]
    port: u16,
    #[serde(default = "default_secure")]
    secure: bool,
    user: String,
    password: String,
}

fn default_imap_port() -> u16 {
    993
}

fn default_secure() -> bool {
    true
}

impl From<RawAccount> for AccountConfig {
    fn from(raw: RawAccount) -> Self {
        Self {
            host: raw.host,
            port: raw.port,
            secure: raw.secure,
            user: raw.user,
            password: SecretString::from(raw.password),
        }
    }
}

/// Parse the ordered account list.
pub fn parse_accounts(json: &str) -> Result<Vec<AccountConfig>, ConfigError> {
    let raw: Vec<RawAccount> = serde_json::from_str(json)
        .map_err(|e| ConfigError::ParseError(format!("IMAP_ACCOUNTS_JSON: {e}")))?;

    for (i, acc) in raw.iter().enumerate() {
        if acc.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("IMAP_ACCOUNTS_JSON[{i}].host"),
                message: "must not be empty".into(),
            });
        }
        if acc.user.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: format!("IMAP_ACCOUNTS_JSON[{i}].user"),
                message: "must not be empty".into(),
            });
        }
    }

    Ok(raw.into_iter().map(AccountConfig::from).collect())
}

/// Mailbox sync settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub accounts: Vec<AccountConfig>,
    /// Fixed wait before a session is restarted.
    pub restart_delay: Duration,
    /// Trailing window for the initial backfill.
    pub backfill_days: i64,
    /// Concurrent classification tasks per account.
    pub classify_concurrency: usize,
    /// IDLE is re-issued after this long even without server activity.
    pub idle_refresh: Duration,
}

impl SyncConfig {
    /// Build sync config from environment variables.
    ///
    /// Returns `Ok(None)` when `IMAP_ACCOUNTS_JSON` is not set (sync disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(json) = std::env::var("IMAP_ACCOUNTS_JSON") else {
            return Ok(None);
        };
        let accounts = parse_accounts(&json)?;

        Ok(Some(Self {
            accounts,
            restart_delay: Duration::from_secs(env_parse("SYNC_RESTART_DELAY_SECS", 5)),
            backfill_days: backfill_days(env_parse("SYNC_BACKFILL_DAYS", 30))?,
            classify_concurrency: env_parse("CLASSIFY_CONCURRENCY", 4),
            idle_refresh: Duration::from_secs(29 * 60),
        }))
    }

    /// Defaults for a given account list.
    pub fn with_accounts(accounts: Vec<AccountConfig>) -> Self {
        Self {
            accounts,
            restart_delay: Duration::from_secs(5),
            backfill_days: 30,
            classify_concurrency: 4,
            idle_refresh: Duration::from_secs(29 * 60),
        }
    }
}

/// Longest accepted backfill window (ten years).
pub const MAX_BACKFILL_DAYS: i64 = 3650;

/// Validate `SYNC_BACKFILL_DAYS`.
pub fn backfill_days(days: i64) -> Result<i64, ConfigError> {
    if (1..=MAX_BACKFILL_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(ConfigError::InvalidValue {
            key: "SYNC_BACKFILL_DAYS".into(),
            message: format!("{days} is outside 1..={MAX_BACKFILL_DAYS}"),
        })
    }
}

/// Outbound notification endpoints.
#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    /// Primary channel (Slack incoming webhook).
    pub slack_webhook_url: Option<String>,
    /// Secondary automation hook.
    pub external_webhook_url: Option<String>,
}

impl NotifyConfig {
    pub fn from_env() -> Self {
        Self {
            slack_webhook_url: env_nonempty("SLACK_WEBHOOK_URL"),
            external_webhook_url: env_nonempty("EXTERNAL_WEBHOOK"),
        }
    }
}

/// Model provider settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    /// Returns `None` if `OPENROUTER_API_KEY` is not set (heuristic-only mode).
    pub fn from_env() -> Option<Self> {
        let api_key = env_nonempty("OPENROUTER_API_KEY")?;
        Some(Self {
            api_key: SecretString::from(api_key),
            model: env_nonempty("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: env_nonempty("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE.to_string()),
        })
    }
}

/// Process-level settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", 4000),
            db_path: env_nonempty("MAIL_TRIAGE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/mail-triage.db")),
            log_dir: env_nonempty("LOG_DIR").map(PathBuf::from),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
