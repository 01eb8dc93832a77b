//! Mailbox synchronization engine.
//!
//! The supervisor runs one session per account. Each session backfills the
//! trailing window, then listens for new mail and feeds every message
//! through normalize → sink → classification pool.

pub mod connection;
pub mod imap;
pub mod normalize;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod watermark;

pub use connection::{MailboxConnection, MailboxConnector};
pub use imap::ImapConnector;
pub use state::SessionState;
pub use supervisor::{AccountStatus, Supervisor, SupervisorHandle};
