//! Session state machine.

use serde::Serialize;

/// Lifecycle state of one account's mailbox session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No connection. Initial state and the state between restarts.
    Disconnected,
    /// Opening the connection and the primary folder.
    Connecting,
    /// Importing the trailing window of existing mail.
    Backfilling,
    /// Waiting for new-mail notifications.
    Listening,
    /// Logging out.
    Closing,
}

impl SessionState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, target),
            (Disconnected, Connecting) |
            // Connect failure, or folder open failure after connecting
            (Connecting, Backfilling) | (Connecting, Disconnected) | (Connecting, Closing) |
            (Backfilling, Listening) | (Backfilling, Closing) |
            (Listening, Closing) |
            (Closing, Disconnected)
        )
    }

    /// Whether the session holds an open connection.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Backfilling | Self::Listening)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Backfilling => "backfilling",
            Self::Listening => "listening",
            Self::Closing => "closing",
        };
        write!(f, "{s}")
    }
}
