//! Outbound alerts for messages labelled `Interested`.

pub mod dispatcher;
pub mod payload;
pub mod transport;

pub use dispatcher::{ChannelOutcome, NotifyReport, Notifier};
pub use transport::{HttpTransport, WebhookTransport};
