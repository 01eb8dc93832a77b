//! Classification pipeline.
//!
//! Every ingested message flows through:
//! 1. `Classifier::classify()`: model call, deterministic rules on failure
//! 2. `IngestionSink::update_label()`: label write, create-on-update
//! 3. `Notifier::notify()`: only for `Interested`
//!
//! Work is queued through a bounded `ClassifyPool` per account.

pub mod classifier;
pub mod pool;
pub mod rules;
pub mod types;

pub use classifier::Classifier;
pub use pool::ClassifyPool;
