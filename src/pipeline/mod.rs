//! Processing pipeline
//!
//! Ties the transcript, extraction, dedup and store modules together:
//! `Pipeline` runs one user end to end, `Reprocessor` handles rejected
//! facts and `BatchRunner` drives many users.

pub mod batch;
pub mod conclusion;
pub mod persistence;
pub mod processor;
pub mod reprocessor;

pub use batch::{BatchItem, BatchReport, BatchRunner, BatchStatus};
pub use conclusion::{conclusion, FactKind};
pub use persistence::{PersistenceAdapter, Provenance, StoreReport, StoreStats, StoredFact};
pub use processor::{ChunkRun, Pipeline, ProcessOutcome, ProcessReport};
pub use reprocessor::{PendingReprocess, ReprocessReport, Reprocessor};
