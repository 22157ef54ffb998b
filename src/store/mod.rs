//! Fact store
//!
//! `FactStore` is the persistence capability the pipeline, reprocessor and
//! review API depend on. Two implementations ship with the crate: a
//! process-local store and a JSON-file store.

pub mod file;
pub mod memory;
pub mod types;

pub use file::FileFactStore;
pub use memory::InMemoryFactStore;
pub use types::{
    ExtractionMethod, FactQuery, FactRecord, FactStatus, NewFact, ProcessedMarker, SystemStats,
    UserSummary,
};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence capability for facts and processed markers
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Connectivity probe
    async fn ping(&self) -> bool;

    /// Insert a pending fact, returning its id
    async fn insert_fact(&self, fact: NewFact) -> Result<String>;

    /// Fetch one fact
    async fn get_fact(&self, id: &str) -> Result<Option<FactRecord>>;

    /// Facts matching `query`, newest first
    async fn query_facts(&self, query: &FactQuery) -> Result<Vec<FactRecord>>;

    /// Set review status. Rejecting flags the fact for reprocessing.
    /// Fails with `NotFound` for an unknown id.
    async fn update_status(
        &self,
        id: &str,
        status: FactStatus,
        reviewed_by: &str,
    ) -> Result<FactRecord>;

    /// Clear the reprocessing flag of a fact
    async fn mark_reprocessing_complete(&self, id: &str) -> Result<()>;

    /// Marker for a user, if processed
    async fn get_marker(&self, user_id: &str) -> Result<Option<ProcessedMarker>>;

    /// Insert or replace a user's marker atomically
    async fn upsert_marker(&self, marker: ProcessedMarker) -> Result<()>;

    /// Remove a user's marker; returns whether one existed
    async fn delete_marker(&self, user_id: &str) -> Result<bool>;

    /// Whether a user's transcript has been processed
    async fn is_processed(&self, user_id: &str) -> Result<bool> {
        Ok(self.get_marker(user_id).await?.is_some())
    }

    /// Rejected facts still flagged for reprocessing, newest first
    async fn rejected_for_reprocessing(&self, limit: usize) -> Result<Vec<FactRecord>> {
        let mut records = self
            .query_facts(&FactQuery::default().with_status(FactStatus::Rejected))
            .await?;
        records.retain(|r| r.needs_reprocess);
        records.truncate(limit);
        Ok(records)
    }

    /// Distinct user ids with at least one fact, sorted
    async fn list_users(&self) -> Result<Vec<String>> {
        let records = self.query_facts(&FactQuery::default()).await?;
        let mut users: Vec<String> = records.into_iter().map(|r| r.user_id).collect();
        users.sort();
        users.dedup();
        Ok(users)
    }

    /// Status breakdown for one user
    async fn user_summary(&self, user_id: &str) -> Result<UserSummary> {
        let records = self.query_facts(&FactQuery::for_user(user_id)).await?;
        Ok(UserSummary::from_records(user_id, &records))
    }

    /// Store-wide statistics
    async fn system_stats(&self) -> Result<SystemStats> {
        let records = self.query_facts(&FactQuery::default()).await?;
        Ok(SystemStats::from_records(&records))
    }
}

/// Build the configured store backend
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn FactStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryFactStore::new())),
        StorageBackend::File => Ok(Arc::new(FileFactStore::open(config.dir.clone()).await?)),
    }
}
