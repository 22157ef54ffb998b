//! Process-local fact store

use super::types::*;
use super::FactStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory fact store; facts are kept in insertion order
#[derive(Default)]
pub struct InMemoryFactStore {
    facts: Arc<RwLock<Vec<FactRecord>>>,
    markers: Arc<RwLock<HashMap<String, ProcessedMarker>>>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from previously persisted state
    pub fn from_parts(mut facts: Vec<FactRecord>, markers: Vec<ProcessedMarker>) -> Self {
        facts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Self {
            facts: Arc::new(RwLock::new(facts)),
            markers: Arc::new(RwLock::new(
                markers.into_iter().map(|m| (m.user_id.clone(), m)).collect(),
            )),
        }
    }

    /// Append a fully built record
    pub(crate) async fn push_record(&self, record: FactRecord) {
        self.facts.write().await.push(record);
    }

    /// Replace a record in place, keeping its position
    pub(crate) async fn replace_record(&self, record: FactRecord) {
        let mut facts = self.facts.write().await;
        if let Some(slot) = facts.iter_mut().find(|r| r.id == record.id) {
            *slot = record;
        }
    }

    /// Clear the reprocessing flag and return the updated record
    pub(crate) async fn clear_reprocess_flag(&self, id: &str) -> Result<FactRecord> {
        let mut facts = self.facts.write().await;
        let record = facts
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("fact {id}")))?;
        record.needs_reprocess = false;
        Ok(record.clone())
    }
}

#[async_trait]
impl FactStore for InMemoryFactStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn insert_fact(&self, fact: NewFact) -> Result<String> {
        let record = fact.into_record(uuid::Uuid::new_v4().to_string(), Utc::now());
        let id = record.id.clone();
        self.push_record(record).await;
        Ok(id)
    }

    async fn get_fact(&self, id: &str) -> Result<Option<FactRecord>> {
        let facts = self.facts.read().await;
        Ok(facts.iter().find(|r| r.id == id).cloned())
    }

    async fn query_facts(&self, query: &FactQuery) -> Result<Vec<FactRecord>> {
        let facts = self.facts.read().await;
        let matching = facts.iter().rev().filter(|r| query.matches(r)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn update_status(
        &self,
        id: &str,
        status: FactStatus,
        reviewed_by: &str,
    ) -> Result<FactRecord> {
        let mut facts = self.facts.write().await;
        let record = facts
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("fact {id}")))?;
        record.status = status;
        record.reviewed_by = Some(reviewed_by.to_string());
        record.reviewed_at = Some(Utc::now());
        if status == FactStatus::Rejected {
            record.needs_reprocess = true;
        }
        Ok(record.clone())
    }

    async fn mark_reprocessing_complete(&self, id: &str) -> Result<()> {
        self.clear_reprocess_flag(id).await.map(|_| ())
    }

    async fn get_marker(&self, user_id: &str) -> Result<Option<ProcessedMarker>> {
        Ok(self.markers.read().await.get(user_id).cloned())
    }

    async fn upsert_marker(&self, marker: ProcessedMarker) -> Result<()> {
        self.markers
            .write()
            .await
            .insert(marker.user_id.clone(), marker);
        Ok(())
    }

    async fn delete_marker(&self, user_id: &str) -> Result<bool> {
        Ok(self.markers.write().await.remove(user_id).is_some())
    }
}
