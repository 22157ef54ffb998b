//! Persistence Adapter
//!
//! Writes deduplicated candidates to the fact store with a rendered
//! conclusion, applies the persistence guards (confidence floor, bare
//! relation words, evidence required) and reports only the facts written
//! in this call.

use super::conclusion::conclusion;
use crate::extraction::{is_bare_relation, FactCandidate, Layer, LayeredFacts};
use crate::store::{ExtractionMethod, FactStore, NewFact, ProcessedMarker};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-run persistence counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub stored: usize,
    pub store_failed: usize,
    pub confidence_rejected: usize,
    pub policy_rejected: usize,
}

impl StoreStats {
    /// Candidates considered
    pub fn total(&self) -> usize {
        self.stored + self.store_failed + self.confidence_rejected + self.policy_rejected
    }
}

/// A fact written in this run, with the id the store assigned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFact {
    pub id: String,
    #[serde(flatten)]
    pub candidate: FactCandidate,
}

/// Facts written in one call, grouped by layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreReport {
    pub newly_stored: BTreeMap<Layer, Vec<StoredFact>>,
    pub stats: StoreStats,
}

impl StoreReport {
    /// Number of facts written
    pub fn stored_count(&self) -> usize {
        self.newly_stored.values().map(Vec::len).sum()
    }

    /// Per-layer counts of written facts
    pub fn layer_counts(&self) -> BTreeMap<String, usize> {
        self.newly_stored
            .iter()
            .map(|(l, v)| (l.key().to_string(), v.len()))
            .collect()
    }
}

/// Where a batch of candidates comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance<'a> {
    Initial,
    Reprocess { parent_id: &'a str },
}

/// Bridges candidates and the fact store
#[derive(Clone)]
pub struct PersistenceAdapter {
    store: Arc<dyn FactStore>,
    min_confidence: f64,
}

impl PersistenceAdapter {
    pub fn new(store: Arc<dyn FactStore>, min_confidence: f64) -> Self {
        Self {
            store,
            min_confidence,
        }
    }

    /// Whether the user's transcript was already processed. A failing
    /// lookup counts as not processed.
    pub async fn already_processed(&self, user_id: &str) -> bool {
        match self.store.is_processed(user_id).await {
            Ok(processed) => processed,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Processed-marker lookup failed");
                false
            }
        }
    }

    /// Write or refresh the processed marker
    pub async fn mark_processed(&self, user_id: &str, total_facts: usize) {
        let marker = ProcessedMarker {
            user_id: user_id.to_string(),
            processed_at: Utc::now(),
            total_facts_extracted: total_facts,
        };
        if let Err(e) = self.store.upsert_marker(marker).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to write processed marker");
        }
    }

    /// Persist candidates, one store call each; failures are counted and
    /// do not stop the remaining candidates
    pub async fn store_candidates(
        &self,
        user_id: &str,
        facts: &LayeredFacts,
        provenance: Provenance<'_>,
    ) -> StoreReport {
        let mut report = StoreReport::default();

        for candidate in facts.candidates() {
            if candidate.confidence.is_nan() || candidate.confidence < self.min_confidence {
                report.stats.confidence_rejected += 1;
                continue;
            }
            if is_bare_relation(&candidate.fact_type, &candidate.value) || candidate.evidence.is_empty() {
                tracing::warn!(
                    user_id = %user_id,
                    fact_type = %candidate.fact_type,
                    "Refusing to store fact that fails ownership or evidence policy"
                );
                report.stats.policy_rejected += 1;
                continue;
            }

            let (extraction_method, parent_update_id) = match provenance {
                Provenance::Initial => (ExtractionMethod::Initial, None),
                Provenance::Reprocess { parent_id } => {
                    (ExtractionMethod::Reprocess, Some(parent_id.to_string()))
                }
            };
            let fact = NewFact {
                user_id: user_id.to_string(),
                layer: candidate.layer,
                fact_type: candidate.fact_type.clone(),
                content: candidate.value.clone(),
                conclusion: conclusion(&candidate.fact_type, user_id, &candidate.value),
                confidence: candidate.confidence,
                evidence: candidate.evidence.clone(),
                ownership_reason: candidate.ownership_reason.clone(),
                timestamp: candidate.timestamp.clone(),
                extraction_method,
                parent_update_id,
            };

            match self.store.insert_fact(fact).await {
                Ok(id) => {
                    tracing::debug!(
                        user_id = %user_id,
                        fact_id = %id,
                        layer = %candidate.layer,
                        fact_type = %candidate.fact_type,
                        "Stored fact"
                    );
                    report.stats.stored += 1;
                    report
                        .newly_stored
                        .entry(candidate.layer)
                        .or_default()
                        .push(StoredFact {
                            id,
                            candidate: candidate.clone(),
                        });
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        fact_type = %candidate.fact_type,
                        error = %e,
                        "Failed to store fact"
                    );
                    report.stats.store_failed += 1;
                }
            }
        }

        tracing::info!(
            user_id = %user_id,
            stored = report.stats.stored,
            store_failed = report.stats.store_failed,
            confidence_rejected = report.stats.confidence_rejected,
            policy_rejected = report.stats.policy_rejected,
            "Persistence complete"
        );
        report
    }

    /// Log the user's status breakdown after a run
    pub async fn log_summary(&self, user_id: &str) {
        match self.store.user_summary(user_id).await {
            Ok(summary) => tracing::info!(
                user_id = %user_id,
                total = summary.total,
                approved = summary.approved,
                pending = summary.pending,
                rejected = summary.rejected,
                "User fact summary"
            ),
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Failed to load user summary"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::extraction::Evidence;
    use crate::store::{FactQuery, FactRecord, FactStatus, InMemoryFactStore};
    use async_trait::async_trait;

    fn candidate(layer: Layer, fact_type: &str, value: &str, confidence: f64) -> FactCandidate {
        FactCandidate::new(layer, fact_type, value, confidence, Evidence::new("m1", value))
    }

    fn facts(candidates: Vec<FactCandidate>) -> LayeredFacts {
        let mut facts = LayeredFacts::with_all_layers();
        for c in candidates {
            facts.push(c);
        }
        facts
    }

    #[tokio::test]
    async fn test_guards_and_counters() {
        let store = Arc::new(InMemoryFactStore::new());
        let adapter = PersistenceAdapter::new(store.clone(), 0.75);

        let mut no_evidence = candidate(Layer::Identity, "email", "a@b.com", 0.9);
        no_evidence.evidence.clear();

        let report = adapter
            .store_candidates(
                "asha",
                &facts(vec![
                    candidate(Layer::Identity, "phone_number", "9876543210", 0.95),
                    candidate(Layer::Identity, "name", "Asha", 0.5),
                    candidate(Layer::Relations, "spouse", "Wife", 0.9),
                    no_evidence,
                ]),
                Provenance::Initial,
            )
            .await;

        assert_eq!(
            report.stats,
            StoreStats {
                stored: 1,
                store_failed: 0,
                confidence_rejected: 1,
                policy_rejected: 2,
            }
        );
        assert_eq!(report.stats.total(), 4);
        assert_eq!(report.stored_count(), 1);

        let stored = &report.newly_stored[&Layer::Identity][0];
        let record = store.get_fact(&stored.id).await.unwrap().unwrap();
        assert_eq!(record.conclusion, "Phone number of asha is 9876543210");
        assert_eq!(record.status, FactStatus::Pending);
        assert_eq!(record.extraction_method, ExtractionMethod::Initial);
    }

    #[tokio::test]
    async fn test_reprocess_provenance() {
        let store = Arc::new(InMemoryFactStore::new());
        let adapter = PersistenceAdapter::new(store.clone(), 0.75);
        let report = adapter
            .store_candidates(
                "asha",
                &facts(vec![candidate(Layer::Preferences, "allergy", "peanuts", 0.85)]),
                Provenance::Reprocess { parent_id: "orig-1" },
            )
            .await;

        let id = &report.newly_stored[&Layer::Preferences][0].id;
        let record = store.get_fact(id).await.unwrap().unwrap();
        assert_eq!(record.extraction_method, ExtractionMethod::Reprocess);
        assert_eq!(record.parent_update_id.as_deref(), Some("orig-1"));
    }

    /// Store whose inserts fail for one value
    struct PickyStore {
        inner: InMemoryFactStore,
        refuse: &'static str,
    }

    #[async_trait]
    impl FactStore for PickyStore {
        async fn ping(&self) -> bool {
            true
        }
        async fn insert_fact(&self, fact: NewFact) -> Result<String> {
            if fact.content == self.refuse {
                return Err(Error::Store("constraint violation".to_string()));
            }
            self.inner.insert_fact(fact).await
        }
        async fn get_fact(&self, id: &str) -> Result<Option<FactRecord>> {
            self.inner.get_fact(id).await
        }
        async fn query_facts(&self, query: &FactQuery) -> Result<Vec<FactRecord>> {
            self.inner.query_facts(query).await
        }
        async fn update_status(&self, id: &str, status: FactStatus, by: &str) -> Result<FactRecord> {
            self.inner.update_status(id, status, by).await
        }
        async fn mark_reprocessing_complete(&self, id: &str) -> Result<()> {
            self.inner.mark_reprocessing_complete(id).await
        }
        async fn get_marker(&self, user_id: &str) -> Result<Option<ProcessedMarker>> {
            self.inner.get_marker(user_id).await
        }
        async fn upsert_marker(&self, marker: ProcessedMarker) -> Result<()> {
            self.inner.upsert_marker(marker).await
        }
        async fn delete_marker(&self, user_id: &str) -> Result<bool> {
            self.inner.delete_marker(user_id).await
        }
    }

    #[tokio::test]
    async fn test_store_failure_does_not_stop_others() {
        let store = Arc::new(PickyStore {
            inner: InMemoryFactStore::new(),
            refuse: "Pune",
        });
        let adapter = PersistenceAdapter::new(store, 0.75);
        let report = adapter
            .store_candidates(
                "asha",
                &facts(vec![
                    candidate(Layer::Identity, "address", "Pune", 0.9),
                    candidate(Layer::Identity, "email", "a@b.com", 0.9),
                ]),
                Provenance::Initial,
            )
            .await;
        assert_eq!(report.stats.store_failed, 1);
        assert_eq!(report.stats.stored, 1);
        assert_eq!(report.newly_stored[&Layer::Identity][0].candidate.value, "a@b.com");
    }

    #[tokio::test]
    async fn test_marker_helpers() {
        let store = Arc::new(InMemoryFactStore::new());
        let adapter = PersistenceAdapter::new(store, 0.75);
        assert!(!adapter.already_processed("asha").await);
        adapter.mark_processed("asha", 2).await;
        assert!(adapter.already_processed("asha").await);
    }
}
