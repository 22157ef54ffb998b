//! Targeted reprocessing of rejected facts
//!
//! A reviewer's rejection flags a fact for another look. The reprocessor
//! reloads the user's transcript, removes the messages the rejected fact
//! cited, and asks for that one fact type again with a higher confidence
//! bar. Survivors are written as new pending facts pointing at the original.

use super::persistence::{Provenance, StoreReport};
use super::processor::Pipeline;
use crate::dedup::RuleDedup;
use crate::error::{Error, Result};
use crate::extraction::{Layer, LayeredFacts};
use crate::store::FactRecord;
use crate::transcript::{normalize, Message, TranscriptSource};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Result of reprocessing one rejected fact
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessReport {
    pub record_id: String,
    pub user_id: String,
    pub layer: Layer,
    pub fact_type: String,
    /// Messages left out because the rejected fact cited them
    pub excluded_messages: usize,
    pub remaining_messages: usize,
    pub chunks: usize,
    pub chunks_failed: usize,
    /// Candidates of the target type that passed the reprocessing bar
    pub candidates: usize,
    pub store: StoreReport,
    /// Whether the original's reprocessing flag was cleared
    pub completed: bool,
}

/// Per-record result of a pending-queue run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReprocess {
    pub record_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReprocessReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Re-extracts one fact type for a user, excluding previously cited evidence
pub struct Reprocessor {
    pipeline: Arc<Pipeline>,
    source: Arc<dyn TranscriptSource>,
    rules: RuleDedup,
}

impl Reprocessor {
    pub fn new(pipeline: Arc<Pipeline>, source: Arc<dyn TranscriptSource>) -> Self {
        let rules = RuleDedup::new(pipeline.config().fact_similarity_threshold);
        Self {
            pipeline,
            source,
            rules,
        }
    }

    /// Reprocess a rejected fact by id
    pub async fn reprocess(&self, record_id: &str) -> Result<ReprocessReport> {
        let record = self
            .pipeline
            .store()
            .get_fact(record_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("fact {record_id}")))?;
        if !record.needs_reprocess {
            return Err(Error::NotFound(format!(
                "fact {record_id} is not flagged for reprocessing"
            )));
        }
        self.reprocess_record(&record).await
    }

    /// Reprocess up to `limit` flagged facts, newest first. A failure on
    /// one record is reported and the rest continue.
    pub async fn reprocess_pending(&self, limit: usize) -> Result<Vec<PendingReprocess>> {
        let records = self
            .pipeline
            .store()
            .rejected_for_reprocessing(limit)
            .await?;
        tracing::info!(count = records.len(), "Reprocessing flagged facts");

        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let result = match self.reprocess_record(&record).await {
                Ok(report) => PendingReprocess {
                    record_id: record.id.clone(),
                    report: Some(report),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(fact_id = %record.id, error = %e, "Reprocessing failed");
                    PendingReprocess {
                        record_id: record.id.clone(),
                        report: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    async fn reprocess_record(&self, record: &FactRecord) -> Result<ReprocessReport> {
        let conversations = self.source.load(&record.user_id).await?;
        let messages = normalize(&conversations);

        let excluded: HashSet<&str> = record.evidence_ids().into_iter().collect();
        let remaining: Vec<Message> = messages
            .iter()
            .filter(|m| !excluded.contains(m.id.as_str()))
            .cloned()
            .collect();
        let excluded_messages = messages.len() - remaining.len();
        tracing::info!(
            fact_id = %record.id,
            user_id = %record.user_id,
            fact_type = %record.fact_type,
            excluded = excluded_messages,
            remaining = remaining.len(),
            "Reprocessing rejected fact"
        );

        let min_confidence = self.pipeline.config().reprocess_min_confidence;
        let chunks = self.pipeline.chunk_messages(&remaining)?;
        let prompts = self.pipeline.prompts();
        let run = self
            .pipeline
            .run_chunks(&chunks, |c| {
                prompts.reprocess_prompt(c.messages, record.layer, &record.fact_type, min_confidence)
            })
            .await;

        let narrowed: LayeredFacts = run
            .merged
            .candidates()
            .filter(|c| {
                c.layer == record.layer
                    && c.fact_type.eq_ignore_ascii_case(&record.fact_type)
                    && c.confidence >= min_confidence
            })
            .cloned()
            .fold(LayeredFacts::new(), |mut acc, c| {
                acc.push(c);
                acc
            });
        let deduplicated = self.rules.apply(&narrowed);

        let store = self
            .pipeline
            .persistence()
            .store_candidates(
                &record.user_id,
                &deduplicated,
                Provenance::Reprocess {
                    parent_id: &record.id,
                },
            )
            .await;

        let mut completed = false;
        if store.stats.stored > 0 {
            match self
                .pipeline
                .store()
                .mark_reprocessing_complete(&record.id)
                .await
            {
                Ok(()) => completed = true,
                Err(e) => tracing::warn!(
                    fact_id = %record.id,
                    error = %e,
                    "Failed to clear reprocessing flag"
                ),
            }
        } else {
            tracing::info!(fact_id = %record.id, "No replacement found, fact stays flagged");
        }

        Ok(ReprocessReport {
            record_id: record.id.clone(),
            user_id: record.user_id.clone(),
            layer: record.layer,
            fact_type: record.fact_type.clone(),
            excluded_messages,
            remaining_messages: remaining.len(),
            chunks: run.chunks,
            chunks_failed: run.chunks_failed,
            candidates: narrowed.total(),
            store,
            completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FactKeeperConfig;
    use crate::extraction::testing::ScriptedExtractionClient;
    use crate::extraction::Evidence;
    use crate::store::{
        ExtractionMethod, FactQuery, FactStatus, FactStore, InMemoryFactStore, NewFact,
    };
    use crate::transcript::{Conversation, MemorySource, RawEntry};

    const REPLY: &str = r#"{
        "Layer1": [
            {"detail": {"type": "email", "value": "new@asha.in"}, "confidence": 0.9,
             "evidence": [{"message_id": "u2", "message_snippet": "my correct email is new@asha.in"}]},
            {"detail": {"type": "email", "value": "maybe@asha.in"}, "confidence": 0.78,
             "evidence": [{"message_id": "u3", "message_snippet": "maybe@asha.in"}]},
            {"detail": {"type": "phone_number", "value": "9876543210"}, "confidence": 0.95,
             "evidence": [{"message_id": "u3", "message_snippet": "9876543210"}]}
        ]
    }"#;

    async fn setup(
        client: ScriptedExtractionClient,
    ) -> (Reprocessor, Arc<InMemoryFactStore>, Arc<ScriptedExtractionClient>, String) {
        let store = Arc::new(InMemoryFactStore::new());
        let client = Arc::new(client);
        let pipeline = Arc::new(
            Pipeline::new(client.clone(), store.clone(), &FactKeeperConfig::default()).unwrap(),
        );

        let source = Arc::new(MemorySource::new());
        source
            .insert(
                "asha",
                vec![Conversation {
                    user_queries: vec![
                        RawEntry::new("u1", "My email is old@asha.in"),
                        RawEntry::new("u2", "Sorry, my correct email is new@asha.in"),
                        RawEntry::new("u3", "Call me on 9876543210, or try maybe@asha.in"),
                    ],
                    team_replies: vec![],
                }],
            )
            .await;

        let id = store
            .insert_fact(NewFact {
                user_id: "asha".to_string(),
                layer: Layer::Identity,
                fact_type: "email".to_string(),
                content: "old@asha.in".to_string(),
                conclusion: "Email of asha is old@asha.in".to_string(),
                confidence: 0.9,
                evidence: vec![Evidence::new("u1", "My email is old@asha.in")],
                ownership_reason: None,
                timestamp: None,
                extraction_method: ExtractionMethod::Initial,
                parent_update_id: None,
            })
            .await
            .unwrap();
        store
            .update_status(&id, FactStatus::Rejected, "reviewer")
            .await
            .unwrap();

        (Reprocessor::new(pipeline, source), store, client, id)
    }

    #[tokio::test]
    async fn test_reprocess_excludes_evidence_and_links_parent() {
        let (reprocessor, store, client, id) =
            setup(ScriptedExtractionClient::from_fn(|_| Ok(REPLY.to_string()))).await;

        let report = reprocessor.reprocess(&id).await.unwrap();
        assert_eq!(report.excluded_messages, 1);
        assert_eq!(report.remaining_messages, 2);
        assert_eq!(report.candidates, 1);
        assert!(report.completed);

        let prompt = &client.requests()[0].prompt;
        assert!(!prompt.contains("[u1]"));
        assert!(prompt.contains("[u2]"));
        assert!(prompt.contains("\"email\""));

        let original = store.get_fact(&id).await.unwrap().unwrap();
        assert!(!original.needs_reprocess);

        let new_facts: Vec<_> = store
            .query_facts(&FactQuery::for_user("asha").with_status(FactStatus::Pending))
            .await
            .unwrap();
        assert_eq!(new_facts.len(), 1);
        assert_eq!(new_facts[0].content, "new@asha.in");
        assert_eq!(new_facts[0].extraction_method, ExtractionMethod::Reprocess);
        assert_eq!(new_facts[0].parent_update_id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_no_replacement_keeps_flag() {
        let (reprocessor, store, _, id) = setup(ScriptedExtractionClient::from_fn(|_| {
            Ok(r#"{"Layer1": []}"#.to_string())
        }))
        .await;

        let report = reprocessor.reprocess(&id).await.unwrap();
        assert!(!report.completed);
        assert!(store.get_fact(&id).await.unwrap().unwrap().needs_reprocess);
    }

    #[tokio::test]
    async fn test_unflagged_or_unknown_fact_rejected() {
        let (reprocessor, store, _, id) =
            setup(ScriptedExtractionClient::from_fn(|_| Ok(REPLY.to_string()))).await;
        assert!(matches!(
            reprocessor.reprocess("ghost").await,
            Err(Error::NotFound(_))
        ));

        store
            .update_status(&id, FactStatus::Approved, "reviewer")
            .await
            .unwrap();
        store.mark_reprocessing_complete(&id).await.unwrap();
        assert!(matches!(
            reprocessor.reprocess(&id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_queue_isolates_failures() {
        let (reprocessor, store, _, _) =
            setup(ScriptedExtractionClient::from_fn(|_| Ok(REPLY.to_string()))).await;

        let orphan = store
            .insert_fact(NewFact {
                user_id: "nobody".to_string(),
                layer: Layer::Identity,
                fact_type: "email".to_string(),
                content: "x@y.z".to_string(),
                conclusion: "Email of nobody is x@y.z".to_string(),
                confidence: 0.9,
                evidence: vec![Evidence::new("u1", "x@y.z")],
                ownership_reason: None,
                timestamp: None,
                extraction_method: ExtractionMethod::Initial,
                parent_update_id: None,
            })
            .await
            .unwrap();
        store
            .update_status(&orphan, FactStatus::Rejected, "reviewer")
            .await
            .unwrap();

        let results = reprocessor.reprocess_pending(10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record_id, orphan);
        assert!(results[0].error.is_some());
        assert!(results[1].report.as_ref().unwrap().completed);
    }
}
