//! End-to-end processing of one user's transcript
//!
//! Normalize, chunk, extract and validate each chunk in order, merge,
//! deduplicate, persist. Chunks are submitted strictly one after another so
//! the merged order only depends on the input. Failures are contained per
//! chunk and per fact; only configuration problems surface as errors.

use super::persistence::{PersistenceAdapter, Provenance, StoreReport, StoredFact};
use crate::config::{FactKeeperConfig, PipelineConfig};
use crate::dedup::{DedupTier, Deduplicator, LlmDedup, RuleDedup};
use crate::error::Result;
use crate::extraction::{
    complete_with_timeout, merge, parse_extraction, ExtractionClient, ExtractionRequest, Layer,
    LayeredFacts, PromptBuilder, ValidationStats, Validator,
};
use crate::store::FactStore;
use crate::transcript::{chunk, normalize, Chunk, Conversation, Message};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Result of running a prompt over every chunk
#[derive(Debug, Clone, Default)]
pub struct ChunkRun {
    /// Validated results merged across chunks
    pub merged: LayeredFacts,
    pub chunks: usize,
    /// Chunks whose extraction call failed or timed out
    pub chunks_failed: usize,
    /// Chunks whose response could not be parsed
    pub chunks_unparsable: usize,
    pub validation: ValidationStats,
}

impl ChunkRun {
    /// Whether the extraction service answered at least once (or was not needed)
    pub fn service_reached(&self) -> bool {
        self.chunks == 0 || self.chunks_failed < self.chunks
    }
}

/// Summary of one processing run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub user_id: String,
    pub messages: usize,
    pub chunks: usize,
    pub chunks_failed: usize,
    pub chunks_unparsable: usize,
    pub validation: ValidationStats,
    pub merged: usize,
    pub dedup: DedupTier,
    /// Deduplicated candidates, stored or not
    pub deduplicated: LayeredFacts,
    /// False when the store was unreachable and nothing was written
    pub persisted: bool,
    pub store: StoreReport,
}

impl ProcessReport {
    /// Facts written in this run, per layer
    pub fn newly_stored(&self) -> &BTreeMap<Layer, Vec<StoredFact>> {
        &self.store.newly_stored
    }
}

/// Outcome of `Pipeline::process`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// The user was already processed and no force flag was given
    Skipped { user_id: String },
    /// The pipeline ran
    Completed(Box<ProcessReport>),
}

impl ProcessOutcome {
    /// Facts written in this run; empty when skipped
    pub fn newly_stored(&self) -> BTreeMap<Layer, Vec<StoredFact>> {
        match self {
            ProcessOutcome::Skipped { .. } => BTreeMap::new(),
            ProcessOutcome::Completed(report) => report.newly_stored().clone(),
        }
    }

    /// Deduplicated candidates that were not written because the store was
    /// unreachable
    pub fn unstored_candidates(&self) -> Option<&LayeredFacts> {
        match self {
            ProcessOutcome::Completed(report) if !report.persisted => Some(&report.deduplicated),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ProcessOutcome::Skipped { .. })
    }
}

/// The extraction pipeline with its dependencies
pub struct Pipeline {
    client: Arc<dyn ExtractionClient>,
    store: Arc<dyn FactStore>,
    persistence: PersistenceAdapter,
    deduplicator: Deduplicator,
    prompts: PromptBuilder,
    validator: Validator,
    config: PipelineConfig,
    max_tokens: u32,
}

impl Pipeline {
    /// Wire a pipeline from explicit dependencies
    pub fn new(
        client: Arc<dyn ExtractionClient>,
        store: Arc<dyn FactStore>,
        config: &FactKeeperConfig,
    ) -> Result<Self> {
        config.validate()?;
        let pipeline = &config.pipeline;
        let prompts = PromptBuilder::new(pipeline.message_similarity_threshold);
        let timeout = Duration::from_secs(pipeline.call_timeout_secs);

        let deduplicator = Deduplicator::new(
            Box::new(LlmDedup::new(
                client.clone(),
                prompts.clone(),
                config.extraction.dedup_max_tokens,
                timeout,
            )),
            RuleDedup::new(pipeline.fact_similarity_threshold),
        );

        Ok(Self {
            persistence: PersistenceAdapter::new(store.clone(), pipeline.min_confidence),
            client,
            store,
            deduplicator,
            prompts,
            validator: Validator::new(pipeline.min_confidence),
            config: pipeline.clone(),
            max_tokens: config.extraction.max_tokens,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn FactStore> {
        &self.store
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub fn persistence(&self) -> &PersistenceAdapter {
        &self.persistence
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.call_timeout_secs)
    }

    /// Process one user's conversations
    pub async fn process(
        &self,
        user_id: &str,
        conversations: &[Conversation],
        force: bool,
    ) -> Result<ProcessOutcome> {
        let store_online = self.store.ping().await;
        if !store_online {
            tracing::warn!(
                user_id = %user_id,
                "Fact store unreachable, results will be logged but not stored"
            );
        }

        if store_online && !force && self.persistence.already_processed(user_id).await {
            tracing::info!(user_id = %user_id, "Already processed, skipping");
            return Ok(ProcessOutcome::Skipped {
                user_id: user_id.to_string(),
            });
        }

        let messages = normalize(conversations);
        tracing::info!(user_id = %user_id, messages = messages.len(), "Normalized transcript");

        let chunks = chunk(&messages, self.config.chunk_size, self.config.overlap)?;
        tracing::info!(user_id = %user_id, chunks = chunks.len(), "Chunked transcript");

        let run = self
            .run_chunks(&chunks, |c| {
                self.prompts.extraction_prompt(user_id, c.messages)
            })
            .await;
        tracing::info!(
            user_id = %user_id,
            merged = run.merged.total(),
            chunks_failed = run.chunks_failed,
            chunks_unparsable = run.chunks_unparsable,
            "Merged chunk results"
        );

        let merged_total = run.merged.total();
        let outcome = self
            .deduplicator
            .deduplicate(user_id, run.merged.clone())
            .await;

        let mut report = ProcessReport {
            user_id: user_id.to_string(),
            messages: messages.len(),
            chunks: run.chunks,
            chunks_failed: run.chunks_failed,
            chunks_unparsable: run.chunks_unparsable,
            validation: run.validation,
            merged: merged_total,
            dedup: outcome.tier,
            deduplicated: outcome.facts,
            persisted: false,
            store: StoreReport::default(),
        };

        if !store_online {
            for candidate in report.deduplicated.candidates() {
                tracing::info!(
                    user_id = %user_id,
                    layer = %candidate.layer,
                    fact_type = %candidate.fact_type,
                    value = %candidate.value,
                    confidence = candidate.confidence,
                    "Extracted fact (not stored)"
                );
            }
            return Ok(ProcessOutcome::Completed(Box::new(report)));
        }

        report.store = self
            .persistence
            .store_candidates(user_id, &report.deduplicated, Provenance::Initial)
            .await;
        report.persisted = true;

        let stats = &report.store.stats;
        if !run.service_reached() {
            tracing::warn!(
                user_id = %user_id,
                "Every extraction call failed, leaving user unmarked for a later retry"
            );
        } else if stats.stored == 0 && stats.store_failed > 0 {
            tracing::warn!(
                user_id = %user_id,
                failed = stats.store_failed,
                "Every store write failed, leaving user unmarked for a later retry"
            );
        } else {
            self.persistence.mark_processed(user_id, stats.stored).await;
        }
        self.persistence.log_summary(user_id).await;

        Ok(ProcessOutcome::Completed(Box::new(report)))
    }

    /// Extract, validate and merge over chunks in submission order
    pub(crate) async fn run_chunks<'a, F>(&self, chunks: &[Chunk<'a>], build_prompt: F) -> ChunkRun
    where
        F: Fn(&Chunk<'a>) -> String,
    {
        let mut run = ChunkRun {
            chunks: chunks.len(),
            ..Default::default()
        };
        let mut results = Vec::with_capacity(chunks.len());

        for c in chunks {
            let request = ExtractionRequest::new(build_prompt(c), self.max_tokens);
            let text =
                match complete_with_timeout(self.client.as_ref(), request, self.call_timeout())
                    .await
                {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(chunk = c.index, error = %e, "Extraction call failed");
                        run.chunks_failed += 1;
                        continue;
                    }
                };

            let raw = match parse_extraction(&text) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(
                        chunk = c.index,
                        error = %e,
                        preview = %text.chars().take(200).collect::<String>(),
                        "Unparsable extraction response"
                    );
                    run.chunks_unparsable += 1;
                    continue;
                }
            };

            let (validated, stats) = self.validator.validate(raw);
            tracing::debug!(
                chunk = c.index,
                messages = c.len(),
                kept = stats.kept,
                "Validated chunk"
            );
            run.validation += stats;
            results.push(validated);
        }

        run.merged = merge(results);
        run
    }

    /// Window messages with the configured chunk size and overlap
    pub fn chunk_messages<'m>(&self, messages: &'m [Message]) -> Result<Vec<Chunk<'m>>> {
        chunk(messages, self.config.chunk_size, self.config.overlap)
    }
}
