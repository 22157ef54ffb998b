//! Batch processing over a transcript source
//!
//! Users are processed one after another. Each user's failure is recorded
//! in the report and the batch moves on.

use super::processor::{Pipeline, ProcessOutcome};
use crate::error::Result;
use crate::transcript::TranscriptSource;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-user batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    Skipped,
    Error,
}

/// Outcome for one user in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub status: BatchStatus,
    pub total_facts: usize,
    pub layers: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    fn skipped() -> Self {
        Self {
            status: BatchStatus::Skipped,
            total_facts: 0,
            layers: BTreeMap::new(),
            error: None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            status: BatchStatus::Error,
            total_facts: 0,
            layers: BTreeMap::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Per-user results of a batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub results: BTreeMap<String, BatchItem>,
}

impl BatchReport {
    pub fn count(&self, status: BatchStatus) -> usize {
        self.results.values().filter(|i| i.status == status).count()
    }

    /// Facts written across all users
    pub fn total_facts(&self) -> usize {
        self.results.values().map(|i| i.total_facts).sum()
    }
}

/// Runs the pipeline for many users
pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    source: Arc<dyn TranscriptSource>,
}

impl BatchRunner {
    pub fn new(pipeline: Arc<Pipeline>, source: Arc<dyn TranscriptSource>) -> Self {
        Self { pipeline, source }
    }

    /// Process the given users, or every user the source knows about
    pub async fn run(&self, users: Option<Vec<String>>, force: bool) -> Result<BatchReport> {
        let users = match users {
            Some(users) => users,
            None => self.source.list_users().await?,
        };
        tracing::info!(users = users.len(), force, "Starting batch");

        let mut report = BatchReport::default();
        for user_id in users {
            let item = self.run_one(&user_id, force).await;
            report.results.insert(user_id, item);
        }

        tracing::info!(
            success = report.count(BatchStatus::Success),
            skipped = report.count(BatchStatus::Skipped),
            error = report.count(BatchStatus::Error),
            total_facts = report.total_facts(),
            "Batch complete"
        );
        Ok(report)
    }

    async fn run_one(&self, user_id: &str, force: bool) -> BatchItem {
        let conversations = match self.source.load(user_id).await {
            Ok(conversations) => conversations,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to load transcript");
                return BatchItem::failed(e);
            }
        };

        match self.pipeline.process(user_id, &conversations, force).await {
            Ok(ProcessOutcome::Skipped { .. }) => BatchItem::skipped(),
            Ok(ProcessOutcome::Completed(report)) => BatchItem {
                status: BatchStatus::Success,
                total_facts: report.store.stored_count(),
                layers: report.store.layer_counts(),
                error: None,
            },
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Processing failed");
                BatchItem::failed(e)
            }
        }
    }
}
