//! Fact store record types
//!
//! All types use camelCase JSON, both on disk and over the review API.

use crate::extraction::{Evidence, Layer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Review status of a persisted fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for FactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// How a fact was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Initial,
    Reprocess,
}

/// A persisted fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactRecord {
    pub id: String,
    pub user_id: String,
    pub layer: Layer,
    pub fact_type: String,
    pub content: String,
    pub conclusion: String,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub status: FactStatus,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    pub extraction_method: ExtractionMethod,
    #[serde(default)]
    pub parent_update_id: Option<String>,
    #[serde(default)]
    pub needs_reprocess: bool,
    pub created_at: DateTime<Utc>,
}

impl FactRecord {
    /// Message ids cited as evidence
    pub fn evidence_ids(&self) -> Vec<&str> {
        self.evidence.iter().map(|e| e.message_id.as_str()).collect()
    }
}

/// A fact to insert; the store assigns id, status and timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    pub user_id: String,
    pub layer: Layer,
    pub fact_type: String,
    pub content: String,
    pub conclusion: String,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub ownership_reason: Option<String>,
    pub timestamp: Option<String>,
    pub extraction_method: ExtractionMethod,
    pub parent_update_id: Option<String>,
}

impl NewFact {
    /// Turn into a pending record
    pub fn into_record(self, id: String, created_at: DateTime<Utc>) -> FactRecord {
        FactRecord {
            id,
            user_id: self.user_id,
            layer: self.layer,
            fact_type: self.fact_type,
            content: self.content,
            conclusion: self.conclusion,
            confidence: self.confidence,
            evidence: self.evidence,
            ownership_reason: self.ownership_reason,
            timestamp: self.timestamp,
            status: FactStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            extraction_method: self.extraction_method,
            parent_update_id: self.parent_update_id,
            needs_reprocess: false,
            created_at,
        }
    }
}

/// Idempotency guard for a processed user transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedMarker {
    pub user_id: String,
    pub processed_at: DateTime<Utc>,
    pub total_facts_extracted: usize,
}

/// Filter for fact queries; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactQuery {
    pub user_id: Option<String>,
    pub status: Option<FactStatus>,
    pub layer: Option<Layer>,
    pub limit: Option<usize>,
}

impl FactQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: FactStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_layer(mut self, layer: Option<Layer>) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record passes the filter (limit aside)
    pub fn matches(&self, record: &FactRecord) -> bool {
        self.user_id.as_deref().map_or(true, |u| record.user_id == u)
            && self.status.map_or(true, |s| record.status == s)
            && self.layer.map_or(true, |l| record.layer == l)
    }
}

/// Status breakdown for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: String,
    pub total: usize,
    pub approved: usize,
    pub pending: usize,
    pub rejected: usize,
    pub layers: BTreeMap<String, usize>,
}

impl UserSummary {
    /// Summarize a user's records
    pub fn from_records(user_id: &str, records: &[FactRecord]) -> Self {
        let mut summary = Self {
            user_id: user_id.to_string(),
            ..Default::default()
        };
        for record in records.iter().filter(|r| r.user_id == user_id) {
            summary.total += 1;
            match record.status {
                FactStatus::Approved => summary.approved += 1,
                FactStatus::Pending => summary.pending += 1,
                FactStatus::Rejected => summary.rejected += 1,
            }
            *summary
                .layers
                .entry(record.layer.key().to_string())
                .or_default() += 1;
        }
        summary
    }
}

/// Store-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub total_users: usize,
    pub total_facts: usize,
    pub approved: usize,
    pub pending: usize,
    pub rejected: usize,
    /// Approved share of reviewed facts, in percent, one decimal
    pub acceptance_rate: f64,
    pub layers: BTreeMap<String, usize>,
}

impl SystemStats {
    pub fn from_records(records: &[FactRecord]) -> Self {
        let mut stats = Self::default();
        let mut users = std::collections::HashSet::new();
        for record in records {
            users.insert(record.user_id.as_str());
            stats.total_facts += 1;
            match record.status {
                FactStatus::Approved => stats.approved += 1,
                FactStatus::Pending => stats.pending += 1,
                FactStatus::Rejected => stats.rejected += 1,
            }
            *stats
                .layers
                .entry(record.layer.key().to_string())
                .or_default() += 1;
        }
        stats.total_users = users.len();

        let reviewed = stats.approved + stats.rejected;
        if reviewed > 0 {
            let rate = stats.approved as f64 / reviewed as f64 * 100.0;
            stats.acceptance_rate = (rate * 10.0).round() / 10.0;
        }
        stats
    }
}
