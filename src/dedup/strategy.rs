//! Deduplication strategy seam and the Tier A acceptance rule

use crate::extraction::{Layer, LayeredFacts};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Raw outcome of one deduplication attempt, before acceptance
#[derive(Debug)]
pub enum DedupAttempt {
    /// The service call failed or timed out
    CallFailed(String),
    /// The service answered but no JSON object could be read
    Unparsable(String),
    /// A layered result was read
    Parsed(LayeredFacts),
}

/// Why a Tier A result was rejected in favour of the rule-based pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FallbackReason {
    CallFailed { detail: String },
    Unparsable { detail: String },
    MissingLayers { layers: Vec<String> },
    Collapsed,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::CallFailed { detail } => write!(f, "call failed: {detail}"),
            FallbackReason::Unparsable { detail } => write!(f, "unparsable response: {detail}"),
            FallbackReason::MissingLayers { layers } => {
                write!(f, "missing layers: {}", layers.join(", "))
            }
            FallbackReason::Collapsed => write!(f, "non-empty input collapsed to nothing"),
        }
    }
}

/// Decide whether a Tier A attempt is usable for `input`.
///
/// The result is rejected exactly when the call failed, the response was
/// unparsable, a layer key of the input is missing from the output, or a
/// non-empty input came back empty.
pub fn select_tier_a(
    input: &LayeredFacts,
    attempt: DedupAttempt,
) -> Result<LayeredFacts, FallbackReason> {
    let output = match attempt {
        DedupAttempt::CallFailed(detail) => return Err(FallbackReason::CallFailed { detail }),
        DedupAttempt::Unparsable(detail) => return Err(FallbackReason::Unparsable { detail }),
        DedupAttempt::Parsed(output) => output,
    };

    let missing: BTreeSet<Layer> = input
        .layer_keys()
        .difference(&output.layer_keys())
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(FallbackReason::MissingLayers {
            layers: missing.iter().map(|l| l.key().to_string()).collect(),
        });
    }

    if input.total() > 0 && output.total() == 0 {
        return Err(FallbackReason::Collapsed);
    }

    Ok(output)
}

/// A deduplication pass over merged candidates
#[async_trait]
pub trait DedupStrategy: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Attempt to deduplicate `facts` for `user_id`
    async fn attempt(&self, user_id: &str, facts: &LayeredFacts) -> DedupAttempt;
}
