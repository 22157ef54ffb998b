//! Tier A: deduplication by the extraction service
//!
//! The merged candidates are sent with a strict merge policy. Whatever comes
//! back is re-anchored to the input before acceptance: facts that match no
//! input candidate are dropped and evidence snippets are replaced by the
//! originals.

use super::strategy::{DedupAttempt, DedupStrategy};
use crate::extraction::{
    complete_with_timeout, normalize_text, parse_lenient, ExtractionClient, ExtractionRequest,
    FactCandidate, LayeredFacts, PromptBuilder, DEDUP_SYSTEM_PROMPT,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Service-mediated deduplication
pub struct LlmDedup {
    client: Arc<dyn ExtractionClient>,
    prompts: PromptBuilder,
    max_tokens: u32,
    timeout: Duration,
}

impl LlmDedup {
    pub fn new(
        client: Arc<dyn ExtractionClient>,
        prompts: PromptBuilder,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            prompts,
            max_tokens,
            timeout,
        }
    }
}

#[async_trait]
impl DedupStrategy for LlmDedup {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn attempt(&self, user_id: &str, facts: &LayeredFacts) -> DedupAttempt {
        let prompt = match self.prompts.dedup_prompt(user_id, facts) {
            Ok(prompt) => prompt,
            Err(e) => return DedupAttempt::CallFailed(e.to_string()),
        };
        let request = ExtractionRequest::new(prompt, self.max_tokens).with_system(DEDUP_SYSTEM_PROMPT);

        let text = match complete_with_timeout(self.client.as_ref(), request, self.timeout).await {
            Ok(text) => text,
            Err(e) => return DedupAttempt::CallFailed(e.to_string()),
        };
        if text.trim().is_empty() {
            return DedupAttempt::Unparsable("empty response".to_string());
        }

        match parse_lenient(&text) {
            Ok(output) => DedupAttempt::Parsed(reanchor(facts, output)),
            Err(e) => DedupAttempt::Unparsable(e.to_string()),
        }
    }
}

fn fact_key(candidate: &FactCandidate) -> (String, String) {
    (
        candidate.fact_type.trim().to_lowercase(),
        normalize_text(&candidate.value),
    )
}

/// An input candidate and the snippets it cites, by message id
struct Original<'a> {
    candidate: &'a FactCandidate,
    snippets: HashMap<&'a str, &'a str>,
}

/// Tie Tier A output back to the candidates it was built from
///
/// A fact is kept only when its (type, value) matches an input candidate.
/// Snippets come from the matching candidate's own evidence, or from any
/// input candidate citing the same message when the fact absorbed a
/// duplicate.
pub fn reanchor(input: &LayeredFacts, output: LayeredFacts) -> LayeredFacts {
    let mut by_message: HashMap<&str, &str> = HashMap::new();
    let mut originals: HashMap<(String, String), Original<'_>> = HashMap::new();
    for candidate in input.candidates() {
        let original = originals.entry(fact_key(candidate)).or_insert(Original {
            candidate,
            snippets: HashMap::new(),
        });
        for evidence in &candidate.evidence {
            let (id, snippet) = (evidence.message_id.as_str(), evidence.snippet.as_str());
            original.snippets.entry(id).or_insert(snippet);
            by_message.entry(id).or_insert(snippet);
        }
    }

    output
        .into_iter()
        .map(|(layer, candidates)| {
            let kept = candidates
                .into_iter()
                .filter_map(|mut candidate| {
                    let Some(original) = originals.get(&fact_key(&candidate)) else {
                        tracing::warn!(
                            fact_type = %candidate.fact_type,
                            "Dropping deduplicated fact with no matching input candidate"
                        );
                        return None;
                    };

                    let mut seen = HashSet::new();
                    candidate.evidence.retain_mut(|evidence| {
                        let id = evidence.message_id.as_str();
                        let snippet = original
                            .snippets
                            .get(id)
                            .or_else(|| by_message.get(id))
                            .copied();
                        match snippet {
                            Some(snippet) if seen.insert(evidence.message_id.clone()) => {
                                evidence.snippet = snippet.to_string();
                                true
                            }
                            _ => false,
                        }
                    });
                    if candidate.evidence.is_empty() {
                        tracing::warn!(
                            fact_type = %candidate.fact_type,
                            "Dropping deduplicated fact with no evidence from the input"
                        );
                        return None;
                    }

                    let source = original.candidate;
                    if candidate.confidence.is_nan() {
                        candidate.confidence = source.confidence;
                    }
                    if candidate.ownership_reason.is_none() {
                        candidate.ownership_reason = source.ownership_reason.clone();
                    }
                    if candidate.timestamp.is_none() {
                        candidate.timestamp = source.timestamp.clone();
                    }
                    candidate.layer = layer;
                    Some(candidate)
                })
                .collect();
            (layer, kept)
        })
        .collect()
}
