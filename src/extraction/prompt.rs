//! Prompt Builder
//!
//! Composes the instruction text sent to the extraction service: the full
//! per-chunk extraction prompt, the narrowed reprocessing prompt, and the
//! deduplication prompt with its system policy.

use super::similarity::{normalize_text, ratio};
use super::types::{Layer, LayeredFacts};
use crate::error::Result;
use crate::transcript::Message;
use serde::Serialize;

/// System-level policy sent with every deduplication request
pub const DEDUP_SYSTEM_PROMPT: &str = "\
You deduplicate facts for a personal memory system and reply with JSON only.
Rules:
- Remove exact and near-duplicate values within the same fact type. Never merge facts of different types.
- When two facts of one type collide, keep the one with the higher confidence.
- When colliding facts have equal confidence, merge their evidence lists completely.
- Drop relationship, family_member and spouse entries whose value is only a relation word such as \"wife\" or \"nephew\".
- Never add facts and never alter values beyond merging duplicates.
- Copy every evidence snippet exactly as given; never write placeholder text in place of a snippet.
- Keep the input structure: the same layer keys, each holding a list of {type, value, confidence, evidence}.
- No prose, no markdown, no code fences.";

/// Builds extraction, reprocessing and deduplication prompts
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    message_similarity_threshold: u8,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(95)
    }
}

impl PromptBuilder {
    /// Messages whose similarity to an already kept message exceeds
    /// `message_similarity_threshold` are left out of the prompt context.
    pub fn new(message_similarity_threshold: u8) -> Self {
        Self {
            message_similarity_threshold,
        }
    }

    /// Drop near-duplicate and empty messages, keeping first occurrences
    pub fn dedupe_messages<'a>(&self, messages: &'a [Message]) -> Vec<&'a Message> {
        let mut kept: Vec<(&Message, String)> = Vec::new();

        for message in messages {
            let normalized = normalize_text(&message.text);
            if normalized.is_empty() {
                continue;
            }
            let duplicate = kept
                .iter()
                .any(|(_, seen)| ratio(&normalized, seen) > self.message_similarity_threshold);
            if !duplicate {
                kept.push((message, normalized));
            }
        }

        kept.into_iter().map(|(m, _)| m).collect()
    }

    /// One `[id] Sender: text` line per kept message
    pub fn context_text(&self, messages: &[Message]) -> String {
        self.dedupe_messages(messages)
            .iter()
            .map(|m| format!("[{}] {}: {}", m.id, m.sender, m.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Full four-layer extraction prompt for one chunk
    pub fn extraction_prompt(&self, user_id: &str, messages: &[Message]) -> String {
        let context = self.context_text(messages);
        format!(
            r#"You extract personal information for a personal assistant memory system.
Extract ONLY facts that belong to, or are explicitly claimed by, the target user "{user}".

TARGET USER: {user}

CONVERSATION CHUNK:
{context}

OWNERSHIP RULES:
1. Extract a fact only when {user} states it about themselves with a first-person marker ("my", "I am", "I live", "my name is").
2. Reject facts about other people, including anything the team writes about offices, meeting points or third parties.
3. Reject temporary or incidental locations ("let's meet at Bandra", "the office is in Andheri").
4. Reject casual mentions with no sign of personal ownership. When ownership is unclear, do not extract.
5. Never extract a bare relation word ("wife", "husband", "nephew") as a value. Relations need a name: "my wife Sarah" gives spouse = "Sarah"; "my wife will come" gives nothing.
6. Contact details of a relative are extracted only when {user} says whose they are ("my wife's number is ...").

LAYERS:
Layer1 - {layer1}. Work location and work address belong here. Travel plans do not.
Layer2 - {layer2}. Only when the document details themselves are given; a bare mention of a document is not enough.
Layer3 - {layer3}. Only when a specific name is mentioned.
Layer4 - {layer4}. Only what {user} says they like or do; travel plans only if they are long-term preferences.

VALUE CONVENTIONS:
- relationship_status: "married" or "single"
- gender: "Male" or "Female"
- phone_number and email: exactly as written
- address: personal or home address only

CONFIDENCE:
- 0.9 to 1.0 for direct personal claims ("My address is ...")
- 0.8 to 0.9 for clear attribution ("I live at ...")
- anything less certain must not be returned

Reply with JSON only, in exactly this shape, using an empty list for a layer with nothing to report:
{{
  "Layer1": [
    {{
      "detail": {{"type": "field_type", "value": "extracted value"}},
      "confidence": 0.95,
      "evidence": [{{"message_id": "id", "message_snippet": "relevant part of the message"}}],
      "timestamp": "2025-09-13 00:00:00",
      "ownership_reason": "why this belongs to {user}"
    }}
  ],
  "Layer2": [],
  "Layer3": [],
  "Layer4": []
}}"#,
            user = user_id,
            context = context,
            layer1 = Layer::Identity.description(),
            layer2 = Layer::Documents.description(),
            layer3 = Layer::Relations.description(),
            layer4 = Layer::Preferences.description(),
        )
    }

    /// Narrowed prompt targeting a single fact type in one layer
    pub fn reprocess_prompt(
        &self,
        messages: &[Message],
        layer: Layer,
        fact_type: &str,
        min_confidence: f64,
    ) -> String {
        let context = self.context_text(messages);
        format!(
            r#"A reviewer rejected a previous "{fact_type}" fact for this user. Look again, carefully.

LAYER {number}: {description}

TASK: find clear, unambiguous "{fact_type}" information in the conversation chunk below.

CONVERSATION CHUNK:
{context}

INSTRUCTIONS:
1. Report only "{fact_type}" facts; ignore every other kind of information.
2. Conversational phrasing counts, but ownership by the user must be explicit.
3. Report a fact only with confidence {min_confidence:.1} or higher; otherwise return an empty list.
4. Cite the message ids you relied on as evidence.

Reply with JSON only:
{{
  "{key}": [
    {{
      "detail": {{"type": "{fact_type}", "value": "extracted value"}},
      "confidence": 0.85,
      "evidence": [{{"message_id": "id", "message_snippet": "relevant part of the message"}}],
      "timestamp": "2025-09-13 00:00:00"
    }}
  ]
}}"#,
            fact_type = fact_type,
            number = layer.number(),
            description = layer.description(),
            context = context,
            min_confidence = min_confidence,
            key = layer.key(),
        )
    }

    /// Deduplication prompt embedding the merged candidates
    pub fn dedup_prompt(&self, user_id: &str, facts: &LayeredFacts) -> Result<String> {
        let payload = serde_json::to_string_pretty(&DedupPayload::from(facts))?;
        Ok(format!(
            r#"Deduplicate the memory facts below for user {user_id}.

1. phone_number: keep only the highest-confidence number; formats of one number ("+91" prefix or not) are duplicates.
2. address: keep only the highest-confidence address; similar addresses are duplicates.
3. email: keep every distinct address.
4. relationship, family_member, spouse: remove entries without a specific name.
5. Any other type: remove duplicates, keeping the highest-confidence version.
6. Equal confidence: merge the evidence lists into one fact.
7. Keep every layer key from the input, even when its list becomes empty.
8. Keep message_id and snippet of each evidence entry exactly as given.

Input facts:
{payload}"#
        ))
    }
}

#[derive(Serialize)]
struct DedupFact<'a> {
    #[serde(rename = "type")]
    fact_type: &'a str,
    value: &'a str,
    confidence: f64,
    evidence: &'a [super::types::Evidence],
}

#[derive(Serialize)]
#[serde(transparent)]
struct DedupPayload<'a>(std::collections::BTreeMap<&'static str, Vec<DedupFact<'a>>>);

impl<'a> From<&'a LayeredFacts> for DedupPayload<'a> {
    fn from(facts: &'a LayeredFacts) -> Self {
        Self(
            facts
                .iter()
                .map(|(layer, candidates)| {
                    let entries = candidates
                        .iter()
                        .map(|c| DedupFact {
                            fact_type: &c.fact_type,
                            value: &c.value,
                            confidence: c.confidence,
                            evidence: &c.evidence,
                        })
                        .collect();
                    (layer.key(), entries)
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::{Evidence, FactCandidate};
    use crate::transcript::Sender;

    fn msg(id: &str, sender: Sender, text: &str) -> Message {
        Message {
            id: id.to_string(),
            sender,
            text: text.to_string(),
            conversation_index: 0,
        }
    }

    #[test]
    fn test_near_duplicate_messages_dropped() {
        let messages = vec![
            msg("1", Sender::User, "My phone number is 9876543210"),
            msg("2", Sender::User, "my phone number is  9876543210"),
            msg("3", Sender::Team, "Noted, thank you"),
            msg("4", Sender::User, "   "),
        ];
        let builder = PromptBuilder::default();
        let kept: Vec<_> = builder
            .dedupe_messages(&messages)
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(kept, vec!["1", "3"]);
    }

    #[test]
    fn test_context_line_format() {
        let messages = vec![
            msg("u1", Sender::User, "I live in Pune"),
            msg("t1", Sender::Team, "Got it"),
        ];
        let text = PromptBuilder::default().context_text(&messages);
        assert_eq!(text, "[u1] User: I live in Pune\n[t1] Team: Got it");
    }

    #[test]
    fn test_extraction_prompt_mentions_user_and_layers() {
        let messages = vec![msg("u1", Sender::User, "My name is Asha")];
        let prompt = PromptBuilder::default().extraction_prompt("asha_k", &messages);
        assert!(prompt.contains("TARGET USER: asha_k"));
        assert!(prompt.contains("[u1] User: My name is Asha"));
        for key in ["Layer1", "Layer2", "Layer3", "Layer4"] {
            assert!(prompt.contains(key));
        }
    }

    #[test]
    fn test_reprocess_prompt_is_narrowed() {
        let messages = vec![msg("u9", Sender::User, "I am allergic to peanuts")];
        let prompt =
            PromptBuilder::default().reprocess_prompt(&messages, Layer::Preferences, "allergy", 0.8);
        assert!(prompt.contains("LAYER 4"));
        assert!(prompt.contains("\"allergy\""));
        assert!(prompt.contains("0.8 or higher"));
        assert!(prompt.contains("\"Layer4\""));
        assert!(!prompt.contains("\"Layer1\""));
    }

    #[test]
    fn test_dedup_prompt_embeds_facts() {
        let mut facts = LayeredFacts::with_all_layers();
        facts.push(FactCandidate::new(
            Layer::Identity,
            "email",
            "asha@example.com",
            0.9,
            Evidence::new("m2", "mail me at asha@example.com"),
        ));
        let prompt = PromptBuilder::default().dedup_prompt("asha", &facts).unwrap();
        assert!(prompt.contains("\"type\": \"email\""));
        assert!(prompt.contains("\"snippet\": \"mail me at asha@example.com\""));
        assert!(prompt.contains("\"Layer3\": []"));
    }
}
