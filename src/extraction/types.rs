//! Fact candidate data types
//!
//! A `FactCandidate` is an extracted, not-yet-persisted fact. Candidates are
//! grouped per memory layer in `LayeredFacts`, which distinguishes a layer
//! key that is present but empty from one that is absent; the deduplication
//! acceptance check depends on that difference.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// One of the four fixed fact categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    /// Identity and contact details, including work address
    Identity,
    /// Government IDs, certificates, financial documents
    Documents,
    /// Named relations only
    Relations,
    /// Preferences, vendors, routines
    Preferences,
}

impl Layer {
    /// All layers in processing order
    pub const ALL: [Layer; 4] = [
        Layer::Identity,
        Layer::Documents,
        Layer::Relations,
        Layer::Preferences,
    ];

    /// Layer number (1-4)
    pub fn number(self) -> u8 {
        match self {
            Layer::Identity => 1,
            Layer::Documents => 2,
            Layer::Relations => 3,
            Layer::Preferences => 4,
        }
    }

    /// Layer from its number
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Layer::Identity),
            2 => Some(Layer::Documents),
            3 => Some(Layer::Relations),
            4 => Some(Layer::Preferences),
            _ => None,
        }
    }

    /// Key used in extraction responses (`Layer1` .. `Layer4`)
    pub fn key(self) -> &'static str {
        match self {
            Layer::Identity => "Layer1",
            Layer::Documents => "Layer2",
            Layer::Relations => "Layer3",
            Layer::Preferences => "Layer4",
        }
    }

    /// Short human description, embedded in narrowed prompts
    pub fn description(self) -> &'static str {
        match self {
            Layer::Identity => "Basic Personal Information (name, age, date of birth, nationality, gender, blood group, phone, email, home and work address, relationship status, occupation, company)",
            Layer::Documents => "Information from Documents Shared (Aadhaar, PAN, driving license, voter ID, passport, birth certificate, insurance, rent agreement, bank and card details)",
            Layer::Relations => "Loved Ones & Relations (named family members, friends, colleagues, partners and their contact details)",
            Layer::Preferences => "Preferences, Vendors, Standing Instructions (food preferences, allergies, favourite restaurants, service providers, habits, routines, long-term travel preferences)",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Layer {
    type Err = Error;

    /// Accepts `Layer1`, `layer1`, `layer_1` and `1`
    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let digits = lowered
            .strip_prefix("layer")
            .unwrap_or(&lowered)
            .trim_start_matches('_');
        digits
            .parse::<u8>()
            .ok()
            .and_then(Layer::from_number)
            .ok_or_else(|| Error::Config(format!("unknown layer '{s}'")))
    }
}

impl Serialize for Layer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Layer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u8),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Layer::from_number(n)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown layer {n}"))),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A message reference supporting a fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub message_id: String,
    #[serde(alias = "message_snippet")]
    pub snippet: String,
}

impl Evidence {
    pub fn new(message_id: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            snippet: snippet.into(),
        }
    }
}

/// An extracted fact awaiting validation, deduplication and persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCandidate {
    pub layer: Layer,
    pub fact_type: String,
    pub value: String,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl FactCandidate {
    /// Candidate with a single evidence entry
    pub fn new(
        layer: Layer,
        fact_type: impl Into<String>,
        value: impl Into<String>,
        confidence: f64,
        evidence: Evidence,
    ) -> Self {
        Self {
            layer,
            fact_type: fact_type.into(),
            value: value.into(),
            confidence,
            evidence: vec![evidence],
            ownership_reason: None,
            timestamp: None,
        }
    }
}

/// Candidates grouped per layer, in a stable layer order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayeredFacts(BTreeMap<Layer, Vec<FactCandidate>>);

impl LayeredFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four layer keys present, each empty
    pub fn with_all_layers() -> Self {
        Self(Layer::ALL.iter().map(|l| (*l, Vec::new())).collect())
    }

    /// Ensure a layer key is present
    pub fn ensure_layer(&mut self, layer: Layer) -> &mut Vec<FactCandidate> {
        self.0.entry(layer).or_default()
    }

    /// Append a candidate to the bucket for its own layer
    pub fn push(&mut self, candidate: FactCandidate) {
        self.0.entry(candidate.layer).or_default().push(candidate);
    }

    /// Candidates in one layer (None if the key is absent)
    pub fn get(&self, layer: Layer) -> Option<&[FactCandidate]> {
        self.0.get(&layer).map(Vec::as_slice)
    }

    /// Layer keys present, including empty ones
    pub fn layer_keys(&self) -> BTreeSet<Layer> {
        self.0.keys().copied().collect()
    }

    /// Total number of candidates across layers
    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Whether there are no candidates at all (keys may still be present)
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Drop layer keys that hold no candidates
    pub fn without_empty_layers(mut self) -> Self {
        self.0.retain(|_, v| !v.is_empty());
        self
    }

    /// Iterate layers in order
    pub fn iter(&self) -> impl Iterator<Item = (Layer, &[FactCandidate])> {
        self.0.iter().map(|(l, v)| (*l, v.as_slice()))
    }

    /// Iterate all candidates in layer order
    pub fn candidates(&self) -> impl Iterator<Item = &FactCandidate> {
        self.0.values().flatten()
    }

    /// Per-layer counts keyed by layer name
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.0
            .iter()
            .map(|(l, v)| (l.key().to_string(), v.len()))
            .collect()
    }

    /// Remove and return one layer's bucket
    pub fn take(&mut self, layer: Layer) -> Option<Vec<FactCandidate>> {
        self.0.remove(&layer)
    }
}

impl IntoIterator for LayeredFacts {
    type Item = (Layer, Vec<FactCandidate>);
    type IntoIter = std::collections::btree_map::IntoIter<Layer, Vec<FactCandidate>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(Layer, Vec<FactCandidate>)> for LayeredFacts {
    fn from_iter<I: IntoIterator<Item = (Layer, Vec<FactCandidate>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_parse_forms() {
        assert_eq!("Layer1".parse::<Layer>().unwrap(), Layer::Identity);
        assert_eq!("layer_3".parse::<Layer>().unwrap(), Layer::Relations);
        assert_eq!("4".parse::<Layer>().unwrap(), Layer::Preferences);
        assert!("Layer5".parse::<Layer>().is_err());
        assert!("identity".parse::<Layer>().is_err());
    }

    #[test]
    fn test_layer_serde() {
        assert_eq!(serde_json::to_string(&Layer::Documents).unwrap(), "\"Layer2\"");
        let from_number: Layer = serde_json::from_str("2").unwrap();
        assert_eq!(from_number, Layer::Documents);
        let from_text: Layer = serde_json::from_str("\"Layer2\"").unwrap();
        assert_eq!(from_text, Layer::Documents);
    }

    #[test]
    fn test_layered_facts_keys_and_totals() {
        let mut facts = LayeredFacts::with_all_layers();
        assert_eq!(facts.layer_keys().len(), 4);
        assert!(facts.is_empty());

        facts.push(FactCandidate::new(
            Layer::Identity,
            "name",
            "Asha",
            0.9,
            Evidence::new("m1", "my name is Asha"),
        ));
        assert_eq!(facts.total(), 1);

        let trimmed = facts.without_empty_layers();
        assert_eq!(trimmed.layer_keys(), [Layer::Identity].into_iter().collect());
    }

    #[test]
    fn test_evidence_accepts_message_snippet_alias() {
        let ev: Evidence =
            serde_json::from_str(r#"{"message_id": "m1", "message_snippet": "hello"}"#).unwrap();
        assert_eq!(ev.snippet, "hello");
    }
}
