//! Merger
//!
//! Concatenates validated chunk results per layer, in chunk order and then
//! within-chunk order. The output always carries all four layer keys.

use super::types::LayeredFacts;

/// Accumulate validated chunk results
pub fn merge(results: impl IntoIterator<Item = LayeredFacts>) -> LayeredFacts {
    let mut merged = LayeredFacts::with_all_layers();
    for result in results {
        for (layer, candidates) in result {
            merged.ensure_layer(layer).extend(candidates);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::{Evidence, FactCandidate, Layer};

    fn fact(layer: Layer, value: &str) -> FactCandidate {
        FactCandidate::new(layer, "habit", value, 0.9, Evidence::new("m", value))
    }

    #[test]
    fn test_merge_preserves_order_and_keys() {
        let mut first = LayeredFacts::new();
        first.push(fact(Layer::Preferences, "a"));
        first.push(fact(Layer::Preferences, "b"));
        let mut second = LayeredFacts::new();
        second.push(fact(Layer::Preferences, "c"));
        second.push(fact(Layer::Identity, "d"));

        let merged = merge(vec![first, second]);
        assert_eq!(merged.layer_keys().len(), 4);
        let values: Vec<_> = merged
            .get(Layer::Preferences)
            .unwrap()
            .iter()
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(values, vec!["a", "b", "c"]);
        assert_eq!(merged.total(), 4);
    }

    #[test]
    fn test_merge_keeps_duplicates() {
        let mut one = LayeredFacts::new();
        one.push(fact(Layer::Identity, "x"));
        let merged = merge(vec![one.clone(), one]);
        assert_eq!(merged.get(Layer::Identity).unwrap().len(), 2);
    }

    #[test]
    fn test_merge_nothing() {
        let merged = merge(Vec::new());
        assert!(merged.is_empty());
        assert_eq!(merged.layer_keys().len(), 4);
    }
}
