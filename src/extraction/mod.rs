//! Fact extraction
//!
//! Everything between a chunk of messages and a merged set of validated
//! candidates: prompt construction, the extraction service capability,
//! response parsing, validation and merging.

pub mod client;
pub mod merger;
pub mod parse;
pub mod prompt;
pub mod similarity;
pub mod testing;
pub mod types;
pub mod validator;

pub use client::{complete_with_timeout, AnthropicClient, ExtractionClient, ExtractionRequest};
pub use merger::merge;
pub use parse::{locate_json, parse_extraction, parse_lenient};
pub use prompt::{PromptBuilder, DEDUP_SYSTEM_PROMPT};
pub use similarity::{normalize_text, normalized_ratio, ratio};
pub use types::{Evidence, FactCandidate, Layer, LayeredFacts};
pub use validator::{is_bare_relation, is_contentless, ValidationStats, Validator};
