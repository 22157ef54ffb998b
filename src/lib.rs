//! factkeeper - Curated personal-fact extraction from chat transcripts
//!
//! factkeeper turns one user's support-chat transcript into a reviewed set
//! of personal facts: who they are, which documents they shared, who they
//! are related to and what they prefer. An external language model does
//! the reading; everything around it is deterministic policy.
//!
//! ## Architecture
//!
//! ```text
//! conversation export (JSON)
//!          │
//!          ▼
//! ┌──────────────────┐   ┌──────────────────┐
//! │    Normalizer    │──▶│     Chunker      │   transcript
//! └──────────────────┘   └────────┬─────────┘
//!                                 │ one chunk at a time
//!          ┌──────────────────────▼──────────────────────┐
//!          │ Prompt Builder ─▶ extraction call ─▶ parse  │   extraction
//!          │                 ─▶ Validator                │
//!          └──────────────────────┬──────────────────────┘
//!                                 ▼
//!                           ┌──────────┐
//!                           │  Merger  │
//!                           └────┬─────┘
//!                                ▼
//!          ┌─────────────────────────────────────────────┐
//!          │ Deduplicator: Tier A (LLM) ─▶ Tier B (rules)│   dedup
//!          └──────────────────────┬──────────────────────┘
//!                                 ▼
//!          ┌─────────────────────────────────────────────┐
//!          │ Persistence Adapter ─▶ Fact Store + marker  │   pipeline, store
//!          └──────────────────────┬──────────────────────┘
//!                                 ▼
//!                  review API ─▶ reject ─▶ Reprocessor
//! ```
//!
//! ## Modules
//!
//! - [`transcript`]: input documents, normalization, chunking, sources
//! - [`extraction`]: fact types, prompts, parsing, client, validation, merging
//! - [`dedup`]: two-tier deduplication
//! - [`store`]: fact store capability and implementations
//! - [`pipeline`]: end-to-end processing, reprocessing, batch runs
//! - [`review`]: HTTP review surface
//! - [`api`]: merged router with health probe and CORS
//! - [`config`]: configuration management

pub mod api;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extraction;
pub mod pipeline;
pub mod review;
pub mod store;
pub mod transcript;

pub use config::FactKeeperConfig;
pub use error::{Error, Result};
