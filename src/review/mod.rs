//! Review API
//!
//! HTTP surface for reviewers: browse extracted facts, approve or reject
//! them, trigger reprocessing of rejected facts and run the pipeline.

pub mod handler;
pub mod types;

pub use handler::{review_router, ReviewState};
pub use types::{ApiError, ConfidenceLevel, FactView};
