//! Review API request and response types

use crate::error::Error;
use crate::store::FactRecord;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Reviewer-facing confidence band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// `high` from 0.9, `medium` from 0.7, `low` below
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            Self::High
        } else if confidence >= 0.7 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A fact as shown to reviewers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactView {
    #[serde(flatten)]
    pub record: FactRecord,
    pub confidence_level: ConfidenceLevel,
}

impl From<FactRecord> for FactView {
    fn from(record: FactRecord) -> Self {
        let confidence_level = ConfidenceLevel::from_confidence(record.confidence);
        Self {
            record,
            confidence_level,
        }
    }
}

/// Body of approve / reject requests
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    #[serde(default)]
    pub reviewed_by: Option<String>,
}

/// Body of a batch processing request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchRequest {
    /// Users to process; every known user when absent
    #[serde(default)]
    pub users: Option<Vec<String>>,
}

/// `?layer=` filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayerParams {
    pub layer: Option<String>,
}

/// `?limit=&layer=` filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingParams {
    pub limit: Option<usize>,
    pub layer: Option<String>,
}

/// `?limit=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

/// `?force=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForceParams {
    #[serde(default)]
    pub force: bool,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

/// API error detail
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl From<&Error> for ApiError {
    fn from(err: &Error) -> Self {
        match err {
            Error::NotFound(_) => Self::not_found(err.to_string()),
            Error::Config(_) | Error::Transcript(_) => Self::bad_request(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

/// HTTP status for a crate error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Config(_) | Error::Transcript(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_levels() {
        assert_eq!(ConfidenceLevel::from_confidence(0.95), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(0.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(0.75), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.5), ConfidenceLevel::Low);
    }

    #[test]
    fn test_api_error_from_crate_error() {
        let err = Error::NotFound("fact abc".to_string());
        let api = ApiError::from(&err);
        assert_eq!(api.error.code, "NOT_FOUND");
        assert_eq!(status_for(&err), StatusCode::NOT_FOUND);

        let err = Error::Config("unknown layer 'Layer9'".to_string());
        assert_eq!(ApiError::from(&err).error.code, "BAD_REQUEST");

        let err = Error::Store("disk full".to_string());
        let json = serde_json::to_value(ApiError::from(&err)).unwrap();
        assert_eq!(json["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(json["error"]["message"], "Store error: disk full");
    }
}
