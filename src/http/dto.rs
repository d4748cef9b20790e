//! Request and response bodies that only exist at the HTTP boundary.

use serde::{Deserialize, Serialize};

pub use crate::advisory::AdvisoryInput;
pub use crate::analysis::{AnalysisReport, PlacementRequest};

use super::error::ApiError;
use crate::types::{ObstacleLabel, PlacementError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Obstacle classes the configured detectors cover.
    pub detectors: Vec<ObstacleLabel>,
    pub advisor: bool,
}

/// One entry of a batch response: `{"ok": report}` or `{"error": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchItem {
    Ok(AnalysisReport),
    Error(ApiError),
}

impl From<Result<AnalysisReport, PlacementError>> for BatchItem {
    fn from(result: Result<AnalysisReport, PlacementError>) -> Self {
        match result {
            Ok(report) => BatchItem::Ok(report),
            Err(e) => BatchItem::Error(ApiError::from(&e)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub recommendation: String,
}
