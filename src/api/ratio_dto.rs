use serde::{Deserialize, Serialize};

/// One row of a ratio table: `timestamp;flow;path;ratio`.
///
/// Written after a run and read back as external ratios for heuristic propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioRecordDto {
    pub timestamp: String,
    pub flow: String,
    pub path: String,
    pub ratio: f64,
}

/// One row of the per-bucket overview: `timestamp;model;min_util;max_util;avg_util`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewRecordDto {
    pub timestamp: String,
    pub model: String,
    pub min_util: f64,
    pub max_util: f64,
    pub avg_util: f64,
}
