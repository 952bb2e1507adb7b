use serde::Deserialize;
use std::collections::BTreeMap;

/// One time bucket as it arrives from ingestion.
///
/// Both maps are keyed by flow id (`source;dest`). Paths are router sequences rendered as `A;B;C`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketDto {
    pub timestamp: String,
    pub demands: BTreeMap<String, f64>,
    #[serde(default)]
    pub paths: BTreeMap<String, Vec<String>>,
}
