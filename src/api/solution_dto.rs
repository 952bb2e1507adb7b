use serde::Deserialize;
use std::collections::HashMap;

/// Solution document produced by an external solver for one exported model.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SolutionDto {
    Optimal {
        #[serde(default)]
        objective: Option<f64>,
        values: HashMap<String, f64>,
    },
    Infeasible {
        #[serde(default)]
        conflicting: Vec<String>,
    },
    Error {
        code: i64,
        #[serde(default)]
        message: String,
    },
}
