use std::collections::BTreeMap;

use crate::domain::network::flow::Path;
use crate::domain::utils::id::FlowId;

/// Relative tolerance for the "ratios of a flow sum to one" invariant.
pub const RATIO_SUM_TOLERANCE: f64 = 1e-6;

/// Per-(flow, path) traffic ratios.
///
/// Written by the heuristic, by the path-ratio solver form and by the flow decomposer. A table
/// from an earlier run can be fed back into the heuristic as external ratios.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatioTable {
    entries: BTreeMap<FlowId, BTreeMap<Path, f64>>,
}

impl RatioTable {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// Adds `ratio` to the entry of `(flow, path)`.
    pub fn insert(&mut self, flow: FlowId, path: Path, ratio: f64) {
        *self.entries.entry(flow).or_default().entry(path).or_insert(0.0) += ratio;
    }

    pub fn set_flow(&mut self, flow: FlowId, ratios: BTreeMap<Path, f64>) {
        self.entries.insert(flow, ratios);
    }

    pub fn flow(&self, flow: &FlowId) -> Option<&BTreeMap<Path, f64>> {
        self.entries.get(flow)
    }

    pub fn ratio(&self, flow: &FlowId, path: &Path) -> Option<f64> {
        self.entries.get(flow).and_then(|paths| paths.get(path)).copied()
    }

    pub fn flows(&self) -> impl Iterator<Item = &FlowId> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&FlowId, &BTreeMap<Path, f64>)> {
        self.entries.iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlowId, &Path, f64)> {
        self.entries.iter().flat_map(|(flow, paths)| paths.iter().map(move |(path, ratio)| (flow, path, *ratio)))
    }

    pub fn flow_count(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|p| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove_flow(&mut self, flow: &FlowId) -> Option<BTreeMap<Path, f64>> {
        self.entries.remove(flow)
    }

    pub fn extend(&mut self, other: RatioTable) {
        for (flow, paths) in other.entries {
            self.entries.insert(flow, paths);
        }
    }

    pub fn ratio_sum(&self, flow: &FlowId) -> f64 {
        self.entries.get(flow).map(|paths| paths.values().sum()).unwrap_or(0.0)
    }

    /// Whether every flow's ratios sum to one within [`RATIO_SUM_TOLERANCE`].
    pub fn is_normalized(&self) -> bool {
        self.entries.keys().all(|flow| (self.ratio_sum(flow) - 1.0).abs() <= RATIO_SUM_TOLERANCE)
    }
}

/// Scales `amounts` so they sum to one. Returns `None` if the total is not positive.
pub fn normalize(amounts: &BTreeMap<Path, f64>) -> Option<BTreeMap<Path, f64>> {
    let total: f64 = amounts.values().sum();

    if !(total.is_finite() && total > 0.0) {
        return None;
    }

    Some(amounts.iter().map(|(path, amount)| (path.clone(), amount / total)).collect())
}
