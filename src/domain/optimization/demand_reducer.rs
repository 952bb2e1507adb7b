use std::cmp::Ordering;

use crate::domain::network::flow::Flow;
use crate::domain::utils::id::FlowId;
use crate::error::Error;

/// Outcome of demand thresholding for one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    /// Significant flows, largest demand first.
    pub kept: Vec<FlowId>,

    /// Flows left out of the solver model.
    pub omitted: Vec<FlowId>,

    pub kept_demand: f64,
    pub omitted_demand: f64,
}

impl Reduction {
    pub fn total_demand(&self) -> f64 {
        self.kept_demand + self.omitted_demand
    }

    /// Fraction of the total demand covered by the kept flows.
    pub fn coverage(&self) -> f64 {
        let total = self.total_demand();
        if total > 0.0 { self.kept_demand / total } else { 1.0 }
    }
}

/// Keeps the largest flows until their cumulative demand reaches `threshold` of the total.
///
/// The kept set always contains the largest flow and never shrinks when the threshold grows.
/// A threshold of `1.0` keeps every flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandReducer {
    threshold: f64,
}

impl DemandReducer {
    pub fn new(threshold: f64) -> Result<Self, Error> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::ConfigError(format!("demand threshold must lie in (0, 1], got {}", threshold)));
        }

        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn reduce<'f, I>(&self, flows: I) -> Reduction
    where
        I: IntoIterator<Item = &'f Flow>,
    {
        Self::reduce_demands(self.threshold, flows.into_iter().map(|f| (&f.id, f.demand)))
    }

    pub fn reduce_demands<'f, I>(threshold: f64, demands: I) -> Reduction
    where
        I: IntoIterator<Item = (&'f FlowId, f64)>,
    {
        let sorted = Self::sorted_by_demand(demands);
        let total: f64 = sorted.iter().map(|(_, d)| d).sum();
        let keep = Self::prefix_length(&sorted, threshold, total);

        let mut reduction = Reduction { kept: Vec::with_capacity(keep), omitted: Vec::new(), kept_demand: 0.0, omitted_demand: 0.0 };

        for (index, (flow, demand)) in sorted.into_iter().enumerate() {
            if index < keep {
                reduction.kept.push(flow.clone());
                reduction.kept_demand += demand;
            } else {
                reduction.omitted.push(flow.clone());
                reduction.omitted_demand += demand;
            }
        }

        reduction
    }

    /// For each percentage, how many of the largest flows are needed to cover it.
    pub fn coverage_table(flows: &[Flow], percentages: &[f64]) -> Vec<(f64, usize)> {
        let sorted = Self::sorted_by_demand(flows.iter().map(|f| (&f.id, f.demand)));
        let total: f64 = sorted.iter().map(|(_, d)| d).sum();

        percentages.iter().map(|p| (*p, Self::prefix_length(&sorted, p / 100.0, total))).collect()
    }

    /// Largest demand first, ties broken by flow id so the result is deterministic.
    fn sorted_by_demand<'f, I>(demands: I) -> Vec<(&'f FlowId, f64)>
    where
        I: IntoIterator<Item = (&'f FlowId, f64)>,
    {
        let mut sorted: Vec<(&FlowId, f64)> = demands.into_iter().map(|(f, d)| (f, if d.is_finite() { d.max(0.0) } else { 0.0 })).collect();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(b.0)));
        sorted
    }

    fn prefix_length(sorted: &[(&FlowId, f64)], threshold: f64, total: f64) -> usize {
        if sorted.is_empty() {
            return 0;
        }

        // Accumulated floating point sums can fall just short of the total.
        if threshold >= 1.0 {
            return sorted.len();
        }

        let cutoff = threshold * total;
        let mut cumulative = 0.0;

        for (index, (_, demand)) in sorted.iter().enumerate() {
            cumulative += demand;
            if cumulative >= cutoff {
                return index + 1;
            }
        }

        sorted.len()
    }
}
