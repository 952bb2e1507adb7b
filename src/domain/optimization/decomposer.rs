use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::domain::network::flow::Path;
use crate::domain::ratio::ratio_table::{RatioTable, normalize};
use crate::domain::utils::id::{FlowId, LinkId, RouterId};
use crate::error::FlowError;

pub const DEFAULT_SIGNIFICANCE: f64 = 0.001;

/// Residual amounts below this are treated as zero.
pub const DEFAULT_EPSILON: f64 = 1e-9;

/// Per-edge flow amounts of one flow, as returned by the edge-flow solver form.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeFlowSolution {
    pub flow: FlowId,
    pub demand: f64,
    pub edges: BTreeMap<LinkId, f64>,
}

impl EdgeFlowSolution {
    pub fn new(flow: FlowId, demand: f64, edges: BTreeMap<LinkId, f64>) -> Self {
        Self { flow, demand, edges }
    }

    /// Builds the edge flow implied by per-path ratios: `f(edge) = Σ demand · ratio(path)`.
    pub fn from_path_ratios(flow: FlowId, demand: f64, ratios: &BTreeMap<Path, f64>) -> Self {
        let mut edges: BTreeMap<LinkId, f64> = BTreeMap::new();

        for (path, ratio) in ratios.iter() {
            for link in path.links() {
                *edges.entry(link).or_insert(0.0) += demand * ratio;
            }
        }

        Self { flow, demand, edges }
    }
}

/// Residual flow graph: `start -> end -> amount`.
type Residual = BTreeMap<RouterId, BTreeMap<RouterId, f64>>;

/// Turns per-edge flow values back into per-path ratios.
///
/// Walks from the source along the largest residual edge until the sink is reached, records the
/// bottleneck amount for that path and subtracts it. A walk that returns to a router it already
/// visited cancels the circulating flow. Every step removes at least one edge from the residual
/// graph, so decomposition terminates on any input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowDecomposer {
    significance: f64,
    epsilon: f64,
}

impl Default for FlowDecomposer {
    fn default() -> Self {
        Self { significance: DEFAULT_SIGNIFICANCE, epsilon: DEFAULT_EPSILON }
    }
}

impl FlowDecomposer {
    pub fn new(significance: f64) -> Self {
        Self { significance, ..Default::default() }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn significance(&self) -> f64 {
        self.significance
    }

    /// Paths whose amount stays below `significance · demand` are dropped and the remaining ratios
    /// renormalized. The largest path always survives.
    pub fn decompose(&self, solution: &EdgeFlowSolution) -> Result<BTreeMap<Path, f64>, FlowError> {
        let amounts = self.extract_paths(solution);
        let total: f64 = amounts.values().sum();

        if total <= self.epsilon {
            return Err(FlowError::ZeroFlow { flow: solution.flow.clone(), demand: solution.demand });
        }

        let reference = if solution.demand > 0.0 { solution.demand } else { total };
        let cutoff = self.significance * reference;

        let mut significant: BTreeMap<Path, f64> = amounts.iter().filter(|(_, amount)| **amount >= cutoff).map(|(p, a)| (p.clone(), *a)).collect();

        if significant.is_empty() {
            if let Some((path, amount)) = amounts.iter().max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal)) {
                significant.insert(path.clone(), *amount);
            }
        }

        let dropped = amounts.len() - significant.len();
        if dropped > 0 {
            log::debug!("InsignificantPaths: Flow {} dropped {} of {} paths below {}.", solution.flow, dropped, amounts.len(), cutoff);
        }

        normalize(&significant).ok_or_else(|| FlowError::ZeroFlow { flow: solution.flow.clone(), demand: solution.demand })
    }

    /// Decomposes every solution. Flows that carry no flow are returned as errors next to the table.
    pub fn decompose_all(&self, solutions: &[EdgeFlowSolution]) -> (RatioTable, Vec<FlowError>) {
        let mut table = RatioTable::new();
        let mut errors = Vec::new();

        for solution in solutions {
            match self.decompose(solution) {
                Ok(ratios) => table.set_flow(solution.flow.clone(), ratios),
                Err(e) => {
                    log::warn!("{}", e);
                    errors.push(e);
                }
            }
        }

        (table, errors)
    }

    /// Raw path amounts before the significance cut.
    pub fn extract_paths(&self, solution: &EdgeFlowSolution) -> BTreeMap<Path, f64> {
        let source = &solution.flow.start;
        let sink = &solution.flow.end;

        let mut residual: Residual = BTreeMap::new();
        for (link, amount) in solution.edges.iter() {
            if *amount > self.epsilon && !link.is_self_loop() {
                residual.entry(link.start.clone()).or_default().insert(link.end.clone(), *amount);
            }
        }

        let mut amounts: BTreeMap<Path, f64> = BTreeMap::new();

        if source == sink {
            return amounts;
        }

        'extraction: loop {
            let mut walk: Vec<RouterId> = vec![source.clone()];
            let mut position: HashMap<RouterId, usize> = HashMap::from([(source.clone(), 0)]);

            while walk.last() != Some(sink) {
                let Some(current) = walk.last().cloned() else {
                    break 'extraction;
                };

                let Some(next) = self.largest_edge(&residual, &current) else {
                    // Dead end. Drop the edge that led here; at the source nothing is left to extract.
                    if walk.len() < 2 {
                        break 'extraction;
                    }
                    let previous = walk[walk.len() - 2].clone();
                    remove_edge(&mut residual, &previous, &current);
                    continue 'extraction;
                };

                if let Some(&start) = position.get(&next) {
                    let mut cycle: Vec<RouterId> = walk[start..].to_vec();
                    cycle.push(next.clone());
                    let cancelled = self.subtract_bottleneck(&mut residual, &cycle);
                    log::debug!("CycleCancelled: Flow {} removed {} circulating through {}.", solution.flow, cancelled, next);

                    for router in walk.drain(start + 1..) {
                        position.remove(&router);
                    }
                    continue;
                }

                position.insert(next.clone(), walk.len());
                walk.push(next);
            }

            let amount = self.subtract_bottleneck(&mut residual, &walk);
            *amounts.entry(Path::new(walk)).or_insert(0.0) += amount;
        }

        amounts
    }

    fn largest_edge(&self, residual: &Residual, from: &RouterId) -> Option<RouterId> {
        residual
            .get(from)?
            .iter()
            .filter(|(_, amount)| **amount > self.epsilon)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal).then_with(|| b.0.cmp(a.0)))
            .map(|(router, _)| router.clone())
    }

    /// Subtracts the minimum residual along `routers` from every edge on it. The minimum edge is
    /// removed outright.
    fn subtract_bottleneck(&self, residual: &mut Residual, routers: &[RouterId]) -> f64 {
        let mut bottleneck = f64::INFINITY;
        let mut argmin = 0;

        for (index, pair) in routers.windows(2).enumerate() {
            let amount = edge_amount(residual, &pair[0], &pair[1]);
            if amount < bottleneck {
                bottleneck = amount;
                argmin = index;
            }
        }

        if !bottleneck.is_finite() {
            return 0.0;
        }

        for (index, pair) in routers.windows(2).enumerate() {
            if index == argmin {
                remove_edge(residual, &pair[0], &pair[1]);
                continue;
            }

            if let Some(amount) = residual.get_mut(&pair[0]).and_then(|edges| edges.get_mut(&pair[1])) {
                *amount -= bottleneck;
                if *amount <= self.epsilon {
                    remove_edge(residual, &pair[0], &pair[1]);
                }
            }
        }

        bottleneck
    }
}

fn edge_amount(residual: &Residual, from: &RouterId, to: &RouterId) -> f64 {
    residual.get(from).and_then(|edges| edges.get(to)).copied().unwrap_or(0.0)
}

fn remove_edge(residual: &mut Residual, from: &RouterId, to: &RouterId) {
    if let Some(edges) = residual.get_mut(from) {
        edges.remove(to);
        if edges.is_empty() {
            residual.remove(from);
        }
    }
}
