use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::domain::optimization::formulator::MAX_UTILIZATION_VAR;
use crate::domain::optimization::model::{OptimizationModel, VarId};
use crate::domain::optimization::solver::{OptimizationSolver, SolverOutcome};
use crate::domain::utils::id::{FlowId, LinkId, RouterId};
use crate::error::SolverError;

/// Always answers with the same outcome.
#[derive(Debug, Clone)]
pub struct CannedSolver {
    pub outcome: Result<SolverOutcome, SolverError>,
}

impl CannedSolver {
    pub fn infeasible(conflicting: &[&str]) -> Self {
        Self { outcome: Ok(SolverOutcome::Infeasible { conflicting: conflicting.iter().map(|c| c.to_string()).collect() }) }
    }

    pub fn failing(code: i64, message: &str) -> Self {
        Self { outcome: Err(SolverError::Backend { code, message: message.to_string() }) }
    }
}

impl OptimizationSolver for CannedSolver {
    fn name(&self) -> &'static str {
        "canned-mock"
    }

    fn solve(&self, _model: &OptimizationModel) -> Result<SolverOutcome, SolverError> {
        self.outcome.clone()
    }
}

/// Delegates to a closure.
pub struct FnSolver<F>
where
    F: Fn(&OptimizationModel) -> Result<SolverOutcome, SolverError> + Send + Sync,
{
    pub solve_fn: F,
}

impl<F> std::fmt::Debug for FnSolver<F>
where
    F: Fn(&OptimizationModel) -> Result<SolverOutcome, SolverError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FnSolver")
    }
}

impl<F> OptimizationSolver for FnSolver<F>
where
    F: Fn(&OptimizationModel) -> Result<SolverOutcome, SolverError> + Send + Sync,
{
    fn name(&self) -> &'static str {
        "fn-mock"
    }

    fn solve(&self, model: &OptimizationModel) -> Result<SolverOutcome, SolverError> {
        (self.solve_fn)(model)
    }
}

/// Produces a feasible but not optimal point.
///
/// Path-ratio models get an even split per flow. Edge-flow models route each flow's full demand
/// along the shortest path its variables allow. Utilization variables are then derived from their
/// defining constraints. If the point violates a constraint (typically a capacity row) the model
/// is reported infeasible with the violated rows as conflicting set.
#[derive(Debug, Clone, Default)]
pub struct FeasibleMockSolver;

impl OptimizationSolver for FeasibleMockSolver {
    fn name(&self) -> &'static str {
        "feasible-mock"
    }

    fn solve(&self, model: &OptimizationModel) -> Result<SolverOutcome, SolverError> {
        let mut values = vec![0.0; model.variables().len()];

        for split in model.constraints().iter().filter(|c| c.name.starts_with("split_")) {
            let share = 1.0 / split.expr.terms.len().max(1) as f64;
            for (var, _) in split.expr.terms.iter() {
                values[var.0] = share;
            }
        }

        route_edge_flows(model, &mut values);
        derive_utilization(model, &mut values);

        let conflicting = model.violated_constraints(&values, 1e-6);
        if !conflicting.is_empty() {
            return Ok(SolverOutcome::Infeasible { conflicting });
        }

        let objective = Some(model.objective().evaluate(&values));
        let values = model.variables().iter().zip(values).map(|(v, value)| (v.name.clone(), value)).collect();

        Ok(SolverOutcome::Optimal { objective, values })
    }
}

fn route_edge_flows(model: &OptimizationModel, values: &mut [f64]) {
    let mut edges: BTreeMap<FlowId, Vec<(LinkId, VarId)>> = BTreeMap::new();

    for (index, variable) in model.variables().iter().enumerate() {
        let Some((flow, link)) = variable.name.strip_prefix("f_").and_then(|rest| rest.split_once('|')) else {
            continue;
        };

        if let (Ok(flow), Ok(link)) = (flow.parse::<FlowId>(), link.parse::<LinkId>()) {
            edges.entry(flow).or_default().push((link, VarId(index)));
        }
    }

    for (flow, links) in edges.iter() {
        let demand = model.constraint(&format!("flow_{}|{}", flow, flow.start)).map(|c| c.rhs).unwrap_or(0.0);

        let mut adjacency: HashMap<&RouterId, Vec<(&RouterId, VarId)>> = HashMap::new();
        for (link, var) in links.iter() {
            adjacency.entry(&link.start).or_default().push((&link.end, *var));
        }

        let mut predecessor: HashMap<&RouterId, (&RouterId, VarId)> = HashMap::new();
        let mut visited: HashSet<&RouterId> = HashSet::from([&flow.start]);
        let mut queue: VecDeque<&RouterId> = VecDeque::from([&flow.start]);

        while let Some(router) = queue.pop_front() {
            for (next, var) in adjacency.get(router).into_iter().flatten() {
                if visited.insert(*next) {
                    predecessor.insert(*next, (router, *var));
                    queue.push_back(*next);
                }
            }
        }

        let mut current = &flow.end;
        while let Some((previous, var)) = predecessor.get(current) {
            values[var.0] += demand;
            current = *previous;
        }
    }
}

fn derive_utilization(model: &OptimizationModel, values: &mut [f64]) {
    let mut max_utilization: f64 = 0.0;

    for row in model.constraints().iter().filter(|c| c.name.starts_with("util_")) {
        let Some(u) = model.variable_id(&format!("u_{}", &row.name["util_".len()..])) else {
            continue;
        };

        let mut traffic = 0.0;
        let mut coefficient = 0.0;
        for (var, c) in row.expr.terms.iter() {
            if *var == u {
                coefficient += c;
            } else {
                traffic += c * values[var.0];
            }
        }

        if coefficient != 0.0 {
            values[u.0] = -traffic / coefficient;
            max_utilization = max_utilization.max(values[u.0]);
        }
    }

    if let Some(max) = model.variable_id(MAX_UTILIZATION_VAR) {
        values[max.0] = max_utilization;
    }
}
