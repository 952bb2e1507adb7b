use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::network::flow::{Flow, Path};
use crate::domain::network::topology::TopologyStore;
use crate::domain::optimization::decomposer::EdgeFlowSolution;
use crate::domain::optimization::model::{LinearExpr, Objective, ObjectiveState, OptimizationModel, Sense, UtilizationObjective, VarId};
use crate::domain::ratio::ratio_table::{RatioTable, normalize};
use crate::domain::utils::id::{FlowId, LinkId, RouterId};
use crate::error::{FlowError, SolverError};

pub const MAX_UTILIZATION_VAR: &str = "max_util";

pub fn ratio_var_name(flow: &FlowId, path: &Path) -> String {
    format!("r_{}|{}", flow, path)
}

pub fn edge_var_name(flow: &FlowId, link: &LinkId) -> String {
    format!("f_{}|{}", flow, link)
}

pub fn utilization_var_name(link: &LinkId) -> String {
    format!("u_{}", link)
}

/// Path-ratio form: one ratio variable per (flow, candidate path).
#[derive(Debug, Clone)]
pub struct PathRatioProblem {
    pub model: OptimizationModel,
    pub ratio_vars: BTreeMap<FlowId, Vec<(Path, VarId)>>,
    pub utilization_vars: BTreeMap<LinkId, VarId>,
    pub objective: ObjectiveState,
}

impl PathRatioProblem {
    /// Reads the per-path ratios of every flow back from a solver assignment.
    ///
    /// Values are clamped to `[0, 1]` and renormalized per flow to absorb solver tolerance.
    pub fn ratios(&self, values: &HashMap<String, f64>) -> Result<RatioTable, SolverError> {
        let mut table = RatioTable::new();

        for (flow, paths) in self.ratio_vars.iter() {
            let mut raw: BTreeMap<Path, f64> = BTreeMap::new();

            for (path, var) in paths.iter() {
                let value = lookup(&self.model, *var, values)?;
                raw.insert(path.clone(), value.clamp(0.0, 1.0));
            }

            let ratios = normalize(&raw).ok_or_else(|| SolverError::IncompleteSolution(format!("split_{}", flow)))?;
            table.set_flow(flow.clone(), ratios);
        }

        Ok(table)
    }
}

/// Multi-commodity edge-flow form: one flow variable per (flow, link).
#[derive(Debug, Clone)]
pub struct EdgeFlowProblem {
    pub model: OptimizationModel,
    pub edge_vars: BTreeMap<FlowId, BTreeMap<LinkId, VarId>>,
    pub utilization_vars: BTreeMap<LinkId, VarId>,
    pub objective: ObjectiveState,
    pub demands: BTreeMap<FlowId, f64>,

    /// Flows whose sink is not reachable from their source. They are not part of the model.
    pub unroutable: Vec<FlowError>,
}

impl EdgeFlowProblem {
    /// Reads the per-edge flow amounts of every flow back from a solver assignment.
    pub fn edge_flows(&self, values: &HashMap<String, f64>) -> Result<Vec<EdgeFlowSolution>, SolverError> {
        let mut solutions = Vec::with_capacity(self.edge_vars.len());

        for (flow, edges) in self.edge_vars.iter() {
            let mut amounts = BTreeMap::new();

            for (link, var) in edges.iter() {
                let value = lookup(&self.model, *var, values)?;
                if value > 0.0 {
                    amounts.insert(link.clone(), value);
                }
            }

            let demand = self.demands.get(flow).copied().unwrap_or(0.0);
            solutions.push(EdgeFlowSolution::new(flow.clone(), demand, amounts));
        }

        Ok(solutions)
    }
}

fn lookup(model: &OptimizationModel, var: VarId, values: &HashMap<String, f64>) -> Result<f64, SolverError> {
    let name = model.variable(var).map(|v| v.name.as_str()).unwrap_or_default();
    values.get(name).copied().ok_or_else(|| SolverError::IncompleteSolution(name.to_string()))
}

/// Builds solver-agnostic models for the ratio-assignment problem.
///
/// Capacities come from the topology; links that flows use but the topology does not list get
/// the default capacity. Utilization variables are fractions of capacity.
#[derive(Debug, Clone, Copy)]
pub struct ProblemFormulator<'a> {
    topology: &'a TopologyStore,
    objective: UtilizationObjective,
}

impl<'a> ProblemFormulator<'a> {
    pub fn new(topology: &'a TopologyStore, objective: UtilizationObjective) -> Self {
        Self { topology, objective }
    }

    pub fn objective(&self) -> UtilizationObjective {
        self.objective
    }

    /// `flows` must already be validated; paths are deduplicated per flow.
    pub fn path_ratio_form(&self, name: &str, flows: &[&Flow]) -> PathRatioProblem {
        let mut model = OptimizationModel::new(name);
        let mut ratio_vars: BTreeMap<FlowId, Vec<(Path, VarId)>> = BTreeMap::new();
        let mut link_terms: BTreeMap<LinkId, LinearExpr> = BTreeMap::new();

        for flow in flows.iter() {
            let paths: BTreeSet<&Path> = flow.paths.iter().collect();
            let mut split = LinearExpr::new();
            let mut vars = Vec::with_capacity(paths.len());

            for path in paths {
                let var = model.add_variable(ratio_var_name(&flow.id, path), 0.0, Some(1.0));
                split.add(var, 1.0);
                vars.push((path.clone(), var));

                for link in path.links() {
                    link_terms.entry(link).or_default().add(var, flow.demand);
                }
            }

            model.add_constraint(format!("split_{}", flow.id), split, Sense::Equal, 1.0);
            ratio_vars.insert(flow.id.clone(), vars);
        }

        let (utilization_vars, objective) = self.link_constraints(&mut model, link_terms);

        log::debug!(
            "PathRatioForm: Model {} has {} flows, {} variables and {} constraints.",
            name,
            ratio_vars.len(),
            model.variables().len(),
            model.constraints().len()
        );

        PathRatioProblem { model, ratio_vars, utilization_vars, objective }
    }

    /// Builds the edge-flow form over every topology link plus every link named by a candidate path.
    ///
    /// With `prune`, a flow only gets variables on links that lie between its source and its sink
    /// in the directed link graph. Flows whose sink cannot be reached are reported as unroutable.
    pub fn edge_flow_form(&self, name: &str, flows: &[&Flow], prune: bool) -> EdgeFlowProblem {
        let mut model = OptimizationModel::new(name);
        let network = self.link_graph(flows);
        let universe: Vec<&LinkId> = network.links().map(|link| &link.id).collect();

        let mut edge_vars: BTreeMap<FlowId, BTreeMap<LinkId, VarId>> = BTreeMap::new();
        let mut demands: BTreeMap<FlowId, f64> = BTreeMap::new();
        let mut unroutable = Vec::new();
        let mut link_terms: BTreeMap<LinkId, LinearExpr> = BTreeMap::new();

        for flow in flows.iter() {
            let source = &flow.id.start;
            let sink = &flow.id.end;

            let forward = network.reachable_from(source);
            if !forward.contains(sink) {
                log::warn!("UnroutableFlow: Sink of flow {} is not reachable from its source, flow is excluded from the model.", flow.id);
                unroutable.push(FlowError::Unroutable(flow.id.clone()));
                continue;
            }

            let backward = if prune { Some(network.reaching(sink)) } else { None };

            let usable: Vec<&LinkId> = universe
                .iter()
                .copied()
                .filter(|link| match &backward {
                    Some(backward) => forward.contains(&link.start) && backward.contains(&link.end),
                    None => true,
                })
                .collect();

            let mut vars = BTreeMap::new();
            let mut balance: BTreeMap<&RouterId, LinearExpr> = BTreeMap::new();

            for link in usable {
                let var = model.add_variable(edge_var_name(&flow.id, link), 0.0, None);
                vars.insert(link.clone(), var);
                link_terms.entry(link.clone()).or_default().add(var, 1.0);

                balance.entry(&link.start).or_default().add(var, 1.0);
                balance.entry(&link.end).or_default().add(var, -1.0);
            }

            balance.entry(source).or_default();
            balance.entry(sink).or_default();

            for (node, expr) in balance {
                let rhs = if node == source {
                    flow.demand
                } else if node == sink {
                    -flow.demand
                } else {
                    0.0
                };
                model.add_constraint(format!("flow_{}|{}", flow.id, node), expr, Sense::Equal, rhs);
            }

            if prune {
                log::debug!("ReachabilityPruning: Flow {} keeps {} of {} links.", flow.id, vars.len(), universe.len());
            }

            edge_vars.insert(flow.id.clone(), vars);
            demands.insert(flow.id.clone(), flow.demand);
        }

        let (utilization_vars, objective) = self.link_constraints(&mut model, link_terms);

        EdgeFlowProblem { model, edge_vars, utilization_vars, objective, demands, unroutable }
    }

    /// Adds capacity and utilization constraints for every used link and sets the objective.
    ///
    /// `link_terms` maps each link to the expression of the traffic it carries.
    fn link_constraints(&self, model: &mut OptimizationModel, link_terms: BTreeMap<LinkId, LinearExpr>) -> (BTreeMap<LinkId, VarId>, ObjectiveState) {
        let mut utilization_vars = BTreeMap::new();

        for (link, traffic) in link_terms {
            let (capacity, _) = self.topology.capacity_or_default(&link);
            let u = model.add_variable(utilization_var_name(&link), 0.0, None);

            model.add_constraint(format!("cap_{}", link), traffic.clone(), Sense::LessEqual, capacity);
            model.add_constraint(format!("util_{}", link), traffic.with(u, -capacity), Sense::Equal, 0.0);

            utilization_vars.insert(link, u);
        }

        let state = match self.objective {
            UtilizationObjective::Average => {
                model.set_objective(Objective { linear: utilization_vars.values().map(|u| (*u, 1.0)).collect(), quadratic: Vec::new() });
                ObjectiveState::Average
            }
            UtilizationObjective::Max => {
                let max_utilization = model.add_variable(MAX_UTILIZATION_VAR, 0.0, None);

                for (link, u) in utilization_vars.iter() {
                    let expr = LinearExpr::new().with(*u, 1.0).with(max_utilization, -1.0);
                    model.add_constraint(format!("max_{}", link), expr, Sense::LessEqual, 0.0);
                }

                model.set_objective(Objective { linear: vec![(max_utilization, 1.0)], quadratic: Vec::new() });
                ObjectiveState::Max { max_utilization }
            }
            UtilizationObjective::Squared => {
                model.set_objective(Objective { linear: Vec::new(), quadratic: utilization_vars.values().map(|u| (*u, 1.0)).collect() });
                ObjectiveState::Squared
            }
        };

        (utilization_vars, state)
    }

    /// The topology plus every link named by a candidate path.
    fn link_graph(&self, flows: &[&Flow]) -> TopologyStore {
        self.topology.extended_with(flows.iter().flat_map(|flow| flow.paths.iter().flat_map(|path| path.links())))
    }
}
