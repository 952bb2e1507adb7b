use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use crate::domain::analysis::calc_type::CalcType;
use crate::domain::analysis::run_config::RunConfig;
use crate::domain::analysis::utilization::{UtilizationAggregator, UtilizationSummary};
use crate::domain::network::flow::{Flow, TimeBucket};
use crate::domain::network::path_graph::PathGraph;
use crate::domain::network::topology::TopologyStore;
use crate::domain::optimization::decomposer::FlowDecomposer;
use crate::domain::optimization::demand_reducer::{DemandReducer, Reduction};
use crate::domain::optimization::formulator::ProblemFormulator;
use crate::domain::optimization::solver::{SharedSolver, SolverOutcome};
use crate::domain::ratio::propagator::RatioPropagator;
use crate::domain::ratio::ratio_table::RatioTable;
use crate::domain::utils::id::{FlowId, LinkId};
use crate::domain::utils::report_writer::ANALYTICS_TARGET;
use crate::error::{Error, FlowError, SolverError};

/// Everything one bucket run needs. Each worker owns its own clone.
#[derive(Debug, Clone)]
pub struct BucketContext {
    pub topology: TopologyStore,
    pub config: RunConfig,
    pub solver: Option<SharedSolver>,

    /// Ratio tables of an earlier run, keyed by timestamp.
    pub external_ratios: Option<Arc<BTreeMap<String, RatioTable>>>,
}

impl BucketContext {
    pub fn new(topology: TopologyStore, config: RunConfig) -> Self {
        Self { topology, config, solver: None, external_ratios: None }
    }

    pub fn with_solver(mut self, solver: SharedSolver) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn with_external_ratios(mut self, ratios: BTreeMap<String, RatioTable>) -> Self {
        self.external_ratios = Some(Arc::new(ratios));
        self
    }
}

/// Ratios and utilization produced by one calculation for one bucket.
#[derive(Debug, Clone)]
pub struct CalcResult {
    /// `baseline`, `ratios`, `average`, `max`, `squared` or `paths`.
    pub model: String,
    pub ratios: RatioTable,
    pub link_utilization: BTreeMap<LinkId, f64>,

    /// `None` if no link carried or could carry traffic.
    pub summary: Option<UtilizationSummary>,
    pub objective: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum OptimizedOutcome {
    Solved(CalcResult),

    /// The solver found no feasible point. Only the optimized output of the bucket is skipped.
    Infeasible { conflicting: Vec<String> },
}

/// Complete, successful result of one bucket. A failed bucket produces no report at all.
#[derive(Debug, Clone)]
pub struct BucketReport {
    pub timestamp: String,
    pub heuristic: Option<CalcResult>,
    pub optimized: Option<OptimizedOutcome>,
    pub reduction: Option<Reduction>,

    /// Flows dropped from this bucket, with the reason.
    pub flow_errors: Vec<FlowError>,
}

impl BucketReport {
    pub fn results(&self) -> impl Iterator<Item = &CalcResult> {
        let optimized = match &self.optimized {
            Some(OptimizedOutcome::Solved(result)) => Some(result),
            _ => None,
        };
        self.heuristic.iter().chain(optimized)
    }
}

/// Runs the configured calculation for a single bucket.
pub struct BucketPipeline<'c> {
    context: &'c BucketContext,
}

impl<'c> BucketPipeline<'c> {
    pub fn new(context: &'c BucketContext) -> Self {
        Self { context }
    }

    pub fn run(&self, bucket: &TimeBucket) -> Result<BucketReport, Error> {
        let started = Instant::now();
        let config = &self.context.config;
        let mut flow_errors = Vec::new();

        let bucket = if config.use_paths { self.with_external_paths(bucket) } else { Cow::Borrowed(bucket) };
        let bucket: &TimeBucket = &bucket;

        let flows = self.admissible_flows(bucket, &mut flow_errors);

        // The edge-flow form routes on the link graph and does not need well-formed candidate paths.
        let routable: Vec<&Flow> = if config.calc_type == CalcType::Paths { flows.clone() } else { self.well_formed(&flows, &mut flow_errors) };

        let mut heuristic = None;
        if !config.calc_type.uses_solver() || config.baseline_alongside {
            let model = if config.calc_type == CalcType::Ratios { CalcType::Ratios } else { CalcType::Baseline };
            let candidates = if config.calc_type == CalcType::Paths { self.well_formed(&flows, &mut Vec::new()) } else { routable.clone() };
            heuristic = Some(self.run_heuristic(&bucket.timestamp, model, &candidates, &mut flow_errors));
        }

        let mut optimized = None;
        let mut reduction = None;
        if config.calc_type.uses_solver() {
            let (outcome, reduced) = self.run_optimized(bucket, &routable, &mut flow_errors)?;
            optimized = Some(outcome);
            reduction = Some(reduced);
        }

        let report = BucketReport { timestamp: bucket.timestamp.clone(), heuristic, optimized, reduction, flow_errors };
        self.emit_analytics(&report, bucket, started.elapsed().as_millis() as i64);

        Ok(report)
    }

    /// Swaps in the paths the external ratio table lists for each flow. Flows the table does not
    /// list keep their own candidate paths.
    fn with_external_paths<'b>(&self, bucket: &'b TimeBucket) -> Cow<'b, TimeBucket> {
        let Some(table) = self.external_table(&bucket.timestamp) else {
            return Cow::Borrowed(bucket);
        };

        let mut updated = 0;
        let flows = bucket
            .flows
            .iter()
            .map(|flow| match table.flow(&flow.id) {
                Some(paths) if !paths.is_empty() => {
                    updated += 1;
                    Flow::new(flow.id.clone(), flow.demand, paths.keys().cloned().collect())
                }
                _ => flow.clone(),
            })
            .collect();

        log::info!("ExternalPaths: Bucket {} updated {} of {} flows with paths.", bucket.timestamp, updated, bucket.flows.len());
        Cow::Owned(TimeBucket::new(bucket.timestamp.clone(), flows))
    }

    /// Drops self loops, unusable demand values and zero-demand flows.
    fn admissible_flows<'b>(&self, bucket: &'b TimeBucket, flow_errors: &mut Vec<FlowError>) -> Vec<&'b Flow> {
        let mut flows = Vec::with_capacity(bucket.flows.len());

        for flow in bucket.flows.iter() {
            if let Err(e) = flow.validate() {
                log::warn!("{} Bucket {}: flow dropped.", e, bucket.timestamp);
                flow_errors.push(e);
                continue;
            }

            if flow.demand == 0.0 {
                flow_errors.push(FlowError::ZeroFlow { flow: flow.id.clone(), demand: flow.demand });
                continue;
            }

            flows.push(flow);
        }

        flows
    }

    /// Keeps the flows whose candidate paths form a valid path graph.
    fn well_formed<'f>(&self, flows: &[&'f Flow], flow_errors: &mut Vec<FlowError>) -> Vec<&'f Flow> {
        flows
            .iter()
            .filter(|flow| match PathGraph::from_flow(flow) {
                Ok(_) => true,
                Err(e) => {
                    log::warn!("{}", e);
                    flow_errors.push(e);
                    false
                }
            })
            .copied()
            .collect()
    }

    fn run_heuristic(&self, timestamp: &str, model: CalcType, flows: &[&Flow], flow_errors: &mut Vec<FlowError>) -> CalcResult {
        let topology = &self.context.topology;
        let propagator = RatioPropagator::new(topology);
        let mut aggregator = UtilizationAggregator::new(topology, self.context.config.include_idle_links);
        let mut ratios = RatioTable::new();

        let external = match model {
            CalcType::Ratios => self.external_table(timestamp),
            _ => None,
        };

        for flow in flows.iter() {
            let assignment = match propagator.assign(flow, external.and_then(|table| table.flow(&flow.id))) {
                Ok(assignment) => assignment,
                Err(e) => {
                    log::warn!("{}", e);
                    flow_errors.push(e);
                    continue;
                }
            };

            if let Err(e) = aggregator.add_link_ratios(&flow.id, flow.demand, &assignment.links) {
                flow_errors.push(e);
                continue;
            }

            ratios.set_flow(flow.id.clone(), assignment.paths);
        }

        CalcResult {
            model: model.to_string(),
            link_utilization: aggregator.link_utilization(),
            summary: aggregator.summary(timestamp),
            ratios,
            objective: None,
        }
    }

    fn external_table(&self, timestamp: &str) -> Option<&RatioTable> {
        let table = self.context.external_ratios.as_ref().and_then(|tables| tables.get(timestamp));

        if table.is_none() {
            log::warn!("MissingRatios: No external ratios for bucket {}, using even split.", timestamp);
        }

        table
    }

    fn run_optimized(&self, bucket: &TimeBucket, flows: &[&Flow], flow_errors: &mut Vec<FlowError>) -> Result<(OptimizedOutcome, Reduction), Error> {
        let config = &self.context.config;
        let timestamp = bucket.timestamp.as_str();

        let solver = self
            .context
            .solver
            .as_ref()
            .ok_or_else(|| Error::ConfigError(format!("calc type {} requires an optimization solver", config.calc_type)))?;

        // Lossy: flows outside the demand threshold never reach the solver. They are either routed
        // by the heuristic or left out of the utilization figures, depending on the configuration.
        let reduction = DemandReducer::new(config.demand_threshold)?.reduce(flows.iter().copied());

        if !reduction.omitted.is_empty() {
            log::info!(
                "DemandThreshold: Bucket {} models {} flows, {} flows with demand {:.3} ({:.2}% of total) omitted.",
                timestamp,
                reduction.kept.len(),
                reduction.omitted.len(),
                reduction.omitted_demand,
                100.0 * (1.0 - reduction.coverage())
            );
        }

        let by_id: HashMap<&FlowId, &Flow> = flows.iter().map(|f| (&f.id, *f)).collect();
        let kept: Vec<&Flow> = reduction.kept.iter().filter_map(|id| by_id.get(id).copied()).collect();
        let omitted: Vec<&Flow> = reduction.omitted.iter().filter_map(|id| by_id.get(id).copied()).collect();

        let model_name = format!("{}_{}", config.calc_type, timestamp);
        let solver_error = |source: SolverError| Error::BucketSolverError { timestamp: timestamp.to_string(), source };

        let (mut ratios, objective) = match config.calc_type.path_ratio_objective() {
            Some(objective) => {
                let problem = ProblemFormulator::new(&self.context.topology, objective).path_ratio_form(&model_name, &kept);

                match solver.solve(&problem.model).map_err(solver_error)? {
                    SolverOutcome::Infeasible { conflicting } => return Ok((Self::infeasible(timestamp, conflicting), reduction)),
                    SolverOutcome::Optimal { objective, values } => (problem.ratios(&values).map_err(solver_error)?, objective),
                }
            }
            None => {
                let problem = ProblemFormulator::new(&self.context.topology, config.edge_flow_objective).edge_flow_form(&model_name, &kept, config.prune_unreachable);
                flow_errors.extend(problem.unroutable.iter().cloned());

                match solver.solve(&problem.model).map_err(solver_error)? {
                    SolverOutcome::Infeasible { conflicting } => return Ok((Self::infeasible(timestamp, conflicting), reduction)),
                    SolverOutcome::Optimal { objective, values } => {
                        let solutions = problem.edge_flows(&values).map_err(solver_error)?;
                        let (table, errors) = FlowDecomposer::new(config.significance_threshold).decompose_all(&solutions);
                        flow_errors.extend(errors);
                        (table, objective)
                    }
                }
            }
        };

        if config.route_omitted_flows && !omitted.is_empty() {
            let candidates = if config.calc_type == CalcType::Paths { self.well_formed(&omitted, flow_errors) } else { omitted };
            let fallback = self.run_heuristic(timestamp, CalcType::Baseline, &candidates, flow_errors);
            ratios.extend(fallback.ratios);
        }

        let mut aggregator = UtilizationAggregator::new(&self.context.topology, config.include_idle_links);
        for (flow_id, paths) in ratios.entries() {
            if let Some(flow) = by_id.get(flow_id) {
                if let Err(e) = aggregator.add_path_ratios(flow_id, flow.demand, paths) {
                    flow_errors.push(e);
                }
            }
        }

        let result = CalcResult {
            model: config.calc_type.to_string(),
            link_utilization: aggregator.link_utilization(),
            summary: aggregator.summary(timestamp),
            ratios,
            objective,
        };

        Ok((OptimizedOutcome::Solved(result), reduction))
    }

    fn infeasible(timestamp: &str, conflicting: Vec<String>) -> OptimizedOutcome {
        log::warn!("SolverInfeasible: Bucket {} has no feasible solution, {} conflicting constraints. Optimized output skipped.", timestamp, conflicting.len());
        OptimizedOutcome::Infeasible { conflicting }
    }

    fn emit_analytics(&self, report: &BucketReport, bucket: &TimeBucket, processing_time: i64) {
        for result in report.results() {
            let (min_util, max_util, avg_util, links) = match &result.summary {
                Some(s) => (s.min_util, s.max_util, s.avg_util, s.links as i64),
                None => (0.0, 0.0, 0.0, 0),
            };

            tracing::info!(
                target: ANALYTICS_TARGET,
                Timestamp = %report.timestamp,
                Model = %result.model,
                Flows = bucket.flows.len() as i64,
                RoutedFlows = result.ratios.flow_count() as i64,
                DroppedFlows = report.flow_errors.len() as i64,
                Links = links,
                MinUtilization = min_util,
                MaxUtilization = max_util,
                AvgUtilization = avg_util,
                ProcessingTime = processing_time,
            );
        }

        if let Some(OptimizedOutcome::Infeasible { conflicting }) = &report.optimized {
            tracing::warn!(
                target: ANALYTICS_TARGET,
                Timestamp = %report.timestamp,
                Model = %self.context.config.calc_type,
                ConflictingConstraints = conflicting.len() as i64,
                ProcessingTime = processing_time,
            );
        }
    }
}
