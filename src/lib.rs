use std::path::{Path, PathBuf};

use crate::api::bucket_dto::BucketDto;
use crate::api::topology_dto::TopologyDto;
use crate::domain::analysis::calc_type::CalcType;
use crate::domain::analysis::pipeline::BucketContext;
use crate::domain::analysis::run_config::RunConfig;
use crate::domain::analysis::scheduler::{BucketResult, ParallelScheduler};
use crate::domain::network::flow::TimeBucket;
use crate::domain::network::topology::TopologyStore;
use crate::domain::optimization::solver::{FileExchangeSolver, SharedSolver};
use crate::domain::utils::report_writer::ReportWriter;
use crate::error::{Error, Result};
use crate::loader::parser::{parse_json_file, parse_ratio_csv};

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Input and output locations of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisInputs {
    pub topology: PathBuf,
    pub buckets: PathBuf,

    /// Ratio table of an earlier run, required by the `ratios` calc type and by `use_paths`.
    pub ratios: Option<PathBuf>,

    /// Directory for exported `.lp` models and their solutions.
    pub solver_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
}

pub fn load_topology(file_path: &Path, default_capacity: f64) -> Result<TopologyStore> {
    let dto: TopologyDto = parse_json_file(file_path)?;
    let topology = TopologyStore::try_from((dto, default_capacity))?;
    log::info!("Topology loaded: {} links between {} routers.", topology.len(), topology.routers().len());

    Ok(topology)
}

pub fn load_buckets(file_path: &Path) -> Result<Vec<TimeBucket>> {
    let dtos: Vec<BucketDto> = parse_json_file(file_path)?;
    let buckets = dtos.into_iter().map(TimeBucket::try_from).collect::<std::result::Result<Vec<_>, _>>()?;
    log::info!("Loaded {} time buckets.", buckets.len());

    Ok(buckets)
}

/// Loads the inputs, runs every bucket and writes the CSV reports.
///
/// `solver` takes precedence over a file-exchange solver in `inputs.solver_dir`.
pub fn run_analysis(config: RunConfig, inputs: &AnalysisInputs, solver: Option<SharedSolver>) -> Result<Vec<BucketResult>> {
    config.validate()?;

    let topology = load_topology(&inputs.topology, config.default_capacity)?;
    let buckets = load_buckets(&inputs.buckets)?;

    let solver = solver.or_else(|| inputs.solver_dir.as_ref().map(|dir| SharedSolver::new(FileExchangeSolver::new(dir.clone()))));
    if config.calc_type.uses_solver() && solver.is_none() {
        return Err(Error::ConfigError(format!("calc type {} requires a solver directory", config.calc_type)));
    }

    let scheduler = ParallelScheduler::new(config.worker_count());
    let write_ratio_table = config.write_ratio_table;

    let mut context = BucketContext::new(topology, config.clone());
    if let Some(solver) = solver {
        log::info!("Using solver '{}'.", solver.name());
        context = context.with_solver(solver);
    }

    if config.calc_type == CalcType::Ratios || config.use_paths {
        let path = inputs.ratios.as_ref().ok_or_else(|| Error::ConfigError(format!("calc type {} with usePaths={} requires a ratio table", config.calc_type, config.use_paths)))?;
        context = context.with_external_ratios(parse_ratio_csv(path)?);
    }

    let results = scheduler.run(&context, buckets);

    let writer = ReportWriter::new(inputs.output_dir.clone());
    writer.write_overview(&results)?;
    if write_ratio_table {
        writer.write_ratios(&results)?;
    }

    Ok(results)
}
