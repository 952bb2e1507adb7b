use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use te_flow_engine::api::config_dto::RunConfigDto;
use te_flow_engine::domain::analysis::calc_type::CalcType;
use te_flow_engine::domain::analysis::run_config::RunConfig;
use te_flow_engine::domain::optimization::demand_reducer::DemandReducer;
use te_flow_engine::loader::parser::parse_json_file;
use te_flow_engine::{AnalysisInputs, load_buckets, logger, run_analysis};

const COVERAGE_PERCENTAGES: [f64; 6] = [50.0, 60.0, 70.0, 80.0, 90.0, 100.0];

/// Traffic-engineering flow-ratio analysis over time-bucketed demand.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// baseline, ratios, average, max, squared or paths. Overrides the config file.
    calc_type: Option<String>,

    /// JSON topology: `{"links": [{"startPoint", "endPoint", "capacity"}]}`.
    #[arg(long, default_value = "data/topology.json")]
    topology: PathBuf,

    /// JSON list of time buckets.
    #[arg(long, default_value = "data/buckets.json")]
    buckets: PathBuf,

    /// JSON run configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "out")]
    output_dir: PathBuf,

    /// Ratio table of an earlier run, used by the `ratios` calc type and by `--use-paths`.
    #[arg(long)]
    ratios: Option<PathBuf>,

    /// Exchange directory: every solver model is exported there as `<model>.lp` and its solution
    /// read back from `<model>.sol.json`.
    #[arg(long)]
    solver_dir: Option<PathBuf>,

    #[arg(long)]
    default_capacity: Option<f64>,

    #[arg(long)]
    demand_threshold: Option<f64>,

    #[arg(long)]
    workers: Option<NonZeroUsize>,

    #[arg(long)]
    write_ratio_table: bool,

    /// Route every flow over the paths the `--ratios` table lists for it. Combine with the
    /// `ratios` calc type to apply the table's ratios as well.
    #[arg(long)]
    use_paths: bool,

    /// Print how many flows cover 50 to 100 percent of each bucket's demand, then exit.
    #[arg(long)]
    coverage: bool,

    /// Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

fn build_config(cli: &Cli) -> anyhow::Result<RunConfig> {
    let mut dto = match &cli.config {
        Some(path) => parse_json_file::<RunConfigDto, _>(path).with_context(|| format!("reading config {}", path.display()))?,
        None => RunConfigDto::default(),
    };

    if cli.calc_type.is_some() {
        dto.calc_type = cli.calc_type.clone();
    }
    if cli.default_capacity.is_some() {
        dto.default_capacity = cli.default_capacity;
    }
    if cli.demand_threshold.is_some() {
        dto.demand_threshold = cli.demand_threshold;
    }
    if let Some(workers) = cli.workers {
        dto.workers = Some(workers.get());
    }
    if cli.write_ratio_table {
        dto.write_ratio_table = Some(true);
    }
    if cli.use_paths {
        dto.use_paths = Some(true);
    }

    Ok(RunConfig::try_from(dto)?)
}

fn print_coverage(cli: &Cli) -> anyhow::Result<()> {
    for bucket in load_buckets(&cli.buckets)? {
        let table = DemandReducer::coverage_table(&bucket.flows, &COVERAGE_PERCENTAGES);
        let cells: Vec<String> = table.iter().map(|(percentage, flows)| format!("{}%: {}", percentage, flows)).collect();
        println!("{} ({} flows): {}", bucket.timestamp, bucket.flows.len(), cells.join(", "));
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init(cli.log_level);

    if cli.coverage {
        return print_coverage(&cli);
    }

    let config = build_config(&cli)?;
    log::info!("Started, calc type: {}", config.calc_type);

    let inputs = AnalysisInputs {
        topology: cli.topology.clone(),
        buckets: cli.buckets.clone(),
        ratios: cli.ratios.clone(),
        solver_dir: cli.solver_dir.clone(),
        output_dir: cli.output_dir.clone(),
    };

    let calc_type: CalcType = config.calc_type;
    let results = run_analysis(config, &inputs, None).context("analysis run failed")?;

    let failed = results.iter().filter(|r| r.outcome.is_err()).count();
    log::info!("Finished {} run: {} buckets, {} failed. Output in '{}'.", calc_type, results.len(), failed, cli.output_dir.display());

    Ok(())
}
