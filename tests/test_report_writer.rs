use std::fs;

use tempfile::tempdir;

use te_flow_engine::api::ratio_dto::OverviewRecordDto;
use te_flow_engine::domain::analysis::calc_type::CalcType;
use te_flow_engine::domain::analysis::pipeline::{BucketContext, BucketPipeline};
use te_flow_engine::domain::analysis::run_config::RunConfig;
use te_flow_engine::domain::analysis::scheduler::BucketResult;
use te_flow_engine::domain::network::flow::{Flow, Path, TimeBucket};
use te_flow_engine::domain::network::topology::TopologyStore;
use te_flow_engine::domain::optimization::solver::SharedSolver;
use te_flow_engine::domain::optimization::solver_mock::FeasibleMockSolver;
use te_flow_engine::domain::utils::id::FlowId;
use te_flow_engine::domain::utils::report_writer::{OVERVIEW_FILE, ReportWriter};
use te_flow_engine::error::Error;
use te_flow_engine::loader::parser::parse_ratio_csv;
use te_flow_engine::{AnalysisInputs, run_analysis};

fn create_topology() -> TopologyStore {
    TopologyStore::new(100.0)
        .with_link("A", "B", 100.0)
        .and_then(|t| t.with_link("B", "C", 100.0))
        .and_then(|t| t.with_link("A", "C", 100.0))
        .unwrap()
}

fn create_bucket(timestamp: &str, demand: f64) -> TimeBucket {
    let paths = vec![Path::from_names(&["A", "B", "C"]), Path::from_names(&["A", "C"])];
    TimeBucket::new(timestamp, vec![Flow::new(FlowId::new("A", "C"), demand, paths)])
}

fn run_buckets(context: &BucketContext, buckets: &[TimeBucket]) -> Vec<BucketResult> {
    let pipeline = BucketPipeline::new(context);
    buckets.iter().map(|b| BucketResult { timestamp: b.timestamp.clone(), outcome: pipeline.run(b) }).collect()
}

#[test]
fn test_overview_has_one_row_per_bucket_and_model() {
    let dir = tempdir().unwrap();
    let mut config = RunConfig::new(CalcType::Average, 100.0);
    config.baseline_alongside = true;
    let context = BucketContext::new(create_topology(), config).with_solver(SharedSolver::new(FeasibleMockSolver));

    let mut results = run_buckets(&context, &[create_bucket("t0", 40.0), create_bucket("t1", 20.0)]);
    results.push(BucketResult { timestamp: "t2".to_string(), outcome: Err(Error::ConfigError("broken bucket".to_string())) });

    let path = ReportWriter::new(dir.path()).write_overview(&results).unwrap();
    assert_eq!(path, dir.path().join(OVERVIEW_FILE));

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("timestamp;model;min_util;max_util;avg_util"));

    let mut reader = csv::ReaderBuilder::new().delimiter(b';').from_path(&path).unwrap();
    let rows: Vec<OverviewRecordDto> = reader.deserialize().collect::<Result<_, _>>().unwrap();

    assert_eq!(rows.len(), 4, "Two models for each of the two completed buckets");
    assert_eq!((rows[0].timestamp.as_str(), rows[0].model.as_str()), ("t0", "baseline"));
    assert_eq!((rows[1].timestamp.as_str(), rows[1].model.as_str()), ("t0", "average"));
    assert!((rows[0].max_util - 20.0).abs() < 1e-6, "Even split puts 20 units on every link");
    assert!(rows.iter().all(|r| r.timestamp != "t2"));
}

#[test]
fn test_ratio_table_can_be_read_back() {
    let dir = tempdir().unwrap();
    let context = BucketContext::new(create_topology(), RunConfig::new(CalcType::Baseline, 100.0));
    let results = run_buckets(&context, &[create_bucket("t0", 40.0), create_bucket("t1", 20.0)]);

    let path = ReportWriter::new(dir.path().join("nested")).write_ratios(&results).unwrap();
    let tables = parse_ratio_csv(&path).unwrap();

    assert_eq!(tables.len(), 2);
    for result in results.iter() {
        let written = &result.report().unwrap().heuristic.as_ref().unwrap().ratios;
        assert_eq!(&tables[&result.timestamp], written);
    }
}

#[test]
fn test_run_analysis_end_to_end() {
    let dir = tempdir().unwrap();
    let topology = dir.path().join("topology.json");
    let buckets = dir.path().join("buckets.json");
    let output = dir.path().join("out");

    fs::write(
        &topology,
        r#"{"links": [
            {"startPoint": "A", "endPoint": "B", "capacity": 100.0},
            {"startPoint": "B", "endPoint": "C", "capacity": 100.0},
            {"startPoint": "A", "endPoint": "C", "capacity": 50.0}
        ]}"#,
    )
    .unwrap();
    fs::write(
        &buckets,
        r#"[
            {"timestamp": "t1", "demands": {"A;C": 30.0, "B;B": 2.0}, "paths": {"A;C": ["[A;B;C]", "A;C"]}},
            {"timestamp": "t0", "demands": {"A;C": 10.0}, "paths": {"A;C": ["A;C"]}}
        ]"#,
    )
    .unwrap();

    let mut config = RunConfig::new(CalcType::Baseline, 100.0);
    config.write_ratio_table = true;
    let inputs = AnalysisInputs { topology, buckets, ratios: None, solver_dir: None, output_dir: output.clone() };

    let results = run_analysis(config, &inputs, None).unwrap();

    assert_eq!(results.iter().map(|r| r.timestamp.as_str()).collect::<Vec<_>>(), vec!["t0", "t1"]);
    assert_eq!(results[1].report().unwrap().flow_errors.len(), 1, "The self loop B;B is dropped");
    assert!(output.join(OVERVIEW_FILE).exists());
    assert_eq!(parse_ratio_csv(output.join("ratios.csv")).unwrap().len(), 2);
}

#[test]
fn test_run_analysis_requires_a_solver() {
    let dir = tempdir().unwrap();
    let topology = dir.path().join("topology.json");
    let buckets = dir.path().join("buckets.json");
    fs::write(&topology, r#"{"links": []}"#).unwrap();
    fs::write(&buckets, "[]").unwrap();

    let inputs = AnalysisInputs { topology, buckets, ratios: None, solver_dir: None, output_dir: dir.path().join("out") };

    assert!(matches!(run_analysis(RunConfig::new(CalcType::Max, 100.0), &inputs, None), Err(Error::ConfigError(_))));
}

#[test]
fn test_run_analysis_use_paths_requires_a_ratio_table() {
    let dir = tempdir().unwrap();
    let topology = dir.path().join("topology.json");
    let buckets = dir.path().join("buckets.json");
    fs::write(&topology, r#"{"links": []}"#).unwrap();
    fs::write(&buckets, "[]").unwrap();

    let mut config = RunConfig::new(CalcType::Baseline, 100.0);
    config.use_paths = true;
    let inputs = AnalysisInputs { topology, buckets, ratios: None, solver_dir: None, output_dir: dir.path().join("out") };

    assert!(matches!(run_analysis(config, &inputs, None), Err(Error::ConfigError(_))));
}
