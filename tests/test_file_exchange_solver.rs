use std::collections::BTreeMap;
use std::fs;

use tempfile::tempdir;

use te_flow_engine::domain::network::flow::{Flow, Path};
use te_flow_engine::domain::network::topology::TopologyStore;
use te_flow_engine::domain::optimization::formulator::{PathRatioProblem, ProblemFormulator};
use te_flow_engine::domain::optimization::lp_writer::LpNames;
use te_flow_engine::domain::optimization::model::{LinearExpr, OptimizationModel, Sense, UtilizationObjective};
use te_flow_engine::domain::optimization::solver::{FileExchangeSolver, OptimizationSolver, SolverOutcome};
use te_flow_engine::domain::utils::id::FlowId;
use te_flow_engine::error::SolverError;

fn create_problem() -> PathRatioProblem {
    let topology = TopologyStore::new(100.0).with_link("A", "B", 100.0).and_then(|t| t.with_link("B", "C", 100.0)).unwrap();
    let flow = Flow::new(FlowId::new("A", "C"), 50.0, vec![Path::from_names(&["A", "B", "C"]), Path::from_names(&["A", "C"])]);

    ProblemFormulator::new(&topology, UtilizationObjective::Max).path_ratio_form("max_2024-01-01 10:00", &[&flow])
}

#[test]
fn test_missing_solution_leaves_exported_model() {
    let dir = tempdir().unwrap();
    let problem = create_problem();
    let solver = FileExchangeSolver::new(dir.path().join("models"));

    let result = solver.solve(&problem.model);

    assert!(matches!(result, Err(SolverError::Unavailable(_))));
    let lp = fs::read_to_string(solver.model_path(&problem.model)).unwrap();
    assert!(lp.starts_with("\\ Model max_2024-01-01 10:00"));
    assert!(lp.contains("Subject To"));
    assert!(solver.model_path(&problem.model).file_name().unwrap().to_string_lossy().ends_with(".lp"));
}

#[test]
fn test_solution_is_mapped_back_to_model_names() {
    let dir = tempdir().unwrap();
    let problem = create_problem();
    let solver = FileExchangeSolver::new(dir.path());

    // Values keyed by LP names: the path ratio variables split 30/70, everything else zero.
    let names = LpNames::new(&problem.model);
    let paths = &problem.ratio_vars[&FlowId::new("A", "C")];
    let mut values: BTreeMap<String, f64> = names.iter().map(|(name, _)| (name.to_string(), 0.0)).collect();
    values.insert(names.get(paths[0].1).to_string(), 0.3);
    values.insert(names.get(paths[1].1).to_string(), 0.7);

    let document = serde_json::json!({ "status": "optimal", "objective": 0.35, "values": values });
    fs::write(solver.solution_path(&problem.model), document.to_string()).unwrap();

    let SolverOutcome::Optimal { objective, values } = solver.solve(&problem.model).unwrap() else {
        panic!("Expected an optimal outcome");
    };

    assert_eq!(objective, Some(0.35));
    assert_eq!(values.len(), problem.model.variables().len());

    let ratios = problem.ratios(&values).unwrap();
    assert!((ratios.ratio(&FlowId::new("A", "C"), &paths[0].0).unwrap() - 0.3).abs() < 1e-9);
}

#[test]
fn test_infeasible_and_error_documents() {
    let dir = tempdir().unwrap();
    let problem = create_problem();
    let solver = FileExchangeSolver::new(dir.path());

    fs::write(solver.solution_path(&problem.model), r#"{"status": "infeasible", "conflicting": ["cap_A;B"]}"#).unwrap();
    assert_eq!(solver.solve(&problem.model).unwrap(), SolverOutcome::Infeasible { conflicting: vec!["cap_A;B".to_string()] });

    fs::write(solver.solution_path(&problem.model), r#"{"status": "error", "code": 3, "message": "out of memory"}"#).unwrap();
    assert_eq!(solver.solve(&problem.model), Err(SolverError::Backend { code: 3, message: "out of memory".to_string() }));

    fs::write(solver.solution_path(&problem.model), "not json").unwrap();
    assert!(matches!(solver.solve(&problem.model), Err(SolverError::Unavailable(_))));
}

#[test]
fn test_conflicting_constraints_are_mapped_back_to_model_names() {
    let dir = tempdir().unwrap();
    let solver = FileExchangeSolver::new(dir.path());

    let mut model = OptimizationModel::new("squared_t0");
    let x = model.add_variable("f_R 1;R2|R 1;R2", 0.0, None);
    model.add_constraint("cap_R 1;R2", LinearExpr::new().with(x, 1.0), Sense::LessEqual, 10.0);
    model.add_constraint("demand_R 1;R2", LinearExpr::new().with(x, 1.0), Sense::GreaterEqual, 20.0);

    fs::write(solver.solution_path(&model), r#"{"status": "infeasible", "conflicting": ["cap_R_1;R2", "demand_R_1;R2", "unknown_row"]}"#).unwrap();

    let outcome = solver.solve(&model).unwrap();

    assert_eq!(outcome, SolverOutcome::Infeasible { conflicting: vec!["cap_R 1;R2".to_string(), "demand_R 1;R2".to_string(), "unknown_row".to_string()] });
    assert!(fs::read_to_string(solver.model_path(&model)).unwrap().contains(" cap_R_1;R2:"));
}
