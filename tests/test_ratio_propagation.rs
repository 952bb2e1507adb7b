use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use te_flow_engine::domain::analysis::utilization::UtilizationAggregator;
use te_flow_engine::domain::network::flow::{Flow, Path};
use te_flow_engine::domain::network::path_graph::PathGraph;
use te_flow_engine::domain::network::topology::TopologyStore;
use te_flow_engine::domain::ratio::propagator::{LinkRatio, RatioPropagator};
use te_flow_engine::domain::ratio::ratio_table::RATIO_SUM_TOLERANCE;
use te_flow_engine::domain::utils::id::{FlowId, LinkId};

const EPS: f64 = 1e-9;

/// `S -> ... -> T` through up to three layers of three routers each. `None` skips a layer.
fn layered_path(choices: &[Option<usize>]) -> Path {
    let mut names = vec!["S".to_string()];
    names.extend(choices.iter().enumerate().filter_map(|(layer, node)| node.map(|node| format!("L{}_{}", layer, node))));
    names.push("T".to_string());
    Path::from_names(&names[..])
}

fn create_scenario_topology() -> TopologyStore {
    TopologyStore::new(1000.0)
        .with_link("A", "B", 100.0)
        .and_then(|t| t.with_link("A", "C", 100.0))
        .and_then(|t| t.with_link("B", "D", 100.0))
        .and_then(|t| t.with_link("B", "E", 100.0))
        .and_then(|t| t.with_link("C", "F", 100.0))
        .and_then(|t| t.with_link("D", "G", 100.0))
        .and_then(|t| t.with_link("E", "G", 100.0))
        .and_then(|t| t.with_link("F", "G", 100.0))
        .unwrap()
}

fn create_scenario_flow() -> Flow {
    Flow::new(
        FlowId::new("A", "G"),
        100.0,
        vec![Path::from_names(&["A", "B", "D", "G"]), Path::from_names(&["A", "B", "E", "G"]), Path::from_names(&["A", "C", "F", "G"])],
    )
}

fn ratio_of(links: &BTreeMap<LinkId, LinkRatio>, start: &str, end: &str) -> f64 {
    links.get(&LinkId::new(start, end)).map(|l| l.ratio).unwrap_or_else(|| panic!("Link {};{} has no ratio", start, end))
}

#[test]
fn test_even_split_scenario() {
    let topology = create_scenario_topology();
    let propagator = RatioPropagator::new(&topology);

    let assignment = propagator.assign(&create_scenario_flow(), None).unwrap();

    assert_eq!(assignment.links.len(), 8, "Every link of the path graph gets exactly one ratio");
    assert!((ratio_of(&assignment.links, "A", "B") - 2.0 / 3.0).abs() < EPS);
    assert!((ratio_of(&assignment.links, "A", "C") - 1.0 / 3.0).abs() < EPS);
    assert!((ratio_of(&assignment.links, "D", "G") - 1.0 / 3.0).abs() < EPS);
    assert!((ratio_of(&assignment.links, "B", "E") - 1.0 / 3.0).abs() < EPS);

    for ratio in assignment.paths.values() {
        assert!((ratio - 1.0 / 3.0).abs() < EPS);
    }
    let sum: f64 = assignment.paths.values().sum();
    assert!((sum - 1.0).abs() < RATIO_SUM_TOLERANCE);
}

#[test]
fn test_scenario_link_utilization() {
    let topology = create_scenario_topology();
    let flow = create_scenario_flow();
    let assignment = RatioPropagator::new(&topology).assign(&flow, None).unwrap();

    let mut aggregator = UtilizationAggregator::new(&topology, true);
    aggregator.add_link_ratios(&flow.id, flow.demand, &assignment.links).unwrap();

    let utilization = aggregator.link_utilization();
    assert!((utilization[&LinkId::new("A", "B")] - 200.0 / 3.0).abs() < 1e-6, "AB carries 66.7% of its capacity");
    assert!((utilization[&LinkId::new("A", "C")] - 100.0 / 3.0).abs() < 1e-6);

    let summary = aggregator.summary("t0").unwrap();
    assert!((summary.max_util - 200.0 / 3.0).abs() < 1e-6);
    assert!((summary.min_util - 100.0 / 3.0).abs() < 1e-6);
    assert_eq!(summary.links, 8);
}

#[test]
fn test_propagation_is_idempotent() {
    let topology = create_scenario_topology();
    let propagator = RatioPropagator::new(&topology);
    let flow = create_scenario_flow();

    let first = propagator.assign(&flow, None).unwrap();
    let second = propagator.assign(&flow, None).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_external_ratios_drive_the_sink_split() {
    let topology = create_scenario_topology();
    let propagator = RatioPropagator::new(&topology);

    let mut external = BTreeMap::new();
    external.insert(Path::from_names(&["A", "B", "D", "G"]), 0.5);
    external.insert(Path::from_names(&["A", "B", "E", "G"]), 0.25);
    external.insert(Path::from_names(&["A", "C", "F", "G"]), 0.25);

    let assignment = propagator.assign(&create_scenario_flow(), Some(&external)).unwrap();

    assert!((ratio_of(&assignment.links, "D", "G") - 0.5).abs() < EPS);
    assert!((ratio_of(&assignment.links, "A", "B") - 0.75).abs() < EPS);
    assert!((ratio_of(&assignment.links, "A", "C") - 0.25).abs() < EPS);

    for (path, ratio) in external.iter() {
        assert!((assignment.paths[path] - ratio).abs() < EPS, "Path {} should keep its external ratio", path);
    }
}

#[test]
fn test_incomplete_external_ratios_fall_back_to_even_split() {
    let topology = create_scenario_topology();
    let propagator = RatioPropagator::new(&topology);

    let mut external = BTreeMap::new();
    external.insert(Path::from_names(&["A", "B", "D", "G"]), 1.0);

    let with_external = propagator.assign(&create_scenario_flow(), Some(&external)).unwrap();
    let even = propagator.assign(&create_scenario_flow(), None).unwrap();

    assert_eq!(with_external, even);
}

#[test]
fn test_uneven_path_lengths_keep_all_mass() {
    let topology = TopologyStore::new(100.0);
    let flow = Flow::new(FlowId::new("A", "G"), 10.0, vec![Path::from_names(&["A", "B", "G"]), Path::from_names(&["A", "B", "C", "G"])]);

    let graph = PathGraph::from_flow(&flow).unwrap();
    let propagator = RatioPropagator::new(&topology);
    let links = propagator.propagate(&graph, None).unwrap();

    assert!((ratio_of(&links, "A", "B") - 1.0).abs() < EPS, "B forwards the mass of both egress links");
    assert!((ratio_of(&links, "B", "C") - 0.5).abs() < EPS);
    assert!(links.values().all(|l| l.default_capacity), "No link of an empty topology has a known capacity");

    let paths = propagator.path_ratios(&graph, &links).unwrap();
    assert!((paths[&Path::from_names(&["A", "B", "G"])] - 0.5).abs() < EPS);
    assert!((paths[&Path::from_names(&["A", "B", "C", "G"])] - 0.5).abs() < EPS);
}

#[test]
fn test_external_ratios_for_retired_paths_are_rescaled() {
    let topology = TopologyStore::new(100.0);
    let propagator = RatioPropagator::new(&topology);
    let flow = Flow::new(FlowId::new("A", "G"), 100.0, vec![Path::from_names(&["A", "B", "G"]), Path::from_names(&["A", "C", "G"])]);

    // A table from an earlier run that still routes half of the flow over A;D;G.
    let mut external = BTreeMap::new();
    external.insert(Path::from_names(&["A", "B", "G"]), 0.25);
    external.insert(Path::from_names(&["A", "C", "G"]), 0.25);
    external.insert(Path::from_names(&["A", "D", "G"]), 0.5);

    let assignment = propagator.assign(&flow, Some(&external)).unwrap();

    let sink_ingress = ratio_of(&assignment.links, "B", "G") + ratio_of(&assignment.links, "C", "G");
    assert!((sink_ingress - 1.0).abs() < EPS, "The sink receives the whole flow");
    assert!((assignment.paths[&Path::from_names(&["A", "B", "G"])] - 0.5).abs() < EPS);
    assert!(!assignment.paths.contains_key(&Path::from_names(&["A", "D", "G"])));

    let mut aggregator = UtilizationAggregator::new(&topology, false);
    aggregator.add_link_ratios(&flow.id, flow.demand, &assignment.links).unwrap();

    let utilization = aggregator.link_utilization();
    assert!((utilization[&LinkId::new("A", "B")] - 50.0).abs() < 1e-6, "Link load agrees with the path table");
    assert!((utilization[&LinkId::new("C", "G")] - 50.0).abs() < 1e-6);
}

proptest! {
    #[test]
    fn prop_path_ratios_sum_to_one_on_layered_dags(
        choices in prop::collection::vec(prop::collection::vec(prop::option::of(0usize..3), 3), 1..10),
    ) {
        let topology = TopologyStore::new(100.0);
        let paths: Vec<Path> = choices.iter().map(|c| layered_path(c)).collect();
        let flow = Flow::new(FlowId::new("S", "T"), 10.0, paths.clone());

        let assignment = RatioPropagator::new(&topology).assign(&flow, None).unwrap();

        let candidates: BTreeSet<Path> = paths.into_iter().collect();
        prop_assert_eq!(assignment.paths.keys().cloned().collect::<BTreeSet<_>>(), candidates);

        let path_sum: f64 = assignment.paths.values().sum();
        prop_assert!((path_sum - 1.0).abs() <= RATIO_SUM_TOLERANCE, "path ratios sum to {}", path_sum);

        let sink_ingress: f64 = assignment.links.iter().filter(|(id, _)| id.end.as_str() == "T").map(|(_, l)| l.ratio).sum();
        let source_egress: f64 = assignment.links.iter().filter(|(id, _)| id.start.as_str() == "S").map(|(_, l)| l.ratio).sum();
        prop_assert!((sink_ingress - 1.0).abs() <= RATIO_SUM_TOLERANCE);
        prop_assert!((source_egress - 1.0).abs() <= RATIO_SUM_TOLERANCE, "source forwards {}", source_egress);
    }
}
