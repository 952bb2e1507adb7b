use std::collections::BTreeMap;

use te_flow_engine::domain::analysis::utilization::UtilizationAggregator;
use te_flow_engine::domain::network::flow::Path;
use te_flow_engine::domain::network::topology::TopologyStore;
use te_flow_engine::domain::utils::id::{FlowId, LinkId};
use te_flow_engine::error::FlowError;

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "expected {}, got {}", expected, actual);
}

fn single_path(names: &[&str]) -> BTreeMap<Path, f64> {
    BTreeMap::from([(Path::from_names(names), 1.0)])
}

#[test]
fn test_default_capacity_utilization() {
    let default_capacity = 250.0;
    let topology = TopologyStore::new(default_capacity);
    let mut aggregator = UtilizationAggregator::new(&topology, true);

    aggregator.add_path_ratios(&FlowId::new("A", "C"), 40.0, &single_path(&["A", "B", "C"])).unwrap();
    aggregator.add_path_ratios(&FlowId::new("A", "B"), 10.0, &single_path(&["A", "B"])).unwrap();

    let utilization = aggregator.link_utilization();
    assert_close(utilization[&LinkId::new("A", "B")], 100.0 * 50.0 / default_capacity);
    assert_close(utilization[&LinkId::new("B", "C")], 100.0 * 40.0 / default_capacity);
    assert_eq!(aggregator.defaulted_links().len(), 2);

    let load = aggregator.load(&LinkId::new("A", "B")).unwrap();
    assert!(load.default_capacity);
    assert_eq!(load.flows.len(), 2, "Both flows cross A;B");
}

#[test]
fn test_zero_demand_is_reported_and_excluded() {
    let topology = TopologyStore::new(100.0);
    let mut aggregator = UtilizationAggregator::new(&topology, false);

    let result = aggregator.add_path_ratios(&FlowId::new("A", "B"), 0.0, &single_path(&["A", "B"]));

    assert_eq!(result, Err(FlowError::ZeroFlow { flow: FlowId::new("A", "B"), demand: 0.0 }));
    assert!(aggregator.summary("t0").is_none(), "A zero flow must not create link entries");
}

#[test]
fn test_invalid_demand_is_rejected() {
    let topology = TopologyStore::new(100.0);
    let mut aggregator = UtilizationAggregator::new(&topology, false);

    assert!(matches!(aggregator.add_path_ratios(&FlowId::new("A", "B"), -3.0, &single_path(&["A", "B"])), Err(FlowError::InvalidDemand { .. })));
}

#[test]
fn test_idle_links_take_part_in_summary() {
    let topology = TopologyStore::new(100.0).with_link("A", "B", 100.0).and_then(|t| t.with_link("B", "A", 100.0)).unwrap();
    let demand = 30.0;

    let mut with_idle = UtilizationAggregator::new(&topology, true);
    with_idle.add_path_ratios(&FlowId::new("A", "B"), demand, &single_path(&["A", "B"])).unwrap();
    let summary = with_idle.summary("t0").unwrap();

    assert_eq!(summary.links, 2);
    assert_eq!(summary.min_util, 0.0);
    assert_close(summary.max_util, 30.0);
    assert_close(summary.avg_util, 15.0);

    let mut without_idle = UtilizationAggregator::new(&topology, false);
    without_idle.add_path_ratios(&FlowId::new("A", "B"), demand, &single_path(&["A", "B"])).unwrap();
    let summary = without_idle.summary("t0").unwrap();

    assert_eq!(summary.links, 1);
    assert_close(summary.min_util, 30.0);
}

#[test]
fn test_split_flow_is_counted_once_per_link() {
    let topology = TopologyStore::new(100.0);
    let mut aggregator = UtilizationAggregator::new(&topology, false);

    let mut ratios = BTreeMap::new();
    ratios.insert(Path::from_names(&["A", "B", "D"]), 0.25);
    ratios.insert(Path::from_names(&["A", "B", "C", "D"]), 0.75);
    aggregator.add_path_ratios(&FlowId::new("A", "D"), 80.0, &ratios).unwrap();

    let load = aggregator.load(&LinkId::new("A", "B")).unwrap();
    assert_eq!(load.traffic, 80.0);
    assert_eq!(load.flows, vec![FlowId::new("A", "D")]);
    assert!(aggregator.link_utilization().values().all(|u| *u >= 0.0));
}
