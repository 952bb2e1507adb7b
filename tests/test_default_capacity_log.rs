use std::collections::BTreeMap;

use log::Level;
use logtest::Logger;

use te_flow_engine::domain::analysis::utilization::UtilizationAggregator;
use te_flow_engine::domain::network::flow::Path;
use te_flow_engine::domain::network::topology::TopologyStore;
use te_flow_engine::domain::utils::id::FlowId;

// logtest installs a process-wide logger, so this file holds a single test.
#[test]
fn test_missing_capacity_is_logged_once_per_link() {
    let mut logger = Logger::start();

    let topology = TopologyStore::new(100.0).with_link("A", "B", 100.0).unwrap();
    let mut aggregator = UtilizationAggregator::new(&topology, true);

    let ratios = BTreeMap::from([(Path::from_names(&["A", "B", "C"]), 1.0)]);
    aggregator.add_path_ratios(&FlowId::new("A", "C"), 10.0, &ratios).unwrap();
    aggregator.add_path_ratios(&FlowId::new("A", "C"), 5.0, &ratios).unwrap();
    aggregator.add_path_ratios(&FlowId::new("B", "C"), 5.0, &BTreeMap::from([(Path::from_names(&["B", "C"]), 1.0)])).unwrap();

    let mut warnings = Vec::new();
    while let Some(record) = logger.pop() {
        if record.level() == Level::Warn && record.args().starts_with("MissingLinkCapacity") {
            warnings.push(record.args().to_string());
        }
    }

    assert_eq!(warnings.len(), 1, "Expected exactly one warning for B;C, got {:?}", warnings);
    assert!(warnings[0].contains("B;C"));
    assert_eq!(aggregator.defaulted_links().len(), 1);
}
