use std::collections::{BTreeMap, BTreeSet};

use crate::domain::network::flow::Path;
use crate::domain::network::topology::TopologyStore;
use crate::domain::ratio::propagator::LinkRatioMap;
use crate::domain::utils::id::{FlowId, LinkId};
use crate::error::FlowError;

/// Per-bucket mutable state of a link: total carried traffic and the flows that use it.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkLoad {
    pub capacity: f64,
    pub traffic: f64,
    pub flows: Vec<FlowId>,
    pub default_capacity: bool,
}

impl LinkLoad {
    fn idle(capacity: f64, default_capacity: bool) -> Self {
        Self { capacity, traffic: 0.0, flows: Vec::new(), default_capacity }
    }

    /// Utilization in percent of capacity.
    pub fn utilization(&self) -> f64 {
        self.traffic / self.capacity * 100.0
    }
}

/// Min, max and mean link utilization of one bucket, in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct UtilizationSummary {
    pub timestamp: String,
    pub min_util: f64,
    pub max_util: f64,
    pub avg_util: f64,
    pub links: usize,
}

/// Folds per-flow ratios and demand into per-link traffic and utilization.
///
/// One aggregator is created per bucket run and dropped with it; it is the only place that
/// accumulates link traffic.
#[derive(Debug, Clone)]
pub struct UtilizationAggregator<'a> {
    topology: &'a TopologyStore,
    loads: BTreeMap<LinkId, LinkLoad>,
    defaulted_links: BTreeSet<LinkId>,
}

impl<'a> UtilizationAggregator<'a> {
    /// With `include_idle_links`, every topology link starts at zero traffic and takes part in the
    /// summary even if no flow crosses it.
    pub fn new(topology: &'a TopologyStore, include_idle_links: bool) -> Self {
        let mut loads = BTreeMap::new();

        if include_idle_links {
            for link in topology.links() {
                loads.insert(link.id.clone(), LinkLoad::idle(link.capacity, false));
            }
        }

        Self { topology, loads, defaulted_links: BTreeSet::new() }
    }

    /// Adds a flow whose traffic share is known per link (heuristic output).
    pub fn add_link_ratios(&mut self, flow: &FlowId, demand: f64, links: &LinkRatioMap) -> Result<(), FlowError> {
        Self::check_demand(flow, demand)?;

        for (link_id, link) in links.iter() {
            self.add_traffic(flow, link_id, demand * link.ratio);
        }

        Ok(())
    }

    /// Adds a flow whose traffic share is known per path (solver or decomposer output).
    pub fn add_path_ratios(&mut self, flow: &FlowId, demand: f64, paths: &BTreeMap<Path, f64>) -> Result<(), FlowError> {
        Self::check_demand(flow, demand)?;

        let mut per_link: BTreeMap<LinkId, f64> = BTreeMap::new();
        for (path, ratio) in paths.iter() {
            for link_id in path.links() {
                *per_link.entry(link_id).or_insert(0.0) += ratio;
            }
        }

        for (link_id, ratio) in per_link.iter() {
            self.add_traffic(flow, link_id, demand * ratio);
        }

        Ok(())
    }

    fn check_demand(flow: &FlowId, demand: f64) -> Result<(), FlowError> {
        if !demand.is_finite() || demand < 0.0 {
            return Err(FlowError::InvalidDemand { flow: flow.clone(), demand });
        }

        // A flow without demand has no defined ratio and must not show up in the output.
        if demand == 0.0 {
            return Err(FlowError::ZeroFlow { flow: flow.clone(), demand });
        }

        Ok(())
    }

    fn add_traffic(&mut self, flow: &FlowId, link_id: &LinkId, traffic: f64) {
        if !self.loads.contains_key(link_id) {
            let (capacity, default_capacity) = self.topology.capacity_or_default(link_id);

            if default_capacity && self.defaulted_links.insert(link_id.clone()) {
                log::warn!("MissingLinkCapacity: Link {} is not part of the topology, using default capacity {}.", link_id, capacity);
            }

            self.loads.insert(link_id.clone(), LinkLoad::idle(capacity, default_capacity));
        }

        if let Some(load) = self.loads.get_mut(link_id) {
            load.traffic += traffic;
            load.flows.push(flow.clone());
        }
    }

    pub fn load(&self, link_id: &LinkId) -> Option<&LinkLoad> {
        self.loads.get(link_id)
    }

    pub fn loads(&self) -> impl Iterator<Item = (&LinkId, &LinkLoad)> {
        self.loads.iter()
    }

    /// Utilization in percent for every link known to this bucket.
    pub fn link_utilization(&self) -> BTreeMap<LinkId, f64> {
        self.loads.iter().map(|(id, load)| (id.clone(), load.utilization())).collect()
    }

    /// Links that fell back to the default capacity during this bucket.
    pub fn defaulted_links(&self) -> &BTreeSet<LinkId> {
        &self.defaulted_links
    }

    /// Returns `None` if the bucket has no links at all.
    pub fn summary(&self, timestamp: &str) -> Option<UtilizationSummary> {
        if self.loads.is_empty() {
            return None;
        }

        let mut min_util = f64::INFINITY;
        let mut max_util = f64::NEG_INFINITY;
        let mut sum = 0.0;

        for load in self.loads.values() {
            let util = load.utilization();
            min_util = min_util.min(util);
            max_util = max_util.max(util);
            sum += util;
        }

        Some(UtilizationSummary {
            timestamp: timestamp.to_string(),
            min_util,
            max_util,
            avg_util: sum / self.loads.len() as f64,
            links: self.loads.len(),
        })
    }
}
