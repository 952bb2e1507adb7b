use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::domain::network::flow::{Flow, Path};
use crate::domain::network::path_graph::PathGraph;
use crate::domain::network::topology::TopologyStore;
use crate::domain::ratio::ratio_table::{RATIO_SUM_TOLERANCE, normalize};
use crate::domain::utils::id::{LinkId, RouterId};
use crate::error::{FlowError, MalformedReason};

/// Capacity and traffic share of one link within one flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkRatio {
    pub capacity: f64,

    /// Fraction of the flow's demand that crosses this link.
    pub ratio: f64,

    /// `true` if the link was missing from the topology and the default capacity was applied.
    pub default_capacity: bool,
}

pub type LinkRatioMap = BTreeMap<LinkId, LinkRatio>;

/// Result of the heuristic for a single flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowAssignment {
    pub links: LinkRatioMap,
    pub paths: BTreeMap<Path, f64>,
}

/// Assigns traffic ratios to the links of a flow without calling the solver.
///
/// Traversal starts at the sink. The sink's ingress links split the flow evenly, or follow
/// externally supplied per-path ratios. Every other router forwards the mass leaving it evenly
/// across its ingress links. A router is only expanded once all of its egress links carry their
/// final ratio, so mass arriving over paths of different lengths is never under-counted.
#[derive(Debug, Clone, Copy)]
pub struct RatioPropagator<'a> {
    topology: &'a TopologyStore,
}

impl<'a> RatioPropagator<'a> {
    pub fn new(topology: &'a TopologyStore) -> Self {
        Self { topology }
    }

    /// Builds the path graph of `flow` and runs the full heuristic on it.
    pub fn assign(&self, flow: &Flow, external: Option<&BTreeMap<Path, f64>>) -> Result<FlowAssignment, FlowError> {
        let graph = PathGraph::from_flow(flow)?;
        let links = self.propagate(&graph, external)?;
        let paths = self.path_ratios(&graph, &links)?;

        Ok(FlowAssignment { links, paths })
    }

    pub fn propagate(&self, graph: &PathGraph, external: Option<&BTreeMap<Path, f64>>) -> Result<LinkRatioMap, FlowError> {
        let external = external.and_then(|ratios| Self::restrict_to_graph(graph, ratios));

        let mut links: LinkRatioMap = BTreeMap::new();
        let mut pending_egress: HashMap<&RouterId, usize> = graph.routers().map(|r| (&r.id, r.egress.len())).collect();
        let mut queue: VecDeque<&RouterId> = VecDeque::from([graph.sink()]);

        while let Some(router_id) = queue.pop_front() {
            let Some(router) = graph.router(router_id) else {
                continue;
            };

            if router.ingress.is_empty() {
                if router_id == graph.source() {
                    continue;
                }
                return Err(FlowError::MalformedTopology { flow: graph.flow().clone(), reason: MalformedReason::DanglingRouter(router_id.clone()) });
            }

            let ingress_count = router.ingress.len() as f64;
            let egress_mass: f64 = router
                .egress
                .iter()
                .filter_map(|downstream| links.get(&LinkId::from_routers(router_id.clone(), downstream.clone())))
                .map(|link| link.ratio)
                .sum();

            for upstream in router.ingress.iter() {
                let link_id = LinkId::from_routers(upstream.clone(), router_id.clone());

                let ratio = match (router_id == graph.sink(), external.as_ref()) {
                    (true, Some(ratios)) => Self::external_sink_ratio(graph, upstream, ratios),
                    (true, None) => 1.0 / ingress_count,
                    (false, _) => egress_mass / ingress_count,
                };

                let (capacity, default_capacity) = self.topology.capacity_or_default(&link_id);
                links.insert(link_id, LinkRatio { capacity, ratio, default_capacity });

                if let Some(count) = pending_egress.get_mut(upstream) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(upstream);
                    }
                }
            }
        }

        if links.len() != graph.link_count() {
            log::error!("IncompletePropagation: Flow {} assigned {} of {} links.", graph.flow(), links.len(), graph.link_count());
            return Err(FlowError::MalformedTopology { flow: graph.flow().clone(), reason: MalformedReason::Cycle(graph.sink().clone()) });
        }

        Ok(links)
    }

    /// Derives per-path ratios from link ratios.
    ///
    /// A path's share is the product, along the path, of the fraction of each router's outgoing
    /// mass that the chosen link carries. Shares are normalized over the flow's candidate paths;
    /// mass on router combinations that are not a candidate path is folded back this way.
    pub fn path_ratios(&self, graph: &PathGraph, links: &LinkRatioMap) -> Result<BTreeMap<Path, f64>, FlowError> {
        let mut egress_mass: HashMap<&RouterId, f64> = HashMap::new();
        for (link_id, link) in links.iter() {
            *egress_mass.entry(&link_id.start).or_insert(0.0) += link.ratio;
        }

        let mut shares: BTreeMap<Path, f64> = BTreeMap::new();

        for path in graph.paths() {
            let mut share = 1.0;

            for link_id in path.links() {
                let ratio = links.get(&link_id).map(|l| l.ratio).unwrap_or(0.0);
                let mass = egress_mass.get(&link_id.start).copied().unwrap_or(0.0);

                share *= if mass > 0.0 { ratio / mass } else { 0.0 };
            }

            shares.insert(path.clone(), share);
        }

        let total: f64 = shares.values().sum();
        if (total - 1.0).abs() > RATIO_SUM_TOLERANCE {
            log::debug!("PathShareRenormalized: Flow {} candidate paths cover {:.6} of the propagated mass.", graph.flow(), total);
        }

        // No ratio mass reached the source, e.g. all external ratios were zero.
        normalize(&shares).ok_or_else(|| FlowError::ZeroFlow { flow: graph.flow().clone(), demand: 0.0 })
    }

    /// External ratios restricted to the candidate paths and rescaled to sum to one.
    ///
    /// They are only used when they cover every candidate path and carry some mass. Paths the
    /// table lists but the flow no longer has are dropped.
    fn restrict_to_graph(graph: &PathGraph, ratios: &BTreeMap<Path, f64>) -> Option<BTreeMap<Path, f64>> {
        let restricted: BTreeMap<Path, f64> = graph.paths().iter().filter_map(|path| ratios.get(path).map(|r| (path.clone(), r.max(0.0)))).collect();

        if restricted.len() != graph.paths().len() {
            log::debug!("ExternalRatiosIgnored: Flow {} is not fully covered by the supplied ratios, using even split.", graph.flow());
            return None;
        }

        if restricted.len() != ratios.len() {
            log::debug!("ExternalRatiosRestricted: Flow {} drops {} supplied paths that are no longer candidates.", graph.flow(), ratios.len() - restricted.len());
        }

        let normalized = normalize(&restricted);
        if normalized.is_none() {
            log::debug!("ExternalRatiosIgnored: Flow {} has no supplied ratio mass on its candidate paths, using even split.", graph.flow());
        }

        normalized
    }

    /// Sum of the external ratios of every path whose last hop is `upstream -> sink`.
    fn external_sink_ratio(graph: &PathGraph, upstream: &RouterId, ratios: &BTreeMap<Path, f64>) -> f64 {
        let Some(router) = graph.router(upstream) else {
            return 0.0;
        };

        router
            .paths
            .iter()
            .filter(|path| {
                let routers = path.routers();
                routers.len() >= 2 && &routers[routers.len() - 2] == upstream
            })
            .filter_map(|path| ratios.get(path))
            .sum()
    }
}
