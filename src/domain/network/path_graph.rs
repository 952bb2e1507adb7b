use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::domain::network::flow::{Flow, Path};
use crate::domain::utils::id::{FlowId, LinkId, RouterId};
use crate::error::{FlowError, MalformedReason};

/// A router as seen by a single flow.
#[derive(Debug, Clone)]
pub struct PathRouter {
    pub id: RouterId,

    /// Upstream neighbours: for each `u` in here the flow uses link `u -> id`.
    pub ingress: BTreeSet<RouterId>,

    /// Downstream neighbours: for each `d` in here the flow uses link `id -> d`.
    pub egress: BTreeSet<RouterId>,

    /// The candidate paths that traverse this router.
    pub paths: Vec<Path>,
}

impl PathRouter {
    fn new(id: RouterId) -> Self {
        Self { id, ingress: BTreeSet::new(), egress: BTreeSet::new(), paths: Vec::new() }
    }
}

/// Directed acyclic graph of one flow's candidate paths.
///
/// Exactly one router has no egress (the sink) and exactly one has no ingress (the source).
/// A graph that cannot satisfy this is rejected at construction.
#[derive(Debug, Clone)]
pub struct PathGraph {
    flow: FlowId,
    routers: BTreeMap<RouterId, PathRouter>,
    paths: Vec<Path>,
    sink: RouterId,
    source: RouterId,
}

impl PathGraph {
    pub fn from_flow(flow: &Flow) -> Result<Self, FlowError> {
        Self::build(&flow.id, &flow.paths)
    }

    /// Builds the graph by walking every path from sink to source.
    pub fn build(flow: &FlowId, paths: &[Path]) -> Result<Self, FlowError> {
        let malformed = |reason: MalformedReason| FlowError::MalformedTopology { flow: flow.clone(), reason };

        if paths.is_empty() {
            return Err(malformed(MalformedReason::NoPaths));
        }

        let mut routers: BTreeMap<RouterId, PathRouter> = BTreeMap::new();
        let mut unique_paths: Vec<Path> = Vec::with_capacity(paths.len());

        for path in paths {
            if path.len() < 2 {
                return Err(malformed(MalformedReason::ShortPath(path.to_string())));
            }

            if let Some(router) = path.first_revisited_router() {
                return Err(malformed(MalformedReason::RevisitedRouter { path: path.to_string(), router: router.clone() }));
            }

            if unique_paths.contains(path) {
                log::debug!("DuplicatePath: Flow {} lists path {} more than once.", flow, path);
                continue;
            }

            let mut previous: Option<&RouterId> = None;

            for router_id in path.routers().iter().rev() {
                let router = routers.entry(router_id.clone()).or_insert_with(|| PathRouter::new(router_id.clone()));
                router.paths.push(path.clone());

                if let Some(downstream) = previous {
                    router.egress.insert(downstream.clone());

                    if let Some(downstream_router) = routers.get_mut(downstream) {
                        downstream_router.ingress.insert(router_id.clone());
                    }
                }

                previous = Some(router_id);
            }

            unique_paths.push(path.clone());
        }

        let sinks: Vec<RouterId> = routers.values().filter(|r| r.egress.is_empty()).map(|r| r.id.clone()).collect();
        let sink = match sinks.len() {
            0 => return Err(malformed(MalformedReason::NoSink)),
            1 => sinks[0].clone(),
            _ => return Err(malformed(MalformedReason::MultipleSinks(sinks))),
        };

        let sources: Vec<RouterId> = routers.values().filter(|r| r.ingress.is_empty()).map(|r| r.id.clone()).collect();
        let source = match sources.len() {
            0 => return Err(malformed(MalformedReason::NoSource)),
            1 => sources[0].clone(),
            _ => return Err(malformed(MalformedReason::MultipleSources(sources))),
        };

        if source != flow.start || sink != flow.end {
            return Err(malformed(MalformedReason::EndpointMismatch { start: source, end: sink }));
        }

        let graph = PathGraph { flow: flow.clone(), routers, paths: unique_paths, sink, source };

        // Individual paths are loop free, but two paths may still cross each other in opposite directions.
        if let Some(router) = graph.find_cycle() {
            return Err(malformed(MalformedReason::Cycle(router)));
        }

        Ok(graph)
    }

    /// Kahn's algorithm from the sink over reversed edges. Returns a router that never became free.
    fn find_cycle(&self) -> Option<RouterId> {
        let mut pending_egress: BTreeMap<&RouterId, usize> = self.routers.iter().map(|(id, r)| (id, r.egress.len())).collect();
        let mut queue: VecDeque<&RouterId> = VecDeque::from([&self.sink]);
        let mut released = 0;

        while let Some(router_id) = queue.pop_front() {
            released += 1;

            for upstream in self.routers[router_id].ingress.iter() {
                if let Some(count) = pending_egress.get_mut(upstream) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(upstream);
                    }
                }
            }
        }

        if released == self.routers.len() {
            return None;
        }

        // Every stuck router still waits on a stuck downstream router, so following those edges must revisit one.
        let stuck: BTreeSet<&RouterId> = pending_egress.into_iter().filter(|(_, count)| *count > 0).map(|(id, _)| id).collect();
        let mut seen: BTreeSet<&RouterId> = BTreeSet::new();
        let mut current: &RouterId = stuck.iter().next().copied()?;

        loop {
            if !seen.insert(current) {
                return Some(current.clone());
            }
            current = self.routers[current].egress.iter().find(|d| stuck.contains(d))?;
        }
    }

    pub fn flow(&self) -> &FlowId {
        &self.flow
    }

    pub fn sink(&self) -> &RouterId {
        &self.sink
    }

    pub fn source(&self) -> &RouterId {
        &self.source
    }

    pub fn router(&self, id: &RouterId) -> Option<&PathRouter> {
        self.routers.get(id)
    }

    pub fn routers(&self) -> impl Iterator<Item = &PathRouter> {
        self.routers.values()
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.routers.values().flat_map(|r| r.egress.iter().map(move |d| LinkId::from_routers(r.id.clone(), d.clone())))
    }

    pub fn link_count(&self) -> usize {
        self.routers.values().map(|r| r.egress.len()).sum()
    }
}
