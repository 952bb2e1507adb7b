use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::api::topology_dto::TopologyDto;
use crate::domain::utils::id::{LinkId, RouterId};
use crate::error::ConversionError;

/// A directed network link and its capacity in traffic units per time interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: LinkId,
    pub capacity: f64,
}

impl Link {
    pub fn new(id: LinkId, capacity: f64) -> Result<Self, ConversionError> {
        if id.is_self_loop() {
            return Err(ConversionError::SelfLoopLink(id.to_string()));
        }

        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(ConversionError::InvalidCapacity { start: id.start.to_string(), end: id.end.to_string(), capacity });
        }

        Ok(Self { id, capacity })
    }
}

/// Read-mostly view of the network: link capacities plus forward and reverse adjacency.
///
/// The store is cloned into every bucket run, so no run ever observes another run's state.
/// Links absent from the topology input resolve to `default_capacity`.
#[derive(Debug, Clone)]
pub struct TopologyStore {
    /// All physical links, indexed by `start;end`.
    links: BTreeMap<LinkId, Link>,

    /// Maps a router to the set of its outgoing links.
    adjacency: HashMap<RouterId, BTreeSet<LinkId>>,

    /// Maps a router to the set of its incoming links.
    reverse_adjacency: HashMap<RouterId, BTreeSet<LinkId>>,

    /// Capacity applied to links that are used by flows but missing from the topology input.
    default_capacity: f64,
}

impl TryFrom<(TopologyDto, f64)> for TopologyStore {
    type Error = ConversionError;

    fn try_from(args: (TopologyDto, f64)) -> Result<Self, Self::Error> {
        let (dto, default_capacity) = args;

        if !(default_capacity.is_finite() && default_capacity > 0.0) {
            return Err(ConversionError::InvalidCapacity { start: "*".to_string(), end: "*".to_string(), capacity: default_capacity });
        }

        // 1. Init physical links.
        let links = TopologyStore::setup_links(&dto)?;

        // 2. Build forward and reverse adjacency.
        let (adjacency, reverse_adjacency) = TopologyStore::setup_adjacency(&links);

        Ok(TopologyStore { links, adjacency, reverse_adjacency, default_capacity })
    }
}

impl TopologyStore {
    pub fn new(default_capacity: f64) -> Self {
        Self { links: BTreeMap::new(), adjacency: HashMap::new(), reverse_adjacency: HashMap::new(), default_capacity }
    }

    /// Builder-style insertion used by tests and synthetic topologies.
    pub fn with_link(mut self, start: &str, end: &str, capacity: f64) -> Result<Self, ConversionError> {
        let link = Link::new(LinkId::new(start, end), capacity)?;
        self.insert(link);
        Ok(self)
    }

    /// Copy of the store that also contains `links`. Links it does not know get the default capacity.
    pub fn extended_with<I>(&self, links: I) -> Self
    where
        I: IntoIterator<Item = LinkId>,
    {
        let mut extended = self.clone();

        for id in links {
            if extended.contains(&id) {
                continue;
            }
            if id.is_self_loop() {
                log::debug!("SelfLoopLink: Link {} is not added to the link graph.", id);
                continue;
            }
            extended.insert(Link { id, capacity: self.default_capacity });
        }

        extended
    }

    fn insert(&mut self, link: Link) {
        self.adjacency.entry(link.id.start.clone()).or_default().insert(link.id.clone());
        self.reverse_adjacency.entry(link.id.end.clone()).or_default().insert(link.id.clone());
        self.links.insert(link.id.clone(), link);
    }

    /// Initializes all links from the DTO. Later duplicates of a link overwrite earlier ones.
    pub fn setup_links(dto: &TopologyDto) -> Result<BTreeMap<LinkId, Link>, ConversionError> {
        let mut links: BTreeMap<LinkId, Link> = BTreeMap::new();

        for link_dto in dto.links.iter() {
            let link_id = LinkId::new(link_dto.start_point.trim(), link_dto.end_point.trim());
            let link = Link::new(link_id.clone(), link_dto.capacity)?;

            if let Some(previous) = links.insert(link_id.clone(), link) {
                log::warn!("DuplicateLink: Link {} defined more than once, capacity {} replaced by {}.", link_id, previous.capacity, link_dto.capacity);
            }
        }

        if links.is_empty() {
            log::info!("Empty Topology: No links were provided. Every link will use the default capacity.");
        }

        Ok(links)
    }

    pub fn setup_adjacency(
        links: &BTreeMap<LinkId, Link>,
    ) -> (HashMap<RouterId, BTreeSet<LinkId>>, HashMap<RouterId, BTreeSet<LinkId>>) {
        let mut adjacency: HashMap<RouterId, BTreeSet<LinkId>> = HashMap::new();
        let mut reverse_adjacency: HashMap<RouterId, BTreeSet<LinkId>> = HashMap::new();

        for link_id in links.keys() {
            adjacency.entry(link_id.start.clone()).or_default().insert(link_id.clone());
            reverse_adjacency.entry(link_id.end.clone()).or_default().insert(link_id.clone());
        }

        (adjacency, reverse_adjacency)
    }

    pub fn default_capacity(&self) -> f64 {
        self.default_capacity
    }

    pub fn capacity(&self, link: &LinkId) -> Option<f64> {
        self.links.get(link).map(|l| l.capacity)
    }

    /// Returns the link capacity and whether the default had to be applied.
    pub fn capacity_or_default(&self, link: &LinkId) -> (f64, bool) {
        match self.links.get(link) {
            Some(l) => (l.capacity, false),
            None => (self.default_capacity, true),
        }
    }

    pub fn contains(&self, link: &LinkId) -> bool {
        self.links.contains_key(link)
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn routers(&self) -> BTreeSet<RouterId> {
        self.links.keys().flat_map(|l| [l.start.clone(), l.end.clone()]).collect()
    }

    pub fn outgoing(&self, router: &RouterId) -> impl Iterator<Item = &LinkId> {
        self.adjacency.get(router).into_iter().flat_map(|set| set.iter())
    }

    pub fn incoming(&self, router: &RouterId) -> impl Iterator<Item = &LinkId> {
        self.reverse_adjacency.get(router).into_iter().flat_map(|set| set.iter())
    }

    /// All routers reachable from `source` along directed links, `source` included.
    pub fn reachable_from(&self, source: &RouterId) -> HashSet<RouterId> {
        self.breadth_first(source, |router| self.outgoing(router).map(|l| l.end.clone()).collect())
    }

    /// All routers from which `sink` can be reached along directed links, `sink` included.
    pub fn reaching(&self, sink: &RouterId) -> HashSet<RouterId> {
        self.breadth_first(sink, |router| self.incoming(router).map(|l| l.start.clone()).collect())
    }

    fn breadth_first<F>(&self, start: &RouterId, neighbours: F) -> HashSet<RouterId>
    where
        F: Fn(&RouterId) -> Vec<RouterId>,
    {
        let mut visited: HashSet<RouterId> = HashSet::new();
        let mut queue: VecDeque<RouterId> = VecDeque::new();

        visited.insert(start.clone());
        queue.push_back(start.clone());

        while let Some(router) = queue.pop_front() {
            for next in neighbours(&router) {
                if visited.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }

        visited
    }
}
