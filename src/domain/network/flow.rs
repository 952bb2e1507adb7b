use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::api::bucket_dto::BucketDto;
use crate::domain::utils::id::{ENDPOINT_DELIMITER, FlowId, LinkId, RouterId};
use crate::error::{ConversionError, FlowError};

/// An ordered sequence of routers from a flow's source to its destination.
///
/// Renders as `R1;R2;R3`. The rendered string is also the key under which optimizer-derived
/// ratios are stored and looked up.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    routers: Vec<RouterId>,
}

impl Path {
    pub fn new(routers: Vec<RouterId>) -> Self {
        Self { routers }
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self { routers: names.iter().map(|n| RouterId::new(n.as_ref())).collect() }
    }

    pub fn routers(&self) -> &[RouterId] {
        &self.routers
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    pub fn source(&self) -> Option<&RouterId> {
        self.routers.first()
    }

    pub fn sink(&self) -> Option<&RouterId> {
        self.routers.last()
    }

    /// The links implied by consecutive router pairs.
    pub fn links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.routers.windows(2).map(|pair| LinkId::from_routers(pair[0].clone(), pair[1].clone()))
    }

    pub fn contains_link(&self, link: &LinkId) -> bool {
        self.routers.windows(2).any(|pair| pair[0] == link.start && pair[1] == link.end)
    }

    /// Returns the router that appears in the path more than once, if any.
    pub fn first_revisited_router(&self) -> Option<&RouterId> {
        let mut seen = std::collections::HashSet::new();
        self.routers.iter().find(|router| !seen.insert(*router))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.routers.iter().map(|r| r.as_str()).collect();
        write!(f, "{}", names.join(ENDPOINT_DELIMITER.to_string().as_str()))
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path: \"{}\"", self)
    }
}

impl FromStr for Path {
    type Err = ConversionError;

    /// Accepts `A;B;C` as well as the bracketed `[A;B;C]` form found in raw path exports.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('[').trim_end_matches(']');

        if trimmed.is_empty() {
            return Err(ConversionError::MalformedPath(s.to_string()));
        }

        let mut routers = Vec::new();
        for name in trimmed.split(ENDPOINT_DELIMITER) {
            let name = name.trim();
            if name.is_empty() {
                return Err(ConversionError::MalformedPath(s.to_string()));
            }
            routers.push(RouterId::new(name));
        }

        Ok(Path { routers })
    }
}

/// A source to destination traffic demand and its candidate paths.
#[derive(Debug, Clone)]
pub struct Flow {
    pub id: FlowId,
    pub demand: f64,
    pub paths: Vec<Path>,
}

impl Flow {
    pub fn new(id: FlowId, demand: f64, paths: Vec<Path>) -> Self {
        Self { id, demand, paths }
    }

    /// Rejects flows the engine must not route: self loops and unusable demand values.
    /// A demand of exactly zero is valid input and is reported later as a zero flow.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.id.is_self_loop() {
            return Err(FlowError::SelfLoop(self.id.clone()));
        }

        if !self.demand.is_finite() || self.demand < 0.0 {
            return Err(FlowError::InvalidDemand { flow: self.id.clone(), demand: self.demand });
        }

        Ok(())
    }
}

/// One time interval's independent snapshot of flows and demand.
#[derive(Debug, Clone)]
pub struct TimeBucket {
    pub timestamp: String,
    pub flows: Vec<Flow>,
}

impl TimeBucket {
    pub fn new(timestamp: impl Into<String>, flows: Vec<Flow>) -> Self {
        Self { timestamp: timestamp.into(), flows }
    }

    pub fn total_demand(&self) -> f64 {
        self.flows.iter().map(|f| f.demand).sum()
    }
}

impl TryFrom<BucketDto> for TimeBucket {
    type Error = ConversionError;

    fn try_from(dto: BucketDto) -> Result<Self, Self::Error> {
        let mut paths_by_flow: BTreeMap<FlowId, Vec<Path>> = BTreeMap::new();

        for (flow_key, raw_paths) in dto.paths.iter() {
            let flow_id: FlowId = flow_key.parse()?;
            let mut paths = Vec::with_capacity(raw_paths.len());
            for raw_path in raw_paths {
                paths.push(raw_path.parse::<Path>()?);
            }
            paths_by_flow.insert(flow_id, paths);
        }

        let mut flows = Vec::with_capacity(dto.demands.len());

        for (flow_key, demand) in dto.demands.iter() {
            let flow_id: FlowId = flow_key.parse()?;
            let paths = paths_by_flow.remove(&flow_id).unwrap_or_default();
            flows.push(Flow::new(flow_id, *demand, paths));
        }

        for (flow_id, _) in paths_by_flow {
            log::warn!("MissingDemand: Bucket {} has paths for flow {} but no demand. Flow is ignored.", dto.timestamp, flow_id);
        }

        Ok(TimeBucket { timestamp: dto.timestamp, flows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_parses_bracketed_export_format() {
        let path: Path = "[R1004;R1993;R1321;R1010]".parse().unwrap();

        assert_eq!(path.len(), 4);
        assert_eq!(path.source(), Some(&RouterId::new("R1004")));
        assert_eq!(path.sink(), Some(&RouterId::new("R1010")));
        assert_eq!(path.to_string(), "R1004;R1993;R1321;R1010");
    }

    #[test]
    fn test_path_links_follow_router_order() {
        let path = Path::from_names(&["A", "B", "D", "G"]);
        let links: Vec<String> = path.links().map(|l| l.to_string()).collect();

        assert_eq!(links, vec!["A;B", "B;D", "D;G"]);
        assert!(path.contains_link(&LinkId::new("B", "D")));
        assert!(!path.contains_link(&LinkId::new("D", "B")));
    }

    #[test]
    fn test_revisited_router_is_detected() {
        let path = Path::from_names(&["A", "B", "C", "B", "G"]);

        assert_eq!(path.first_revisited_router(), Some(&RouterId::new("B")));
        assert!(Path::from_names(&["A", "B"]).first_revisited_router().is_none());
    }

    #[test]
    fn test_flow_validation() {
        assert_eq!(Flow::new(FlowId::new("A", "A"), 1.0, vec![]).validate(), Err(FlowError::SelfLoop(FlowId::new("A", "A"))));
        assert!(Flow::new(FlowId::new("A", "B"), -1.0, vec![]).validate().is_err());
        assert!(Flow::new(FlowId::new("A", "B"), f64::NAN, vec![]).validate().is_err());
        assert!(Flow::new(FlowId::new("A", "B"), 0.0, vec![]).validate().is_ok());
    }
}
