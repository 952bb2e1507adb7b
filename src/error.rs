use thiserror::Error;

use crate::domain::utils::id::{FlowId, RouterId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON input: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Failed to read or write CSV data: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Failed to build internal domain model: {0}")]
    ConversionError(#[from] ConversionError),

    #[error("Invalid run configuration: {0}")]
    ConfigError(String),

    #[error("Solver failed for bucket '{timestamp}': {source}")]
    BucketSolverError {
        timestamp: String,
        #[source]
        source: SolverError,
    },

    #[error("Bucket '{timestamp}' panicked: {message}")]
    BucketPanicked { timestamp: String, message: String },
}

/// Errors raised while turning input DTOs or strings into domain types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Unknown calculation type: '{0}'")]
    UnknownCalcType(String),

    #[error("Unknown utilization objective: '{0}'")]
    UnknownObjective(String),

    #[error("Malformed endpoint pair '{0}', expected 'start;end'")]
    MalformedEndpointPair(String),

    #[error("Malformed path '{0}'")]
    MalformedPath(String),

    #[error("Link {start} -> {end} has non-positive capacity {capacity}")]
    InvalidCapacity { start: String, end: String, capacity: f64 },

    #[error("Link {0} starts and ends at the same router")]
    SelfLoopLink(String),
}

/// Why a single flow could not be turned into a valid path graph.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MalformedReason {
    #[error("flow has no candidate paths")]
    NoPaths,

    #[error("path '{0}' has fewer than two routers")]
    ShortPath(String),

    #[error("path '{path}' visits router {router} more than once")]
    RevisitedRouter { path: String, router: RouterId },

    #[error("no router without egress (missing sink)")]
    NoSink,

    #[error("ambiguous sink, candidates: {0:?}")]
    MultipleSinks(Vec<RouterId>),

    #[error("no router without ingress (missing source)")]
    NoSource,

    #[error("ambiguous source, candidates: {0:?}")]
    MultipleSources(Vec<RouterId>),

    #[error("paths form a cycle through router {0}")]
    Cycle(RouterId),

    #[error("router {0} has no ingress but is not the source")]
    DanglingRouter(RouterId),

    #[error("graph endpoints {start} -> {end} do not match the flow")]
    EndpointMismatch { start: RouterId, end: RouterId },
}

/// Errors local to one flow. They are recovered by dropping the flow from its bucket.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlowError {
    #[error("MalformedTopologyError: flow {flow}: {reason}")]
    MalformedTopology { flow: FlowId, reason: MalformedReason },

    #[error("ZeroFlowError: flow {flow} carries no flow (demand {demand})")]
    ZeroFlow { flow: FlowId, demand: f64 },

    #[error("SelfLoopFlow: flow {0} starts and ends at the same router")]
    SelfLoop(FlowId),

    #[error("InvalidDemand: flow {flow} has demand {demand}")]
    InvalidDemand { flow: FlowId, demand: f64 },

    #[error("UnroutableFlow: sink of flow {0} is not reachable from its source")]
    Unroutable(FlowId),
}

impl FlowError {
    pub fn flow(&self) -> &FlowId {
        match self {
            FlowError::MalformedTopology { flow, .. } => flow,
            FlowError::ZeroFlow { flow, .. } => flow,
            FlowError::SelfLoop(flow) => flow,
            FlowError::InvalidDemand { flow, .. } => flow,
            FlowError::Unroutable(flow) => flow,
        }
    }
}

/// Failures reported by, or while talking to, the external optimization capability.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error("SolverInfeasible: {} conflicting constraints: {conflicting:?}", .conflicting.len())]
    Infeasible { conflicting: Vec<String> },

    #[error("SolverUnavailable: {0}")]
    Unavailable(String),

    #[error("SolverError: backend returned code {code}: {message}")]
    Backend { code: i64, message: String },

    #[error("IncompleteSolution: no value for variable '{0}'")]
    IncompleteSolution(String),
}

pub type Result<T> = std::result::Result<T, Error>;
