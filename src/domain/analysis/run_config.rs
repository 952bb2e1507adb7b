use std::num::NonZeroUsize;

use crate::api::config_dto::RunConfigDto;
use crate::domain::analysis::calc_type::CalcType;
use crate::domain::optimization::decomposer::DEFAULT_SIGNIFICANCE;
use crate::domain::optimization::model::UtilizationObjective;
use crate::error::Error;

/// Environment variable consulted when no default capacity is configured.
pub const DEFAULT_CAPACITY_ENV: &str = "AVERAGE_CAPACITY";

pub const DEFAULT_DEMAND_THRESHOLD: f64 = 0.9;

/// Settings of one analysis run. Shared read-only by every bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub calc_type: CalcType,

    /// Capacity of links that flows use but the topology does not list.
    pub default_capacity: f64,

    /// Fraction of total demand the solver models have to cover.
    pub demand_threshold: f64,

    /// Decomposed paths below `significance_threshold · demand` are dropped.
    pub significance_threshold: f64,

    /// Worker threads; `None` uses the available parallelism.
    pub workers: Option<NonZeroUsize>,

    pub edge_flow_objective: UtilizationObjective,
    pub include_idle_links: bool,
    pub prune_unreachable: bool,

    /// Route flows cut by the demand threshold with the heuristic instead of leaving them out.
    pub route_omitted_flows: bool,

    /// Also run the heuristic for solver-backed calc types.
    pub baseline_alongside: bool,

    pub write_ratio_table: bool,

    /// Replace the candidate paths of every flow listed in the external ratio table of its bucket
    /// with the paths of that table.
    pub use_paths: bool,
}

impl RunConfig {
    pub fn new(calc_type: CalcType, default_capacity: f64) -> Self {
        Self {
            calc_type,
            default_capacity,
            demand_threshold: DEFAULT_DEMAND_THRESHOLD,
            significance_threshold: DEFAULT_SIGNIFICANCE,
            workers: None,
            edge_flow_objective: UtilizationObjective::Squared,
            include_idle_links: true,
            prune_unreachable: true,
            route_omitted_flows: true,
            baseline_alongside: false,
            write_ratio_table: false,
            use_paths: false,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(self.default_capacity.is_finite() && self.default_capacity > 0.0) {
            return Err(Error::ConfigError(format!("defaultCapacity must be positive, got {}", self.default_capacity)));
        }

        if !(self.demand_threshold > 0.0 && self.demand_threshold <= 1.0) {
            return Err(Error::ConfigError(format!("demandThreshold must lie in (0, 1], got {}", self.demand_threshold)));
        }

        if !(self.significance_threshold >= 0.0 && self.significance_threshold < 1.0) {
            return Err(Error::ConfigError(format!("significanceThreshold must lie in [0, 1), got {}", self.significance_threshold)));
        }

        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.or_else(|| std::thread::available_parallelism().ok()).map(NonZeroUsize::get).unwrap_or(1)
    }

    fn capacity_from_env() -> Option<f64> {
        let raw = std::env::var(DEFAULT_CAPACITY_ENV).ok()?;
        match raw.trim().parse::<f64>() {
            Ok(capacity) => Some(capacity),
            Err(_) => {
                log::warn!("InvalidEnvironment: {}='{}' is not a number and is ignored.", DEFAULT_CAPACITY_ENV, raw);
                None
            }
        }
    }
}

impl TryFrom<RunConfigDto> for RunConfig {
    type Error = Error;

    fn try_from(dto: RunConfigDto) -> Result<Self, Self::Error> {
        let calc_type = match dto.calc_type {
            Some(raw) => raw.parse::<CalcType>()?,
            None => CalcType::Baseline,
        };

        let default_capacity = dto
            .default_capacity
            .or_else(RunConfig::capacity_from_env)
            .ok_or_else(|| Error::ConfigError(format!("defaultCapacity is not configured and {} is not set", DEFAULT_CAPACITY_ENV)))?;

        let mut config = RunConfig::new(calc_type, default_capacity);

        if let Some(threshold) = dto.demand_threshold {
            config.demand_threshold = threshold;
        }
        if let Some(significance) = dto.significance_threshold {
            config.significance_threshold = significance;
        }
        if let Some(workers) = dto.workers {
            config.workers = NonZeroUsize::new(workers);
        }
        if let Some(objective) = dto.edge_flow_objective {
            config.edge_flow_objective = objective.parse()?;
        }
        if let Some(include) = dto.include_idle_links {
            config.include_idle_links = include;
        }
        if let Some(prune) = dto.prune_unreachable {
            config.prune_unreachable = prune;
        }
        if let Some(route) = dto.route_omitted_flows {
            config.route_omitted_flows = route;
        }
        if let Some(alongside) = dto.baseline_alongside {
            config.baseline_alongside = alongside;
        }
        if let Some(write) = dto.write_ratio_table {
            config.write_ratio_table = write;
        }
        if let Some(use_paths) = dto.use_paths {
            config.use_paths = use_paths;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dto_overrides_defaults() {
        let dto: RunConfigDto = serde_json::from_str(r#"{"calcType": "paths", "defaultCapacity": 400.0, "edgeFlowObjective": "max", "workers": 3}"#).unwrap();
        let config = RunConfig::try_from(dto).unwrap();

        assert_eq!(config.calc_type, CalcType::Paths);
        assert_eq!(config.default_capacity, 400.0);
        assert_eq!(config.edge_flow_objective, UtilizationObjective::Max);
        assert_eq!(config.worker_count(), 3);
        assert_eq!(config.demand_threshold, DEFAULT_DEMAND_THRESHOLD);
        assert!(config.include_idle_links);
    }

    #[test]
    fn test_use_paths_is_read() {
        let dto: RunConfigDto = serde_json::from_str(r#"{"calcType": "ratios", "defaultCapacity": 100.0, "usePaths": true}"#).unwrap();
        let config = RunConfig::try_from(dto).unwrap();

        assert!(config.use_paths);
        assert!(!RunConfig::new(CalcType::Baseline, 100.0).use_paths);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let dto: RunConfigDto = serde_json::from_str(r#"{"defaultCapacity": 100.0, "demandThreshold": 1.5}"#).unwrap();
        assert!(matches!(RunConfig::try_from(dto), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(serde_json::from_str::<RunConfigDto>(r#"{"defaultCapacty": 100.0}"#).is_err());
    }
}
