use serde::Deserialize;

/// Run configuration as read from JSON. Every field is optional; missing values fall back to
/// the defaults of [`crate::domain::analysis::run_config::RunConfig`].
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunConfigDto {
    pub calc_type: Option<String>,
    pub default_capacity: Option<f64>,
    pub demand_threshold: Option<f64>,
    pub significance_threshold: Option<f64>,
    pub workers: Option<usize>,
    pub edge_flow_objective: Option<String>,
    pub include_idle_links: Option<bool>,
    pub prune_unreachable: Option<bool>,
    pub route_omitted_flows: Option<bool>,
    pub baseline_alongside: Option<bool>,
    pub write_ratio_table: Option<bool>,
    pub use_paths: Option<bool>,
}
