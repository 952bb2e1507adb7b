pub mod calc_type;
pub mod pipeline;
pub mod run_config;
pub mod scheduler;
pub mod utilization;
