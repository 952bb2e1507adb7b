pub mod bucket_dto;
pub mod config_dto;
pub mod ratio_dto;
pub mod solution_dto;
pub mod topology_dto;
