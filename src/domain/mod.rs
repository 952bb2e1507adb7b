pub mod analysis;
pub mod network;
pub mod optimization;
pub mod ratio;
pub mod utils;
