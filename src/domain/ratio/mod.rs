pub mod propagator;
pub mod ratio_table;
