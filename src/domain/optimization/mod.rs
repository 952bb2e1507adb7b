pub mod decomposer;
pub mod demand_reducer;
pub mod formulator;
pub mod lp_writer;
pub mod model;
pub mod solver;
pub mod solver_mock;
