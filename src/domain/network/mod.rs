pub mod flow;
pub mod path_graph;
pub mod topology;
