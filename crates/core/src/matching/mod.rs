pub mod domain;
pub mod infrastructure;
pub mod match_engine;
