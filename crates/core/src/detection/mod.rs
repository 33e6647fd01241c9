pub mod detection_loop;
pub mod domain;
pub mod infrastructure;
