pub mod compositor;
pub mod outline;
pub mod stats;
