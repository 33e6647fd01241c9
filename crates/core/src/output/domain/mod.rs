pub mod recording_sink;
pub mod snapshot_exporter;
pub mod surface;
