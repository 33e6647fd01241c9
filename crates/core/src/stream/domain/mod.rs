pub mod feed;
pub mod frame_source;
pub mod source_descriptor;
