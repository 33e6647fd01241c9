pub mod ffmpeg_recorder;
pub mod jpeg_exporter;
