pub mod ffmpeg_frame_stream;
pub mod mjpeg_frame_stream;
pub mod still_image_stream;
pub mod threaded_frame_source;
