pub mod live_session;
pub mod render_loop;
pub mod session_config;
pub mod session_logger;
