pub mod distance_verifier;
pub mod http_verifier;
pub mod json_registry;
