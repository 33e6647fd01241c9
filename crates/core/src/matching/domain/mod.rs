pub mod face_verifier;
pub mod in_flight;
pub mod match_cache;
pub mod quantize;
pub mod registry;
