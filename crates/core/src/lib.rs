//! Live, registry-selective face redaction.
//!
//! A detection loop samples the frame source on a slow cadence and publishes
//! observation snapshots; a compositor pass per display refresh resolves each
//! observation against the protected-identity registry through a
//! zero-knowledge verifier (memoized in a session-scoped match cache) and
//! blurs the matched regions before the frame reaches any sink.

pub mod blurring;
pub mod compositing;
pub mod detection;
pub mod matching;
pub mod output;
pub mod session;
pub mod shared;
pub mod stream;
