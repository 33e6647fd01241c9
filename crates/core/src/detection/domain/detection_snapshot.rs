use std::time::Instant;

use super::observation::Observation;

/// The full set of observations from one detection cycle.
///
/// Snapshots are replaced wholesale; `id` identifies which cycle produced the
/// observations so match decisions can be paired with the exact snapshot
/// they were computed against. Id 0 is the empty snapshot a session starts
/// with.
#[derive(Clone, Debug)]
pub struct DetectionSnapshot {
    pub id: u64,
    pub observations: Vec<Observation>,
    pub captured_at: Instant,
}

impl DetectionSnapshot {
    pub fn new(id: u64, observations: Vec<Observation>, captured_at: Instant) -> Self {
        Self {
            id,
            observations,
            captured_at,
        }
    }

    pub fn empty() -> Self {
        Self::new(0, Vec::new(), Instant::now())
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
