use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::detection::domain::detection_snapshot::DetectionSnapshot;
use crate::detection::domain::observation::Observation;
use crate::matching::domain::face_verifier::FaceVerifier;
use crate::matching::domain::in_flight::InFlightSet;
use crate::matching::domain::match_cache::{CacheKey, CachePolicy, MatchCache};
use crate::matching::domain::quantize::{quantize, QuantizedDescriptor};
use crate::matching::domain::registry::RegistryEntry;

/// Blur decision for one observation in one pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchDecision {
    Matched { registry_id: String },
    Unmatched,
    /// A verifier call for one of this observation's entries is outstanding
    /// in another pass and no cached entry matched. Not blurred this pass;
    /// the next pass picks up the cached result.
    Pending,
}

impl MatchDecision {
    pub fn should_blur(&self) -> bool {
        matches!(self, MatchDecision::Matched { .. })
    }
}

/// Decisions for every observation of one snapshot, in observation order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub snapshot_id: u64,
    pub decisions: Vec<MatchDecision>,
}

impl Resolution {
    pub fn matched_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.should_blur()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| **d == MatchDecision::Pending)
            .count()
    }
}

/// Resolves observations against the registry with as few verifier calls
/// as possible.
///
/// Shared between compositor workers; `resolve` may run concurrently from
/// several threads. At most one verifier call per cache key is outstanding
/// at any time.
pub struct MatchEngine {
    verifier: Arc<dyn FaceVerifier>,
    cache: MatchCache,
    in_flight: InFlightSet,
    verifier_calls: AtomicU64,
    verifier_failures: AtomicU64,
}

impl MatchEngine {
    pub fn new(verifier: Arc<dyn FaceVerifier>, cache_policy: CachePolicy) -> Self {
        Self {
            verifier,
            cache: MatchCache::new(cache_policy),
            in_flight: InFlightSet::new(),
            verifier_calls: AtomicU64::new(0),
            verifier_failures: AtomicU64::new(0),
        }
    }

    pub fn resolve(&self, snapshot: &DetectionSnapshot, registry: &[RegistryEntry]) -> Resolution {
        let candidates: Vec<(&RegistryEntry, QuantizedDescriptor)> = registry
            .iter()
            .map(|entry| (entry, quantize(&entry.descriptor)))
            .collect();

        let decisions = snapshot
            .observations
            .iter()
            .map(|observation| self.resolve_observation(observation, &candidates))
            .collect();

        Resolution {
            snapshot_id: snapshot.id,
            decisions,
        }
    }

    fn resolve_observation(
        &self,
        observation: &Observation,
        candidates: &[(&RegistryEntry, QuantizedDescriptor)],
    ) -> MatchDecision {
        if candidates.is_empty() {
            return MatchDecision::Unmatched;
        }
        let query = Arc::new(quantize(&observation.descriptor));
        // Set once an earlier entry is awaiting another pass's verifier call.
        // Later entries may then only match from the cache, so no new call
        // can jump ahead of the undecided one.
        let mut pending = false;

        for (entry, candidate) in candidates {
            let key = CacheKey::new(query.clone(), &entry.id);

            if self.cache.is_proven(&key) {
                log::debug!("Cache hit for {key}");
                return matched(entry);
            }
            if pending {
                continue;
            }

            let Some(claim) = self.in_flight.try_claim(&key) else {
                log::trace!("Verification of {key} already in flight");
                pending = true;
                continue;
            };

            // Another pass may have cached the key between the lookup and the claim.
            if self.cache.is_proven(&key) {
                return matched(entry);
            }

            log::debug!("Requesting proof for {key}");
            self.verifier_calls.fetch_add(1, Ordering::Relaxed);
            match self.verifier.verify(&query, candidate) {
                Ok(outcome) if outcome.is_match() => {
                    log::info!("Match proven for registry entry {:?}", entry.id);
                    self.cache.insert_proven(key);
                    drop(claim);
                    return matched(entry);
                }
                Ok(_) => {}
                Err(e) => {
                    self.verifier_failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!("Proof failed for {key}: {e}");
                }
            }
        }
        if pending {
            MatchDecision::Pending
        } else {
            MatchDecision::Unmatched
        }
    }

    /// Total verifier invocations issued by this engine.
    pub fn verifier_calls(&self) -> u64 {
        self.verifier_calls.load(Ordering::Relaxed)
    }

    pub fn verifier_failures(&self) -> u64 {
        self.verifier_failures.load(Ordering::Relaxed)
    }

    pub fn cached_matches(&self) -> usize {
        self.cache.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

fn matched(entry: &RegistryEntry) -> MatchDecision {
    MatchDecision::Matched {
        registry_id: entry.id.clone(),
    }
}
