use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::quantize::QuantizedDescriptor;

/// Identifies one (observation descriptor, registry identity) comparison.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    descriptor: Arc<QuantizedDescriptor>,
    registry_id: String,
}

impl CacheKey {
    pub fn new(descriptor: Arc<QuantizedDescriptor>, registry_id: &str) -> Self {
        Self {
            descriptor,
            registry_id: registry_id.to_string(),
        }
    }

    pub fn descriptor(&self) -> &QuantizedDescriptor {
        &self.descriptor
    }

    pub fn registry_id(&self) -> &str {
        &self.registry_id
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}|{}", self.descriptor.fingerprint(), self.registry_id)
    }
}

/// Retention policy for proven matches.
///
/// The default keeps every entry for the session. The bounded variants exist
/// for long-running deployments and must be chosen explicitly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CachePolicy {
    #[default]
    Unbounded,
    /// Entries expire this long after insertion.
    Ttl { seconds: u64 },
    /// At most `capacity` entries; the least recently hit is evicted first.
    Lru { capacity: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchCacheEntry {
    pub proven: bool,
}

struct Slot {
    entry: MatchCacheEntry,
    inserted_at: Instant,
    last_hit: u64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<CacheKey, Slot>,
    clock: u64,
}

/// Session-scoped record of comparisons the verifier has proven.
///
/// Only positive results are stored. Inserts are idempotent: a key that is
/// already present keeps its original entry, so concurrent writers racing
/// on the same key are harmless.
pub struct MatchCache {
    policy: CachePolicy,
    state: Mutex<CacheState>,
}

impl MatchCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<MatchCacheEntry> {
        let mut state = self.lock();
        state.clock += 1;
        let clock = state.clock;

        let expired = match (self.policy, state.slots.get(key)) {
            (_, None) => return None,
            (CachePolicy::Ttl { seconds }, Some(slot)) => {
                slot.inserted_at.elapsed() >= Duration::from_secs(seconds)
            }
            _ => false,
        };
        if expired {
            state.slots.remove(key);
            return None;
        }

        let slot = state.slots.get_mut(key)?;
        slot.last_hit = clock;
        Some(slot.entry)
    }

    pub fn is_proven(&self, key: &CacheKey) -> bool {
        self.lookup(key).is_some_and(|entry| entry.proven)
    }

    /// Records a proven match. Returns false if the key was already cached.
    pub fn insert_proven(&self, key: CacheKey) -> bool {
        let mut state = self.lock();
        if state.slots.contains_key(&key) {
            return false;
        }
        if let CachePolicy::Lru { capacity } = self.policy {
            while state.slots.len() >= capacity.max(1) {
                let Some(oldest) = state
                    .slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.last_hit)
                    .map(|(key, _)| key.clone())
                else {
                    break;
                };
                log::debug!("Evicting cached match {oldest}");
                state.slots.remove(&oldest);
            }
        }
        state.clock += 1;
        let clock = state.clock;
        state.slots.insert(
            key,
            Slot {
                entry: MatchCacheEntry { proven: true },
                inserted_at: Instant::now(),
                last_hit: clock,
            },
        );
        true
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MatchCache {
    fn default() -> Self {
        Self::new(CachePolicy::Unbounded)
    }
}
