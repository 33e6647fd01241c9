use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use super::match_cache::CacheKey;

/// Keys with a verifier call currently outstanding.
///
/// Claiming is an atomic check-and-insert, so at most one caller holds a
/// given key. The returned guard releases the key when dropped, whether the
/// verifier call succeeded, failed or panicked.
#[derive(Default)]
pub struct InFlightSet {
    keys: Mutex<HashSet<CacheKey>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`, or returns `None` if another caller already holds it.
    pub fn try_claim(&self, key: &CacheKey) -> Option<InFlightClaim<'_>> {
        if !self.lock().insert(key.clone()) {
            return None;
        }
        Some(InFlightClaim {
            set: self,
            key: key.clone(),
        })
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<CacheKey>> {
        self.keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[must_use = "the key is released as soon as the claim is dropped"]
pub struct InFlightClaim<'a> {
    set: &'a InFlightSet,
    key: CacheKey,
}

impl InFlightClaim<'_> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}
