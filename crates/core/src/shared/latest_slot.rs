use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

/// Creates a single-slot, latest-wins mailbox.
///
/// The writer half is not `Clone`, so there is exactly one producer. The
/// writer takes a short mutex to swap in the new `Arc`; that lock only ever
/// guards the pointer swap. Readers never wait on it: they `try_lock`, and
/// while the writer holds the lock they return the last value they saw. A
/// value is always observed whole or not at all.
pub fn latest_slot<T>(initial: T) -> (SlotWriter<T>, SlotReader<T>) {
    let initial = Arc::new(initial);
    let shared = Arc::new(Shared {
        current: Mutex::new(initial.clone()),
        version: AtomicU64::new(0),
    });
    (
        SlotWriter {
            shared: shared.clone(),
        },
        SlotReader {
            shared,
            cached: initial,
            cached_version: 0,
        },
    )
}

struct Shared<T> {
    current: Mutex<Arc<T>>,
    version: AtomicU64,
}

pub struct SlotWriter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> SlotWriter<T> {
    /// Replaces the slot's value wholesale. Holds the slot lock only for
    /// the swap.
    pub fn publish(&self, value: T) {
        let value = Arc::new(value);
        let mut current = self
            .shared
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = value;
        self.shared.version.fetch_add(1, Ordering::Release);
    }

    /// Number of values published so far.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::Acquire)
    }
}

pub struct SlotReader<T> {
    shared: Arc<Shared<T>>,
    cached: Arc<T>,
    cached_version: u64,
}

impl<T> Clone for SlotReader<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            cached: self.cached.clone(),
            cached_version: self.cached_version,
        }
    }
}

impl<T> SlotReader<T> {
    /// Returns the most recent value this reader can see without waiting.
    pub fn latest(&mut self) -> Arc<T> {
        if self.shared.version.load(Ordering::Acquire) == self.cached_version {
            return self.cached.clone();
        }
        let guard = match self.shared.current.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return self.cached.clone(),
        };
        self.cached = guard.clone();
        self.cached_version = self.shared.version.load(Ordering::Acquire);
        drop(guard);
        self.cached.clone()
    }

    /// Version of the value most recently returned by [`latest`](Self::latest).
    pub fn seen_version(&self) -> u64 {
        self.cached_version
    }
}
