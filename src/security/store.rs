//! Counter storage behind the rate limiter.
//!
//! # Responsibilities
//! - Define the key-value contract the limiter needs (`get`, `increment`, `expire`)
//! - Provide the in-process implementation on a sharded map
//!
//! # Design Decisions
//! - `increment` is atomic per key; distinct keys live in different shards
//!   and do not contend
//! - Expired entries read as absent and restart at zero on the next increment
//! - Memory is bounded by sweeping expired keys from a background task
//! - Operations are async so a shared network store fits the same trait

use dashmap::DashMap;
use futures_util::future::{self, BoxFuture, FutureExt};
use std::time::{Duration, SystemTime};

/// Error raised by a counter store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("expiry {0:?} is past the representable time range")]
    OutOfRange(Duration),
}

/// A counter value and when it lapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub count: u64,
    /// `None` until `expire` has been called for the key.
    pub expires_at: Option<SystemTime>,
}

/// Key-value counter storage.
pub trait CounterStore: Send + Sync {
    /// Current live counter for `key`.
    fn get<'a>(
        &'a self,
        key: &'a str,
        now: SystemTime,
    ) -> BoxFuture<'a, Result<Option<Counter>, StoreError>>;

    /// Atomically add one and return the new value. A missing or expired key
    /// starts again at one with no expiry.
    fn increment<'a>(
        &'a self,
        key: &'a str,
        now: SystemTime,
    ) -> BoxFuture<'a, Result<Counter, StoreError>>;

    /// Set `key` to lapse `ttl` after `now`. Returns false when the key is absent.
    fn expire<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
        now: SystemTime,
    ) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Drop lapsed keys. Stores with native expiry need not override this.
    fn purge_expired(&self, _now: SystemTime) -> usize {
        0
    }

    /// Number of keys held, when the store can tell cheaply.
    fn tracked_keys(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    count: u64,
    expires_at: Option<SystemTime>,
}

impl Slot {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    fn counter(&self) -> Counter {
        Counter {
            count: self.count,
            expires_at: self.expires_at,
        }
    }
}

/// In-process counter store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl CounterStore for MemoryStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
        now: SystemTime,
    ) -> BoxFuture<'a, Result<Option<Counter>, StoreError>> {
        let counter = self
            .slots
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.counter());
        future::ready(Ok(counter)).boxed()
    }

    fn increment<'a>(
        &'a self,
        key: &'a str,
        now: SystemTime,
    ) -> BoxFuture<'a, Result<Counter, StoreError>> {
        // The entry guard holds the shard lock for the read-modify-write.
        let mut slot = self.slots.entry(key.to_owned()).or_default();
        if slot.is_expired(now) {
            *slot = Slot::default();
        }
        slot.count += 1;
        let counter = slot.counter();
        drop(slot);
        future::ready(Ok(counter)).boxed()
    }

    fn expire<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
        now: SystemTime,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        let Some(expires_at) = now.checked_add(ttl) else {
            return future::ready(Err(StoreError::OutOfRange(ttl))).boxed();
        };
        let found = match self.slots.get_mut(key) {
            Some(mut slot) => {
                slot.expires_at = Some(expires_at);
                true
            }
            None => false,
        };
        future::ready(Ok(found)).boxed()
    }

    fn purge_expired(&self, now: SystemTime) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.slots.len())
    }

    fn tracked_keys(&self) -> Option<usize> {
        Some(self.slots.len())
    }
}
