use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use lru::LruCache;
use thiserror::Error;

/// Default maximum number of entries held by an `LruStore`.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000_000;
/// Default maximum aggregate cost (bytes of key + value) of an `LruStore`.
pub const DEFAULT_MAX_COST: u64 = 1 << 30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("entry cost {cost} exceeds store capacity {max_cost}")]
    TooLarge { cost: u64, max_cost: u64 },
}

/// Node-local key/value storage.
///
/// Implementations synchronize internally; handlers call them concurrently.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Bytes>;

    /// Once this returns `Ok`, a following `get` on the same store sees `value`.
    fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    /// Returns whether an entry was removed. Removing an absent key is fine.
    fn delete(&self, key: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LruStoreConfig {
    pub max_entries: usize,
    pub max_cost: u64,
}

impl Default for LruStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_cost: DEFAULT_MAX_COST,
        }
    }
}

struct LruState {
    entries: LruCache<String, Bytes>,
    cost: u64,
}

/// Capacity-bounded store evicting least recently used entries.
pub struct LruStore {
    state: Mutex<LruState>,
    config: LruStoreConfig,
}

fn entry_cost(key: &str, value: &Bytes) -> u64 {
    (key.len() + value.len()) as u64
}

impl LruStore {
    pub fn new(config: LruStoreConfig) -> Self {
        Self {
            state: Mutex::new(LruState {
                entries: LruCache::unbounded(),
                cost: 0,
            }),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate cost of the stored entries.
    pub fn cost(&self) -> u64 {
        self.lock().cost
    }

    pub fn config(&self) -> LruStoreConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for LruStore {
    fn default() -> Self {
        Self::new(LruStoreConfig::default())
    }
}

impl LocalStore for LruStore {
    fn get(&self, key: &str) -> Option<Bytes> {
        self.lock().entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let cost = entry_cost(key, &value);
        if cost > self.config.max_cost || self.config.max_entries == 0 {
            return Err(StoreError::TooLarge {
                cost,
                max_cost: self.config.max_cost,
            });
        }

        let mut state = self.lock();
        if let Some(old) = state.entries.put(key.to_string(), value) {
            state.cost -= entry_cost(key, &old);
        }
        state.cost += cost;

        while state.entries.len() > self.config.max_entries || state.cost > self.config.max_cost {
            match state.entries.pop_lru() {
                Some((evicted_key, evicted)) => {
                    state.cost -= entry_cost(&evicted_key, &evicted);
                }
                None => break,
            }
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> bool {
        let mut state = self.lock();
        match state.entries.pop(key) {
            Some(old) => {
                state.cost -= entry_cost(key, &old);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{LocalStore, LruStore, LruStoreConfig, StoreError};

    #[test]
    fn set_then_get_then_delete() {
        let store = LruStore::default();
        store.set("k", Bytes::from_static(b"v1")).expect("set");
        assert_eq!(store.get("k"), Some(Bytes::from_static(b"v1")));

        store.set("k", Bytes::from_static(b"v2")).expect("overwrite");
        assert_eq!(store.get("k"), Some(Bytes::from_static(b"v2")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.cost(), 3);

        assert!(store.delete("k"));
        assert_eq!(store.get("k"), None);
        assert!(!store.delete("k"), "second delete removes nothing");
        assert_eq!(store.cost(), 0);
    }

    #[test]
    fn entry_bound_evicts_least_recently_used() {
        let store = LruStore::new(LruStoreConfig {
            max_entries: 2,
            max_cost: 1 << 20,
        });
        store.set("a", Bytes::from_static(b"1")).expect("a");
        store.set("b", Bytes::from_static(b"2")).expect("b");
        // Touch `a` so `b` becomes the eviction victim.
        assert!(store.get("a").is_some());
        store.set("c", Bytes::from_static(b"3")).expect("c");

        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn cost_bound_evicts_until_it_holds() {
        let store = LruStore::new(LruStoreConfig {
            max_entries: 100,
            max_cost: 10,
        });
        store.set("a", Bytes::from(vec![0_u8; 4])).expect("a");
        store.set("b", Bytes::from(vec![0_u8; 4])).expect("b");
        assert_eq!(store.cost(), 10);

        store.set("c", Bytes::from(vec![0_u8; 2])).expect("c");
        assert!(store.cost() <= 10);
        assert!(store.get("a").is_none());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn oversized_write_is_rejected_without_side_effects() {
        let store = LruStore::new(LruStoreConfig {
            max_entries: 10,
            max_cost: 8,
        });
        store.set("a", Bytes::from_static(b"1")).expect("a");
        let err = store
            .set("big", Bytes::from(vec![0_u8; 16]))
            .expect_err("oversized value must be rejected");
        assert_eq!(
            err,
            StoreError::TooLarge {
                cost: 19,
                max_cost: 8
            }
        );
        assert!(store.get("a").is_some());
        assert!(store.get("big").is_none());
    }

    #[test]
    fn error_messages_are_stable() {
        let err = StoreError::TooLarge {
            cost: 5,
            max_cost: 4,
        };
        assert_eq!(err.to_string(), "entry cost 5 exceeds store capacity 4");
    }
}
