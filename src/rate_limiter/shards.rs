//! Sharded map from client identity to that client's token bucket.
//!
//! Shard locks are held only while looking up, inserting or evicting
//! entries. Token decisions lock the entry itself.

use crate::clock::Clock;
use crate::rate_limiter::config::PerClientConfig;
use crate::token_bucket::TokenBucket;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Mutable state of one client, guarded by the entry lock.
#[derive(Debug)]
pub struct ClientState {
    pub bucket: TokenBucket,
    pub last_seen: Instant,
    /// Set once cleanup has removed this entry from its shard. Holders of a
    /// stale handle must look the client up again.
    pub evicted: bool,
}

#[derive(Debug)]
pub struct ClientEntry {
    state: Mutex<ClientState>,
}

impl ClientEntry {
    fn new(bucket: TokenBucket, now: Instant) -> Self {
        Self {
            state: Mutex::new(ClientState {
                bucket,
                last_seen: now,
                evicted: false,
            }),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock()
    }
}

#[derive(Debug, Default)]
struct Shard {
    entries: RwLock<HashMap<String, Arc<ClientEntry>>>,
}

#[derive(Debug)]
pub struct ClientShardSet {
    shards: Box<[Shard]>,
    hasher: RandomState,
    clock: Arc<dyn Clock>,
    config: PerClientConfig,
}

impl ClientShardSet {
    pub fn new(num_shards: usize, clock: Arc<dyn Clock>, config: PerClientConfig) -> Self {
        let shards = (0..num_shards.max(1)).map(|_| Shard::default()).collect();
        Self {
            shards,
            hasher: RandomState::new(),
            clock,
            config,
        }
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Shard index for `client_id`. Stable for the lifetime of this set.
    pub fn shard_index(&self, client_id: &str) -> usize {
        (self.hasher.hash_one(client_id) % self.shards.len() as u64) as usize
    }

    /// Returns the client's entry, creating it on first contact.
    pub fn get_or_create(&self, client_id: &str) -> Arc<ClientEntry> {
        let shard = &self.shards[self.shard_index(client_id)];

        if let Some(entry) = shard.entries.read().get(client_id) {
            return Arc::clone(entry);
        }

        let mut entries = shard.entries.write();
        // another caller may have inserted while we waited for the write lock
        if let Some(entry) = entries.get(client_id) {
            return Arc::clone(entry);
        }

        let now = self.clock.now();
        let entry = Arc::new(ClientEntry::new(self.new_bucket(now), now));
        entries.insert(client_id.to_string(), Arc::clone(&entry));
        entry
    }

    fn new_bucket(&self, now: Instant) -> TokenBucket {
        let capacity = f64::from(self.config.burst.max(1));
        let initial = if self.config.initial_tokens <= 0.0 {
            capacity
        } else {
            self.config.initial_tokens.clamp(1.0, capacity)
        };
        TokenBucket::new(now, self.config.rate_per_sec, self.config.burst, initial)
    }

    /// Evicts entries idle for at least `ttl`; returns how many were removed.
    pub fn cleanup(&self, ttl: Duration) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;

        for shard in self.shards.iter() {
            let mut entries = shard.entries.write();
            let before = entries.len();
            entries.retain(|_, entry| {
                let mut state = entry.lock();
                let keep = now.saturating_duration_since(state.last_seen) < ttl;
                state.evicted = !keep;
                keep
            });
            evicted += before - entries.len();
        }

        if evicted > 0 {
            debug!(evicted, ttl_secs = ttl.as_secs(), "evicted idle client buckets");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.entries.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.shards[self.shard_index(client_id)]
            .entries
            .read()
            .contains_key(client_id)
    }
}
