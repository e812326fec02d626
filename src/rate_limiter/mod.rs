//! Admission control: per-client token buckets plus an optional global bucket.
//!
//! Lock order on every path is global bucket, then client entry. Shard locks
//! are released before either bucket lock is taken.

pub mod config;
pub mod shards;

use crate::clock::{Clock, SystemClock};
use crate::token_bucket::TokenBucket;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use config::{GlobalConfig, LimiterConfig, PerClientConfig};
pub use shards::{ClientEntry, ClientShardSet};

const COST: f64 = 1.0;

/// Admission decision for a client identity. Denial is `false`, never an error.
pub trait Limiter: Send + Sync {
    fn allow(&self, client_id: &str) -> bool;
}

/// Limiter that admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Limiter for AllowAll {
    fn allow(&self, _client_id: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LimiterStats {
    pub per_client_rate: f64,
    pub per_client_burst: u32,
    pub global_rate: f64,
    pub global_burst: u32,
    pub num_shards: usize,
    pub tracked_clients: usize,
}

/// Per-client and optional global token-bucket limiter. Safe for concurrent use.
#[derive(Debug)]
pub struct CompositeLimiter {
    clock: Arc<dyn Clock>,
    clients: Arc<ClientShardSet>,
    global: Option<Mutex<TokenBucket>>,
    config: LimiterConfig,
    stop: CancellationToken,
    cleanup_started: AtomicBool,
}

impl CompositeLimiter {
    pub fn new(config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let config = config.normalized();
        let clients = Arc::new(ClientShardSet::new(
            config.num_shards,
            Arc::clone(&clock),
            config.per_client.clone(),
        ));
        let global = config.global.as_ref().map(|g| {
            Mutex::new(TokenBucket::new(
                clock.now(),
                g.rate_per_sec,
                g.burst,
                g.initial_tokens,
            ))
        });

        Self {
            clock,
            clients,
            global,
            config,
            stop: CancellationToken::new(),
            cleanup_started: AtomicBool::new(false),
        }
    }

    pub fn with_system_clock(config: LimiterConfig) -> Self {
        Self::new(config, Arc::new(SystemClock::new()))
    }

    /// Starts the idle-client sweep. The task exits when `shutdown` is
    /// cancelled or `stop` is called. Returns `None` if already started.
    pub fn spawn_cleanup(&self, shutdown: &CancellationToken) -> Option<JoinHandle<()>> {
        if self.cleanup_started.swap(true, Ordering::SeqCst) {
            return None;
        }

        let clients = Arc::clone(&self.clients);
        let interval = self.config.cleanup_interval;
        let ttl = self.config.per_client.ttl;
        let shutdown = shutdown.clone();
        let stop = self.stop.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            debug!(interval_secs = interval.as_secs(), "limiter cleanup started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        clients.cleanup(ttl);
                    }
                }
            }
            info!("limiter cleanup stopped");
        }))
    }

    /// Stops the cleanup task. Safe to call more than once.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Runs one eviction sweep immediately.
    pub fn cleanup_now(&self) -> usize {
        self.clients.cleanup(self.config.per_client.ttl)
    }

    pub fn clients(&self) -> &ClientShardSet {
        &self.clients
    }

    pub fn stats(&self) -> LimiterStats {
        let (global_rate, global_burst) = self
            .config
            .global
            .as_ref()
            .map(|g| (g.rate_per_sec, g.burst))
            .unwrap_or((0.0, 0));

        LimiterStats {
            per_client_rate: self.config.per_client.rate_per_sec,
            per_client_burst: self.config.per_client.burst,
            global_rate,
            global_burst,
            num_shards: self.clients.num_shards(),
            tracked_clients: self.clients.len(),
        }
    }
}

impl CompositeLimiter {
    /// Charges one token against `entry` (and the global bucket, if any).
    /// Returns `None` if cleanup evicted the entry before its lock was taken.
    fn try_admit(&self, entry: &ClientEntry, now: Instant) -> Option<bool> {
        let Some(global) = &self.global else {
            let mut client = entry.lock();
            if client.evicted {
                return None;
            }
            client.last_seen = now;
            return Some(client.bucket.take(now, COST));
        };

        let mut global = global.lock();
        let mut client = entry.lock();
        if client.evicted {
            return None;
        }
        client.last_seen = now;

        let global_has = global.has_at_least(now, COST);
        let client_has = client.bucket.has_at_least(now, COST);
        if global_has && client_has {
            global.consume_no_check(COST);
            client.bucket.consume_no_check(COST);
            Some(true)
        } else {
            Some(false)
        }
    }
}

impl Limiter for CompositeLimiter {
    fn allow(&self, client_id: &str) -> bool {
        let now = self.clock.now();
        loop {
            let entry = self.clients.get_or_create(client_id);
            if let Some(admitted) = self.try_admit(&entry, now) {
                return admitted;
            }
            debug!(client_id, "client entry evicted during admission, retrying");
        }
    }
}
