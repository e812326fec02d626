use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_NUM_SHARDS: usize = 64;
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CLIENT_TTL: Duration = Duration::from_secs(600);

/// Per-client token bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerClientConfig {
    /// Tokens added per second. Zero or negative means unlimited.
    pub rate_per_sec: f64,
    /// Maximum bucket size.
    pub burst: u32,
    /// Seed for new client buckets; non-positive means `burst`.
    #[serde(default)]
    pub initial_tokens: f64,
    /// Idle clients are evicted after this long without contact.
    #[serde(with = "humantime_serde", default = "default_ttl")]
    pub ttl: Duration,
}

/// Settings for the optional bucket shared by every client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub rate_per_sec: f64,
    pub burst: u32,
    #[serde(default)]
    pub initial_tokens: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub per_client: PerClientConfig,
    /// `None` disables global limiting.
    #[serde(default)]
    pub global: Option<GlobalConfig>,
    #[serde(default = "default_num_shards")]
    pub num_shards: usize,
    #[serde(with = "humantime_serde", default = "default_cleanup_interval")]
    pub cleanup_interval: Duration,
}

fn default_ttl() -> Duration {
    DEFAULT_CLIENT_TTL
}

fn default_num_shards() -> usize {
    DEFAULT_NUM_SHARDS
}

fn default_cleanup_interval() -> Duration {
    DEFAULT_CLEANUP_INTERVAL
}

impl Default for PerClientConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 10.0,
            burst: 20,
            initial_tokens: 0.0,
            ttl: DEFAULT_CLIENT_TTL,
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            per_client: PerClientConfig::default(),
            global: None,
            num_shards: DEFAULT_NUM_SHARDS,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl LimiterConfig {
    pub fn per_client(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            per_client: PerClientConfig {
                rate_per_sec,
                burst,
                ..PerClientConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn with_global(mut self, rate_per_sec: f64, burst: u32) -> Self {
        self.global = Some(GlobalConfig {
            rate_per_sec,
            burst,
            initial_tokens: 0.0,
        });
        self
    }

    pub fn with_shards(mut self, num_shards: usize) -> Self {
        self.num_shards = num_shards;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.per_client.ttl = ttl;
        self
    }

    /// Replaces zero values with their defaults.
    pub fn normalized(mut self) -> Self {
        if self.num_shards == 0 {
            self.num_shards = DEFAULT_NUM_SHARDS;
        }
        if self.cleanup_interval.is_zero() {
            self.cleanup_interval = DEFAULT_CLEANUP_INTERVAL;
        }
        if self.per_client.ttl.is_zero() {
            self.per_client.ttl = DEFAULT_CLIENT_TTL;
        }
        self
    }
}
