use crate::dispatcher::WorkerPoolConfig;
use crate::error::Result;
use crate::pipeline::PolicyOrder;
use crate::rate_limiter::{GlobalConfig, LimiterConfig, PerClientConfig};
use envconfig::Envconfig;
use humantime_serde::re::humantime::Duration as HumanDuration;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:8080")]
    pub bind_addr: SocketAddr,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// Per-client refill rate in tokens per second; zero disables client limiting
    #[envconfig(from = "CLIENT_RATE", default = "10.0")]
    pub client_rate: f64,

    #[envconfig(from = "CLIENT_BURST", default = "20")]
    pub client_burst: u32,

    /// Zero seeds new clients with a full bucket
    #[envconfig(from = "CLIENT_INITIAL_TOKENS", default = "0")]
    pub client_initial_tokens: f64,

    #[envconfig(from = "CLIENT_TTL", default = "10m")]
    pub client_ttl: HumanDuration,

    /// Zero means no global bucket
    #[envconfig(from = "GLOBAL_RATE", default = "0")]
    pub global_rate: f64,

    #[envconfig(from = "GLOBAL_BURST", default = "0")]
    pub global_burst: u32,

    #[envconfig(from = "GLOBAL_INITIAL_TOKENS", default = "0")]
    pub global_initial_tokens: f64,

    #[envconfig(from = "LIMITER_SHARDS", default = "64")]
    pub limiter_shards: usize,

    #[envconfig(from = "CLEANUP_INTERVAL", default = "1m")]
    pub cleanup_interval: HumanDuration,

    /// Deadline for one transfer; zero disables the timeout stage
    #[envconfig(from = "TRANSFER_TIMEOUT", default = "2s")]
    pub transfer_timeout: HumanDuration,

    #[envconfig(from = "POLICY_ORDER", default = "idempotency,rate_limit,timeout,latency")]
    pub policy_order: String,

    #[envconfig(from = "MAX_BODY_BYTES", default = "1048576")]
    pub max_body_bytes: usize,

    #[envconfig(from = "MAX_IN_FLIGHT", default = "1024")]
    pub max_in_flight: usize,

    #[envconfig(from = "WORKERS", default = "8")]
    pub workers: usize,

    #[envconfig(from = "QUEUE_CAPACITY", default = "1024")]
    pub queue_capacity: usize,

    /// Simulated processing time per transfer
    #[envconfig(from = "WORK_DELAY", default = "0ms")]
    pub work_delay: HumanDuration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> std::result::Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    /// Builds a configuration from an explicit variable map, ignoring the
    /// process environment.
    pub fn from_map(vars: &std::collections::HashMap<String, String>) -> std::result::Result<Self, envconfig::Error> {
        Config::init_from_hashmap(vars)
    }

    pub fn validate(&self) -> Result<()> {
        crate::config_validator::ConfigValidator::validate(self)
    }

    pub fn limiter_config(&self) -> LimiterConfig {
        let global = (self.global_rate > 0.0).then(|| GlobalConfig {
            rate_per_sec: self.global_rate,
            burst: self.global_burst,
            initial_tokens: self.global_initial_tokens,
        });

        LimiterConfig {
            per_client: PerClientConfig {
                rate_per_sec: self.client_rate,
                burst: self.client_burst,
                initial_tokens: self.client_initial_tokens,
                ttl: self.client_ttl.into(),
            },
            global,
            num_shards: self.limiter_shards,
            cleanup_interval: self.cleanup_interval.into(),
        }
        .normalized()
    }

    pub fn policy_order(&self) -> Result<PolicyOrder> {
        self.policy_order.parse()
    }

    pub fn transfer_timeout(&self) -> Duration {
        self.transfer_timeout.into()
    }

    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            work_delay: self.work_delay.into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            client_rate: 10.0,
            client_burst: 20,
            client_initial_tokens: 0.0,
            client_ttl: Duration::from_secs(600).into(),
            global_rate: 0.0,
            global_burst: 0,
            global_initial_tokens: 0.0,
            limiter_shards: 64,
            cleanup_interval: Duration::from_secs(60).into(),
            transfer_timeout: Duration::from_secs(2).into(),
            policy_order: PolicyOrder::default().to_string(),
            max_body_bytes: 1024 * 1024,
            max_in_flight: 1024,
            workers: 8,
            queue_capacity: 1024,
            work_delay: Duration::ZERO.into(),
        }
    }
}
