use serde::{Deserialize, Serialize};
use std::time::SystemTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_workers: u64,
    pub queue_depth: u64,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

#[derive(Debug, Default)]
pub struct HealthChecker;

impl HealthChecker {
    pub fn new() -> Self {
        // pin the uptime origin to the first checker, not the first health request
        let _ = *START_TIME;
        Self
    }

    pub fn check_health(&self, active_workers: u64, queue_depth: u64) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME).unwrap_or_default().as_secs();

        HealthStatus {
            status: "healthy".to_string(),
            timestamp: now
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            active_workers,
            queue_depth,
        }
    }
}
