use crate::config::Config;
use crate::error::GatewayError;
use crate::pipeline::PolicyOrder;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Runs every check against a loaded configuration.
    pub fn validate(config: &Config) -> Result<(), GatewayError> {
        Self::validate_log_level(&config.log_level)?;
        Self::validate_bucket("client", config.client_rate, config.client_burst)?;
        if config.global_rate > 0.0 {
            Self::validate_bucket("global", config.global_rate, config.global_burst)?;
        }
        Self::validate_policy_order(&config.policy_order)?;
        Self::validate_positive("LIMITER_SHARDS", config.limiter_shards)?;
        Self::validate_positive("WORKERS", config.workers)?;
        Self::validate_positive("QUEUE_CAPACITY", config.queue_capacity)?;
        Self::validate_positive("MAX_IN_FLIGHT", config.max_in_flight)?;
        Self::validate_positive("MAX_BODY_BYTES", config.max_body_bytes)?;
        Ok(())
    }

    /// A limited bucket needs room for at least one token.
    pub fn validate_bucket(name: &str, rate: f64, burst: u32) -> Result<(), GatewayError> {
        if !rate.is_finite() {
            return Err(GatewayError::Configuration(format!(
                "{name} rate must be a finite number"
            )));
        }
        if rate > 0.0 && burst < 1 {
            return Err(GatewayError::Configuration(format!(
                "{name} burst must be at least 1 when {name} rate is positive"
            )));
        }
        Ok(())
    }

    pub fn validate_policy_order(order: &str) -> Result<(), GatewayError> {
        order.parse::<PolicyOrder>().map(|_| ())
    }

    pub fn validate_log_level(level: &str) -> Result<(), GatewayError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(GatewayError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {:?}",
                level, valid_levels
            )));
        }
        Ok(())
    }

    fn validate_positive(name: &str, value: usize) -> Result<(), GatewayError> {
        if value == 0 {
            return Err(GatewayError::Configuration(format!(
                "{name} must be greater than 0"
            )));
        }
        Ok(())
    }
}
