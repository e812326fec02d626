use crate::error::GatewayError;
use std::fmt;
use std::str::FromStr;

/// A named policy stage. The order stages wrap a handler is configuration,
/// see [`PolicyOrder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyStage {
    Idempotency,
    RateLimit,
    Timeout,
    Latency,
}

/// Idempotency runs before rate limiting so replays of a known key are
/// answered from the cache without spending the client's tokens.
pub const DEFAULT_POLICY_ORDER: [PolicyStage; 4] = [
    PolicyStage::Idempotency,
    PolicyStage::RateLimit,
    PolicyStage::Timeout,
    PolicyStage::Latency,
];

impl PolicyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyStage::Idempotency => "idempotency",
            PolicyStage::RateLimit => "rate_limit",
            PolicyStage::Timeout => "timeout",
            PolicyStage::Latency => "latency",
        }
    }
}

impl fmt::Display for PolicyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyStage {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idempotency" => Ok(PolicyStage::Idempotency),
            "rate_limit" | "ratelimit" => Ok(PolicyStage::RateLimit),
            "timeout" => Ok(PolicyStage::Timeout),
            "latency" => Ok(PolicyStage::Latency),
            other => Err(GatewayError::Configuration(format!(
                "unknown policy stage '{other}'"
            ))),
        }
    }
}

/// Ordered, duplicate-free list of stages; the first is the outermost wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOrder(Vec<PolicyStage>);

impl PolicyOrder {
    pub fn new(stages: Vec<PolicyStage>) -> Result<Self, GatewayError> {
        for (i, stage) in stages.iter().enumerate() {
            if stages[..i].contains(stage) {
                return Err(GatewayError::Configuration(format!(
                    "policy stage '{stage}' listed more than once"
                )));
            }
        }
        Ok(Self(stages))
    }

    pub fn stages(&self) -> &[PolicyStage] {
        &self.0
    }
}

impl Default for PolicyOrder {
    fn default() -> Self {
        Self(DEFAULT_POLICY_ORDER.to_vec())
    }
}

impl FromStr for PolicyOrder {
    type Err = GatewayError;

    /// Parses a comma separated list such as `idempotency,rate_limit`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stages = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if stages.is_empty() {
            return Err(GatewayError::Configuration(
                "policy order must name at least one stage".to_string(),
            ));
        }
        Self::new(stages)
    }
}

impl fmt::Display for PolicyOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(PolicyStage::as_str).collect();
        f.write_str(&names.join(","))
    }
}
