use crate::command::{Command, CommandResult, Idempotent};
use crate::idempotency::IdempotencyStore;
use crate::metrics::{Metrics, NoopMetrics};
use crate::pipeline::counters::{count_requests, count_success};
use crate::pipeline::idempotency::idempotency;
use crate::pipeline::latency::latency;
use crate::pipeline::rate_limit::rate_limit;
use crate::pipeline::timeout::timeout;
use crate::pipeline::{chain, Handler, Middleware, PolicyOrder, PolicyStage};
use crate::rate_limiter::Limiter;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type IdempotencyFactory<C, R> = Arc<dyn Fn(Option<Arc<dyn Metrics>>) -> Middleware<C, R> + Send + Sync>;

/// Assembles the policy pipeline for one command/result pair.
///
/// Each stage is enabled by its dependency: an idempotency store, a limiter,
/// a non-zero timeout, or a metrics sink for latency. Request and success
/// counters always wrap the whole chain.
pub struct Composer<C, R> {
    metrics: Option<Arc<dyn Metrics>>,
    limiter: Option<Arc<dyn Limiter>>,
    idempotency: Option<IdempotencyFactory<C, R>>,
    timeout: Duration,
    order: PolicyOrder,
}

impl<C: Command, R: CommandResult> Default for Composer<C, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Command, R: CommandResult> Composer<C, R> {
    pub fn new() -> Self {
        Self {
            metrics: None,
            limiter: None,
            idempotency: None,
            timeout: Duration::ZERO,
            order: PolicyOrder::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn Limiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_order(mut self, order: PolicyOrder) -> Self {
        self.order = order;
        self
    }

    /// Stages that are both listed in the order and have their dependency.
    pub fn enabled_stages(&self) -> Vec<PolicyStage> {
        self.order
            .stages()
            .iter()
            .copied()
            .filter(|stage| match stage {
                PolicyStage::Idempotency => self.idempotency.is_some(),
                PolicyStage::RateLimit => self.limiter.is_some(),
                PolicyStage::Timeout => !self.timeout.is_zero(),
                PolicyStage::Latency => self.metrics.is_some(),
            })
            .collect()
    }

    pub fn build(&self, base: Handler<C, R>) -> Handler<C, R> {
        let counters: Arc<dyn Metrics> = match &self.metrics {
            Some(metrics) => Arc::clone(metrics),
            None => Arc::new(NoopMetrics),
        };

        let stages = self.enabled_stages();
        let mut middlewares: Vec<Middleware<C, R>> = Vec::with_capacity(stages.len() + 2);
        middlewares.push(count_requests(Arc::clone(&counters)));
        middlewares.push(count_success(counters));

        for stage in &stages {
            let middleware = match stage {
                PolicyStage::Idempotency => self
                    .idempotency
                    .as_ref()
                    .map(|factory| factory(self.metrics.clone())),
                PolicyStage::RateLimit => self
                    .limiter
                    .as_ref()
                    .map(|limiter| rate_limit(Arc::clone(limiter), self.metrics.clone())),
                PolicyStage::Timeout => Some(timeout(self.timeout, self.metrics.clone())),
                PolicyStage::Latency => self.metrics.as_ref().map(|metrics| latency(Arc::clone(metrics))),
            };
            middlewares.extend(middleware);
        }

        debug!(
            stages = %stages.iter().map(PolicyStage::as_str).collect::<Vec<_>>().join(","),
            "composed pipeline"
        );
        chain(base, &middlewares)
    }
}

impl<C: Command + Idempotent, R: CommandResult> Composer<C, R> {
    pub fn with_idempotency(mut self, store: Arc<dyn IdempotencyStore<R>>) -> Self {
        let factory: IdempotencyFactory<C, R> =
            Arc::new(move |metrics: Option<Arc<dyn Metrics>>| idempotency(Arc::clone(&store), metrics));
        self.idempotency = Some(factory);
        self
    }
}
