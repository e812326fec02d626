//! Transport-agnostic entrypoint owning the composed transfer pipeline.

use crate::command::{RequestMeta, TransferCommand, TransferResult};
use crate::context::RequestContext;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::health::{HealthChecker, HealthStatus};
use crate::idempotency::IdempotencyStore;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pipeline::{Composer, Handler, PolicyOrder};
use crate::rate_limiter::Limiter;
use crate::transfer::TransferService;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Collaborators the gateway is built from.
pub struct GatewayDeps {
    pub dispatcher: Arc<dyn Dispatcher>,
    pub limiter: Option<Arc<dyn Limiter>>,
    pub idempotency: Option<Arc<dyn IdempotencyStore<TransferResult>>>,
    pub metrics: Arc<dyn Metrics>,
    /// Zero disables the timeout stage.
    pub transfer_timeout: Duration,
    pub order: PolicyOrder,
}

pub struct Gateway {
    transfer: Handler<TransferCommand, TransferResult>,
    dispatcher: Arc<dyn Dispatcher>,
    metrics: Arc<dyn Metrics>,
    health: HealthChecker,
}

impl Gateway {
    pub fn new(deps: GatewayDeps) -> Self {
        let service = TransferService::new(Arc::clone(&deps.dispatcher));

        let mut composer = Composer::new()
            .with_metrics(Arc::clone(&deps.metrics))
            .with_timeout(deps.transfer_timeout)
            .with_order(deps.order);
        if let Some(limiter) = deps.limiter {
            composer = composer.with_limiter(limiter);
        }
        if let Some(store) = deps.idempotency {
            composer = composer.with_idempotency(store);
        }
        let transfer = composer.build(service.base_handler());

        info!(
            stages = ?composer.enabled_stages(),
            timeout_ms = deps.transfer_timeout.as_millis() as u64,
            "transfer pipeline ready"
        );

        Self {
            transfer,
            dispatcher: deps.dispatcher,
            metrics: deps.metrics,
            health: HealthChecker::new(),
        }
    }

    /// Runs one transfer through the pipeline.
    pub async fn transfer(&self, ctx: RequestContext, meta: RequestMeta, cmd: TransferCommand) -> Result<TransferResult> {
        (self.transfer)(ctx, meta, cmd).await
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_workers: self.dispatcher.active_workers(),
            queue_depth: self.dispatcher.queue_depth(),
            ..self.metrics.snapshot()
        }
    }

    pub fn health(&self) -> HealthStatus {
        self.health
            .check_health(self.dispatcher.active_workers(), self.dispatcher.queue_depth())
    }
}
