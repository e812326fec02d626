use crate::command::{Command, CommandResult};
use crate::error::GatewayError;
use crate::metrics::Metrics;
use crate::pipeline::{handler_fn, Handler, Middleware};
use crate::rate_limiter::Limiter;
use std::sync::Arc;
use tracing::debug;

/// Rejects with `RateLimited` when the limiter denies the request's client.
pub fn rate_limit<C, R>(limiter: Arc<dyn Limiter>, metrics: Option<Arc<dyn Metrics>>) -> Middleware<C, R>
where
    C: Command,
    R: CommandResult,
{
    Arc::new(move |next: Handler<C, R>| {
        let limiter = Arc::clone(&limiter);
        let metrics = metrics.clone();
        handler_fn(move |ctx, meta, cmd: C| {
            let next = Arc::clone(&next);
            let admitted = limiter.allow(&meta.client_id);
            let metrics = metrics.clone();
            async move {
                if !admitted {
                    if let Some(metrics) = &metrics {
                        metrics.inc_rate_limited();
                    }
                    debug!(client_id = %meta.client_id, target = %meta.target, "rate limit exceeded");
                    return Err(GatewayError::rate_limited("rate limit exceeded"));
                }
                next(ctx, meta, cmd).await
            }
        })
    })
}
