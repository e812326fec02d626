use crate::command::{Command, CommandResult};
use crate::metrics::Metrics;
use crate::pipeline::{handler_fn, Handler, Middleware};
use std::sync::Arc;

/// Counts every request that enters the pipeline.
pub fn count_requests<C, R>(metrics: Arc<dyn Metrics>) -> Middleware<C, R>
where
    C: Command,
    R: CommandResult,
{
    Arc::new(move |next: Handler<C, R>| {
        let metrics = Arc::clone(&metrics);
        handler_fn(move |ctx, meta, cmd: C| {
            metrics.inc_request();
            next(ctx, meta, cmd)
        })
    })
}

/// Counts requests that leave the pipeline with `Ok`, including replays.
pub fn count_success<C, R>(metrics: Arc<dyn Metrics>) -> Middleware<C, R>
where
    C: Command,
    R: CommandResult,
{
    Arc::new(move |next: Handler<C, R>| {
        let metrics = Arc::clone(&metrics);
        handler_fn(move |ctx, meta, cmd: C| {
            let next = Arc::clone(&next);
            let metrics = Arc::clone(&metrics);
            async move {
                let result = next(ctx, meta, cmd).await;
                if result.is_ok() {
                    metrics.inc_success();
                }
                result
            }
        })
    })
}
