use crate::command::{Command, CommandResult};
use crate::metrics::Metrics;
use crate::pipeline::{handler_fn, Handler, Middleware};
use std::sync::Arc;
use std::time::Instant;

/// Observes the wall-clock time of the inner handler, success or not.
pub fn latency<C, R>(metrics: Arc<dyn Metrics>) -> Middleware<C, R>
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
                let start = Instant::now();
                let result = next(ctx, meta, cmd).await;
                metrics.observe_latency(start.elapsed());
                result
            }
        })
    })
}
