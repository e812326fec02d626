use crate::command::{Command, CommandResult, Idempotent};
use crate::idempotency::IdempotencyStore;
use crate::metrics::Metrics;
use crate::pipeline::{handler_fn, Handler, Middleware};
use std::sync::Arc;
use tracing::debug;

/// Replays the stored result for a known idempotency key without calling
/// the inner handler. Only successful results with a non-empty key are stored.
pub fn idempotency<C, R>(
    store: Arc<dyn IdempotencyStore<R>>,
    metrics: Option<Arc<dyn Metrics>>,
) -> Middleware<C, R>
where
    C: Command + Idempotent,
    R: CommandResult,
{
    Arc::new(move |next: Handler<C, R>| {
        let store = Arc::clone(&store);
        let metrics = metrics.clone();
        handler_fn(move |ctx, meta, cmd: C| {
            let next = Arc::clone(&next);
            let store = Arc::clone(&store);
            let metrics = metrics.clone();
            async move {
                let key = cmd.idempotency_key().to_string();
                if !key.is_empty() {
                    if let Some(cached) = store.get(&key) {
                        if let Some(metrics) = &metrics {
                            metrics.inc_idempotent_hit();
                        }
                        debug!(request_id = %meta.request_id, idempotency_key = %key, "idempotent replay");
                        return Ok(cached);
                    }
                }

                let result = next(ctx, meta, cmd).await?;
                if !key.is_empty() {
                    store.store(&key, result.clone());
                }
                Ok(result)
            }
        })
    })
}
