use crate::command::{Command, CommandResult};
use crate::context::Done;
use crate::error::GatewayError;
use crate::metrics::Metrics;
use crate::pipeline::{handler_fn, Handler, Middleware};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Bounds the inner handler by `timeout`. A zero duration disables the stage.
///
/// The inner call runs on its own task with a child context. When the
/// deadline wins the race the caller gets `Timeout` immediately; the task is
/// left to observe its cancelled context and finish on its own.
pub fn timeout<C, R>(timeout: Duration, metrics: Option<Arc<dyn Metrics>>) -> Middleware<C, R>
where
    C: Command,
    R: CommandResult,
{
    Arc::new(move |next: Handler<C, R>| {
        if timeout.is_zero() {
            return next;
        }
        let metrics = metrics.clone();
        handler_fn(move |ctx, meta, cmd: C| {
            let next = Arc::clone(&next);
            let metrics = metrics.clone();
            async move {
                let sub = ctx.with_timeout(timeout);
                let _guard = sub.cancel_on_drop();
                let target = meta.target.clone();
                let request_id = meta.request_id.clone();
                let mut task = tokio::spawn(next(sub.clone(), meta, cmd));

                tokio::select! {
                    biased;
                    joined = &mut task => match joined {
                        Ok(result) => result,
                        Err(err) => {
                            warn!(request_id = %request_id, target = %target, error = %err, "handler task failed");
                            Err(GatewayError::classify(&err))
                        }
                    },
                    done = sub.done() => match done {
                        Done::DeadlineExceeded => {
                            if let Some(metrics) = &metrics {
                                metrics.inc_timeout();
                            }
                            warn!(request_id = %request_id, target = %target, timeout_ms = timeout.as_millis() as u64, "processing timeout");
                            Err(GatewayError::timeout("processing timeout"))
                        }
                        Done::Canceled => Err(GatewayError::internal("request canceled")),
                    },
                }
            }
        })
    })
}
