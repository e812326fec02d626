use crate::command::{TransferCommand, TransferResult};
use crate::context::{Done, RequestContext};
use crate::dispatcher::Dispatcher;
use crate::error::{GatewayError, Result};
use crate::pipeline::{handler_fn, Handler};
use crate::validation::validate_transfer;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Business logic behind the transfer endpoint.
#[derive(Clone)]
pub struct TransferService {
    dispatcher: Arc<dyn Dispatcher>,
}

impl TransferService {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Validates `cmd` and hands it to the dispatcher.
    pub fn submit(&self, ctx: &RequestContext, cmd: TransferCommand) -> Result<oneshot::Receiver<TransferResult>> {
        validate_transfer(&cmd)?;
        self.dispatcher.submit(ctx.clone(), cmd)
    }

    /// The innermost pipeline handler: submit, then wait for the worker or
    /// the request context, whichever finishes first.
    pub fn base_handler(&self) -> Handler<TransferCommand, TransferResult> {
        let service = self.clone();
        handler_fn(move |ctx: RequestContext, _meta, cmd: TransferCommand| {
            let service = service.clone();
            async move {
                let receiver = service.submit(&ctx, cmd)?;
                tokio::select! {
                    result = receiver => result.map_err(|_| GatewayError::internal("transfer worker dropped the job")),
                    done = ctx.done() => Err(match done {
                        Done::DeadlineExceeded => GatewayError::timeout("processing timeout"),
                        Done::Canceled => GatewayError::internal("request canceled"),
                    }),
                }
            }
        })
    }
}
