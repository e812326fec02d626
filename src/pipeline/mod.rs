//! Generic unary handlers and the policy middlewares that wrap them.
//!
//! A [`Handler`] is the uniform `(context, meta, command) -> result` shape
//! every transport calls. A [`Middleware`] turns one handler into another;
//! [`chain`] nests them so the first middleware is the outermost.

pub mod composer;
pub mod counters;
pub mod idempotency;
pub mod latency;
pub mod rate_limit;
pub mod stage;
pub mod timeout;

use crate::command::RequestMeta;
use crate::context::RequestContext;
use crate::error::Result;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

pub use composer::Composer;
pub use stage::{PolicyOrder, PolicyStage, DEFAULT_POLICY_ORDER};

pub type HandlerFuture<R> = BoxFuture<'static, Result<R>>;

pub type Handler<C, R> = Arc<dyn Fn(RequestContext, RequestMeta, C) -> HandlerFuture<R> + Send + Sync>;

pub type Middleware<C, R> = Arc<dyn Fn(Handler<C, R>) -> Handler<C, R> + Send + Sync>;

/// Boxes an async function into a [`Handler`].
pub fn handler_fn<C, R, F, Fut>(f: F) -> Handler<C, R>
where
    F: Fn(RequestContext, RequestMeta, C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    Arc::new(move |ctx, meta, cmd| Box::pin(f(ctx, meta, cmd)))
}

/// Wraps `base` so `middlewares[0]` sees the request first and the response last.
pub fn chain<C, R>(base: Handler<C, R>, middlewares: &[Middleware<C, R>]) -> Handler<C, R> {
    middlewares
        .iter()
        .rev()
        .fold(base, |handler, middleware| middleware(handler))
}
