pub mod clock;
pub mod command;
pub mod config;
pub mod config_validator;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod idempotency;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod token_bucket;
pub mod transfer;
pub mod validation;

pub use config::Config;
pub use error::{ErrorKind, GatewayError, Result};
pub use gateway::{Gateway, GatewayDeps};
pub use server::create_app;
