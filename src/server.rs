use crate::command::TransferResult;
use crate::config::Config;
use crate::dispatcher::WorkerPool;
use crate::error::{GatewayError, Result};
use crate::gateway::{Gateway, GatewayDeps};
use crate::handlers::{health_check, metrics, not_found, submit_transfer, AppState};
use crate::idempotency::InMemoryIdempotencyStore;
use crate::metrics::GatewayMetrics;
use crate::middleware::{handle_panic, in_flight_middleware, logging_middleware, request_id_middleware, InFlightLimit};
use crate::rate_limiter::{CompositeLimiter, Limiter};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Transport limits applied around every route.
#[derive(Debug, Clone, Copy)]
pub struct HttpLimits {
    pub max_body_bytes: usize,
    pub max_in_flight: usize,
}

impl From<&Config> for HttpLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_body_bytes: config.max_body_bytes,
            max_in_flight: config.max_in_flight,
        }
    }
}

/// Builds the HTTP router around a gateway.
pub fn create_app(gateway: AppState, limits: HttpLimits) -> Router {
    Router::new()
        .route("/transfer", post(submit_transfer))
        .route("/metrics", get(metrics))
        .route("/healthz", get(health_check))
        .route("/health", get(health_check))
        .fallback(not_found)
        .with_state(gateway)
        .layer(DefaultBodyLimit::max(limits.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware))
                .layer(middleware::from_fn_with_state(
                    InFlightLimit::new(limits.max_in_flight),
                    in_flight_middleware,
                )),
        )
}

pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub async fn run(self) -> Result<()> {
        let shutdown = CancellationToken::new();
        let limiter = Arc::new(CompositeLimiter::with_system_clock(self.config.limiter_config()));
        let cleanup = limiter.spawn_cleanup(&shutdown);
        let pool = Arc::new(WorkerPool::spawn(self.config.worker_pool_config(), shutdown.clone()));

        let gateway = Arc::new(Gateway::new(GatewayDeps {
            dispatcher: pool.clone(),
            limiter: Some(limiter.clone() as Arc<dyn Limiter>),
            idempotency: Some(Arc::new(InMemoryIdempotencyStore::<TransferResult>::new())),
            metrics: Arc::new(GatewayMetrics::new()),
            transfer_timeout: self.config.transfer_timeout(),
            order: self.config.policy_order()?,
        }));
        let app = create_app(gateway, HttpLimits::from(&self.config));

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Transfer gateway listening on {}", self.config.bind_addr);
        tracing::info!("Health check available at /healthz, metrics at /metrics");

        // Run server with graceful shutdown
        let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await;

        shutdown.cancel();
        limiter.stop();
        pool.join().await;
        if let Some(cleanup) = cleanup {
            if let Err(err) = cleanup.await {
                tracing::warn!(error = %err, "limiter cleanup task failed");
            }
        }
        tracing::info!("Transfer gateway stopped");

        served.map_err(GatewayError::from)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
