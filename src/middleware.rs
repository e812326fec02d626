use crate::error::{ErrorKind, ErrorResponse};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request id assigned by [`request_id_middleware`], stored in the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Reuses the caller's `X-Request-ID` or generates one, and echoes it on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));
    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }
    response
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request);
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = Instant::now();

    info!(
        target: "transfer_gateway::middleware",
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        request_id = %request_id,
        "Incoming request"
    );

    let response = next.run(request).await;

    let status = response.status();
    info!(
        target: "transfer_gateway::middleware",
        method = %method,
        uri = %uri,
        status = %status,
        request_id = %request_id,
        latency_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

/// Caps the number of requests being processed at once.
#[derive(Debug, Clone)]
pub struct InFlightLimit {
    permits: Arc<Semaphore>,
}

impl InFlightLimit {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Rejects with 503 instead of queueing when every permit is taken.
pub async fn in_flight_middleware(State(limit): State<InFlightLimit>, request: Request, next: Next) -> Response {
    let Ok(_permit) = Arc::clone(&limit.permits).try_acquire_owned() else {
        warn!(target: "transfer_gateway::middleware", uri = %request.uri(), "server busy, rejecting request");
        let status = StatusCode::SERVICE_UNAVAILABLE;
        return (
            status,
            Json(ErrorResponse::new("server_busy", "server busy", status.as_u16())),
        )
            .into_response();
    };
    next.run(request).await
}

/// Response for `CatchPanicLayer::custom`: a generic 500 that never carries the panic payload.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(target: "transfer_gateway::middleware", panic = %detail, "handler panicked");

    let kind = ErrorKind::Internal;
    (
        kind.http_status(),
        Json(ErrorResponse::new(
            kind.as_str(),
            "internal server error",
            kind.http_status().as_u16(),
        )),
    )
        .into_response()
}

pub fn get_client_ip(request: &Request) -> String {
    client_ip(request.headers(), request.extensions()).unwrap_or_else(|| "unknown".to_string())
}

/// Source address of a request: the first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the peer address from `ConnectInfo`.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}
