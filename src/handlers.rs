use axum::{
    async_trait,
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::command::{Protocol, RequestMeta, TransferCommand};
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::middleware::{client_ip, RequestId, X_REQUEST_ID};
use crate::response::TransferResponse;

/// Shared application state
pub type AppState = Arc<Gateway>;

pub const X_CLIENT_ID: &str = "x-client-id";
pub const X_TRACE_ID: &str = "x-trace-id";

/// Request body for `POST /transfer`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    /// Amount in cents
    pub amount: i64,
    pub idempotency_key: String,
}

impl From<TransferRequest> for TransferCommand {
    fn from(req: TransferRequest) -> Self {
        TransferCommand::new(req.from, req.to, req.amount, req.idempotency_key)
    }
}

/// Transport metadata pulled from headers and the connection.
///
/// The client identity is `X-Client-ID`, falling back to the forwarded or
/// peer address so anonymous callers are still limited per source.
#[derive(Debug, Clone)]
pub struct HttpMeta(pub RequestMeta);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for HttpMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();
        let client_id = header(X_CLIENT_ID)
            .or_else(|| client_ip(&parts.headers, &parts.extensions))
            .unwrap_or_else(|| "anonymous".to_string());
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .or_else(|| header(X_REQUEST_ID.as_str()))
            .unwrap_or_default();

        Ok(HttpMeta(RequestMeta {
            client_id,
            request_id,
            trace_id: header(X_TRACE_ID).unwrap_or_default(),
            remote_addr,
            protocol: Protocol::Http,
            target: format!("{} {}", parts.method, parts.uri.path()),
        }))
    }
}

/// Submit a transfer through the policy pipeline
pub async fn submit_transfer(
    State(gateway): State<AppState>,
    HttpMeta(meta): HttpMeta,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Json(request) = payload.map_err(map_json_rejection)?;

    // cancels the pipeline if the client goes away and axum drops this future
    let ctx = RequestContext::background();
    let _guard = ctx.cancel_on_drop();

    let result = gateway.transfer(ctx, meta, request.into()).await?;
    Ok(Json(TransferResponse::from(result)))
}

fn map_json_rejection(rejection: JsonRejection) -> GatewayError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::payload_too_large("request body too large")
    } else {
        GatewayError::invalid(rejection.body_text())
    }
}

/// Metrics snapshot endpoint
pub async fn metrics(State(gateway): State<AppState>) -> impl IntoResponse {
    Json(gateway.metrics_snapshot())
}

/// Health check endpoint
pub async fn health_check(State(gateway): State<AppState>) -> impl IntoResponse {
    Json(gateway.health())
}

pub async fn not_found() -> GatewayError {
    GatewayError::not_found("route not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> RequestMeta {
        let (mut parts, _) = request.into_parts();
        let HttpMeta(meta) = HttpMeta::from_request_parts(&mut parts, &()).await.unwrap();
        meta
    }

    #[tokio::test]
    async fn test_meta_from_headers() {
        let request = Request::builder()
            .method("POST")
            .uri("/transfer?debug=1")
            .header("x-client-id", "client-7")
            .header("x-request-id", "req-1")
            .header("x-trace-id", "trace-1")
            .body(())
            .unwrap();

        let meta = extract(request).await;
        assert_eq!(meta.client_id, "client-7");
        assert_eq!(meta.request_id, "req-1");
        assert_eq!(meta.trace_id, "trace-1");
        assert_eq!(meta.protocol, Protocol::Http);
        assert_eq!(meta.target, "POST /transfer");
    }

    #[tokio::test]
    async fn test_client_id_falls_back_to_address() {
        let mut request = Request::builder().uri("/transfer").body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 5555))));

        let meta = extract(request).await;
        assert_eq!(meta.client_id, "192.0.2.9");
        assert_eq!(meta.remote_addr, "192.0.2.9:5555");

        let meta = extract(Request::builder().uri("/transfer").body(()).unwrap()).await;
        assert_eq!(meta.client_id, "anonymous");
    }

    #[tokio::test]
    async fn test_client_id_prefers_forwarded_hop_over_peer() {
        let mut request = Request::builder()
            .uri("/transfer")
            .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 5555))));

        let meta = extract(request).await;
        assert_eq!(meta.client_id, "198.51.100.4");
        assert_eq!(meta.remote_addr, "192.0.2.9:5555");
    }

    #[test]
    fn test_transfer_request_rejects_unknown_fields() {
        let ok: Result<TransferRequest, _> =
            serde_json::from_str(r#"{"from":"a","to":"b","amount":5,"idempotency_key":"k"}"#);
        assert!(ok.is_ok());

        let extra: Result<TransferRequest, _> = serde_json::from_str(
            r#"{"from":"a","to":"b","amount":5,"idempotency_key":"k","memo":"hi"}"#,
        );
        assert!(extra.is_err());
    }
}
