use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use transfer_gateway::command::{TransferCommand, TransferResult};
use transfer_gateway::context::RequestContext;
use transfer_gateway::dispatcher::{Dispatcher, WorkerPool, WorkerPoolConfig};
use transfer_gateway::idempotency::InMemoryIdempotencyStore;
use transfer_gateway::metrics::GatewayMetrics;
use transfer_gateway::pipeline::PolicyOrder;
use transfer_gateway::rate_limiter::{CompositeLimiter, Limiter, LimiterConfig};
use transfer_gateway::server::HttpLimits;
use transfer_gateway::{create_app, Gateway, GatewayDeps};

struct TestApp {
    router: Router,
    shutdown: CancellationToken,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn test_app(limiter: LimiterConfig, limits: HttpLimits) -> TestApp {
    let shutdown = CancellationToken::new();
    let gateway = Gateway::new(GatewayDeps {
        dispatcher: Arc::new(WorkerPool::spawn(WorkerPoolConfig::default(), shutdown.clone())),
        limiter: Some(Arc::new(CompositeLimiter::with_system_clock(limiter)) as Arc<dyn Limiter>),
        idempotency: Some(Arc::new(InMemoryIdempotencyStore::<TransferResult>::new())),
        metrics: Arc::new(GatewayMetrics::new()),
        transfer_timeout: Duration::from_secs(2),
        order: PolicyOrder::default(),
    });
    TestApp {
        router: create_app(Arc::new(gateway), limits),
        shutdown,
    }
}

fn default_limits() -> HttpLimits {
    HttpLimits {
        max_body_bytes: 1024 * 1024,
        max_in_flight: 64,
    }
}

fn default_app() -> TestApp {
    test_app(LimiterConfig::per_client(100.0, 100), default_limits())
}

fn transfer_request(client: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/transfer")
        .header("content-type", "application/json")
        .header("x-client-id", client)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn transfer_body(key: &str) -> Value {
    json!({ "from": "acc-1", "to": "acc-2", "amount": 1500, "idempotency_key": key })
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_transfer_succeeds() {
    let app = default_app();
    let (status, body) = send(&app, transfer_request("c1", transfer_body("key-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["transaction_id"].as_str().is_some());
    assert!(body["message"].as_str().unwrap().contains("1500 cents"));
}

#[tokio::test]
async fn test_third_request_in_burst_is_rate_limited() {
    let app = test_app(LimiterConfig::per_client(0.001, 2), default_limits());

    for key in ["k1", "k2"] {
        let (status, _) = send(&app, transfer_request("c1", transfer_body(key))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&app, transfer_request("c1", transfer_body("k3"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(body["code"], 429);

    // other clients have their own bucket
    let (status, _) = send(&app, transfer_request("c2", transfer_body("k4"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_replay_returns_cached_result_without_spending_tokens() {
    let app = test_app(LimiterConfig::per_client(0.001, 1), default_limits());

    let (status, first) = send(&app, transfer_request("c1", transfer_body("same"))).await;
    assert_eq!(status, StatusCode::OK);

    for _ in 0..3 {
        let (status, replay) = send(&app, transfer_request("c1", transfer_body("same"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(replay, first);
    }

    // the bucket is empty, so a new key is denied
    let (status, _) = send(&app, transfer_request("c1", transfer_body("other"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (_, metrics) = send(
        &app,
        Request::builder().uri("/metrics").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(metrics["idempotent_hits_total"], 3);
    assert_eq!(metrics["rate_limited_total"], 1);
    assert_eq!(metrics["requests_total"], 5);
    assert_eq!(metrics["successes_total"], 4);
}

#[tokio::test]
async fn test_invalid_transfer_is_bad_request() {
    let app = default_app();
    let body = json!({ "from": "acc-1", "to": "acc-1", "amount": 0, "idempotency_key": "k" });
    let (status, body) = send(&app, transfer_request("c1", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("amount must be positive"));
    assert!(message.contains("accounts must differ"));
}

#[tokio::test]
async fn test_unknown_fields_and_malformed_json_are_bad_request() {
    let app = default_app();
    let mut body = transfer_body("k");
    body["memo"] = json!("lunch");
    let (status, _) = send(&app, transfer_request("c1", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("POST")
        .uri("/transfer")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid");
}

#[tokio::test]
async fn test_oversized_body_is_payload_too_large() {
    let app = test_app(
        LimiterConfig::per_client(100.0, 100),
        HttpLimits {
            max_body_bytes: 64,
            max_in_flight: 64,
        },
    );
    let body = json!({
        "from": "acc-1",
        "to": "acc-2",
        "amount": 1,
        "idempotency_key": "k".repeat(200),
    });
    let (status, body) = send(&app, transfer_request("c1", body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "payload_too_large");
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = default_app();
    for path in ["/healthz", "/health"] {
        let (status, body) = send(&app, Request::builder().uri(path).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert!(body.get("queue_depth").is_some());
    }
}

#[tokio::test]
async fn test_metrics_endpoint_starts_empty() {
    let app = default_app();
    let (status, body) = send(&app, Request::builder().uri("/metrics").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requests_total"], 0);
    assert_eq!(body["success_rate"], 0.0);
    assert_eq!(body["active_workers"], 0);
}

#[tokio::test]
async fn test_request_id_is_echoed_and_unknown_route_is_json_404() {
    let app = default_app();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/nope")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "req-123");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_live_server_over_tcp() {
    let app = default_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stop = app.shutdown.clone();
    let router = app.router.clone();

    let server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
            .unwrap();
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/transfer"))
        .json(&transfer_body("live-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "success");

    drop(app);
    server.await.unwrap();
}

struct PanickingDispatcher;

impl Dispatcher for PanickingDispatcher {
    fn submit(
        &self,
        _ctx: RequestContext,
        _cmd: TransferCommand,
    ) -> transfer_gateway::Result<oneshot::Receiver<TransferResult>> {
        panic!("dispatcher blew up");
    }

    fn queue_depth(&self) -> u64 {
        0
    }

    fn active_workers(&self) -> u64 {
        0
    }
}

#[tokio::test]
async fn test_handler_panic_becomes_generic_500() {
    let gateway = Gateway::new(GatewayDeps {
        dispatcher: Arc::new(PanickingDispatcher),
        limiter: None,
        idempotency: None,
        metrics: Arc::new(GatewayMetrics::new()),
        transfer_timeout: Duration::ZERO,
        order: PolicyOrder::default(),
    });
    let app = TestApp {
        router: create_app(Arc::new(gateway), default_limits()),
        shutdown: CancellationToken::new(),
    };

    let (status, body) = send(&app, transfer_request("c1", transfer_body("boom"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal");
    assert_eq!(body["message"], "internal server error");

    // the router keeps serving after the panic
    let (status, _) = send(&app, Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
}
