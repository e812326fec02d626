use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use transfer_gateway::clock::ManualClock;
use transfer_gateway::command::{RequestMeta, TransferCommand, TransferResult};
use transfer_gateway::context::RequestContext;
use transfer_gateway::idempotency::{IdempotencyStore, InMemoryIdempotencyStore};
use transfer_gateway::metrics::{CounterMetrics, LatencyMetrics, MetricsSnapshot, SnapshotMetrics};
use transfer_gateway::pipeline::{handler_fn, Composer, Handler, PolicyOrder};
use transfer_gateway::rate_limiter::{CompositeLimiter, Limiter, LimiterConfig};
use transfer_gateway::ErrorKind;

type Log = Arc<Mutex<Vec<String>>>;

struct RecordingLimiter(Log);

impl Limiter for RecordingLimiter {
    fn allow(&self, _client_id: &str) -> bool {
        self.0.lock().push("rate_limit".to_string());
        true
    }
}

struct RecordingStore {
    log: Log,
    inner: InMemoryIdempotencyStore<TransferResult>,
}

impl IdempotencyStore<TransferResult> for RecordingStore {
    fn get(&self, key: &str) -> Option<TransferResult> {
        self.log.lock().push("idempotency:get".to_string());
        self.inner.get(key)
    }

    fn store(&self, key: &str, result: TransferResult) {
        self.log.lock().push("idempotency:store".to_string());
        self.inner.store(key, result);
    }
}

struct RecordingMetrics(Log);

impl CounterMetrics for RecordingMetrics {
    fn inc_request(&self) {}
    fn inc_success(&self) {}
    fn inc_rate_limited(&self) {}
    fn inc_timeout(&self) {}
    fn inc_idempotent_hit(&self) {}
}

impl LatencyMetrics for RecordingMetrics {
    fn observe_latency(&self, _elapsed: Duration) {
        self.0.lock().push("latency".to_string());
    }
}

impl SnapshotMetrics for RecordingMetrics {
    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::default()
    }
}

fn recording_base(log: Log) -> Handler<TransferCommand, TransferResult> {
    handler_fn(move |ctx: RequestContext, _meta, cmd: TransferCommand| {
        let log = Arc::clone(&log);
        async move {
            let deadline = if ctx.deadline().is_some() { "deadline" } else { "no-deadline" };
            log.lock().push(format!("base:{deadline}"));
            Ok(TransferResult::success(cmd.idempotency_key))
        }
    })
}

fn recording_composer(log: &Log) -> Composer<TransferCommand, TransferResult> {
    Composer::new()
        .with_metrics(Arc::new(RecordingMetrics(Arc::clone(log))))
        .with_limiter(Arc::new(RecordingLimiter(Arc::clone(log))))
        .with_idempotency(Arc::new(RecordingStore {
            log: Arc::clone(log),
            inner: InMemoryIdempotencyStore::new(),
        }))
        .with_timeout(Duration::from_secs(5))
}

fn cmd(key: &str) -> TransferCommand {
    TransferCommand::new("acc-1", "acc-2", 100, key)
}

#[tokio::test]
async fn test_default_stage_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let handler = recording_composer(&log).build(recording_base(Arc::clone(&log)));

    handler(RequestContext::background(), RequestMeta::for_client("c1"), cmd("k1"))
        .await
        .unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "idempotency:get",
            "rate_limit",
            "base:deadline",
            "latency",
            "idempotency:store",
        ]
    );
}

#[tokio::test]
async fn test_reordered_stages() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let order: PolicyOrder = "latency,rate_limit,idempotency".parse().unwrap();
    let handler = recording_composer(&log)
        .with_order(order)
        .build(recording_base(Arc::clone(&log)));

    handler(RequestContext::background(), RequestMeta::for_client("c1"), cmd("k1"))
        .await
        .unwrap();

    // timeout is not listed, so the base handler runs without a deadline
    assert_eq!(
        *log.lock(),
        vec![
            "rate_limit",
            "idempotency:get",
            "base:no-deadline",
            "idempotency:store",
            "latency",
        ]
    );
}

#[tokio::test]
async fn test_burst_then_replay_without_spending_tokens() {
    let clock = ManualClock::default();
    let limiter = CompositeLimiter::new(LimiterConfig::per_client(2.0, 2), Arc::new(clock.clone()));
    let calls = Arc::new(AtomicUsize::new(0));
    let base_calls = Arc::clone(&calls);
    let base = handler_fn(move |_ctx, _meta, cmd: TransferCommand| {
        let calls = Arc::clone(&base_calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(TransferResult::success(cmd.idempotency_key))
        }
    });
    let handler = Composer::new()
        .with_limiter(Arc::new(limiter))
        .with_idempotency(Arc::new(InMemoryIdempotencyStore::<TransferResult>::new()))
        .build(base);
    let call = |key: &str| handler(RequestContext::background(), RequestMeta::for_client("c1"), cmd(key));

    let first = call("k1").await.unwrap();
    call("k2").await.unwrap();
    let denied = call("k3").await.unwrap_err();
    assert_eq!(denied.kind(), ErrorKind::RateLimited);

    // half a second refills exactly one token
    clock.advance(Duration::from_millis(500));
    let replay = call("k1").await.unwrap();
    assert_eq!(replay, first);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // the replay did not spend the refilled token
    assert!(call("k4").await.is_ok());
    assert_eq!(call("k5").await.unwrap_err().kind(), ErrorKind::RateLimited);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

fn sleeping_base(delay: Duration) -> Handler<TransferCommand, TransferResult> {
    handler_fn(move |_ctx, _meta, cmd: TransferCommand| async move {
        tokio::time::sleep(delay).await;
        Ok(TransferResult::success(cmd.idempotency_key))
    })
}

#[tokio::test(start_paused = true)]
async fn test_timeout_boundaries() {
    let limit = Duration::from_millis(100);
    let epsilon = Duration::from_millis(1);

    let under = Composer::new().with_timeout(limit).build(sleeping_base(limit - epsilon));
    assert!(under(RequestContext::background(), RequestMeta::default(), cmd("a"))
        .await
        .is_ok());

    let over = Composer::new().with_timeout(limit).build(sleeping_base(limit + epsilon));
    let err = over(RequestContext::background(), RequestMeta::default(), cmd("b"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let disabled = Composer::new()
        .with_timeout(Duration::ZERO)
        .build(sleeping_base(Duration::from_secs(60)));
    assert!(disabled(RequestContext::background(), RequestMeta::default(), cmd("c"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_global_bucket_is_shared_across_clients() {
    let clock = ManualClock::default();
    let limiter = CompositeLimiter::new(
        LimiterConfig::per_client(1.0, 5).with_global(1.0, 3),
        Arc::new(clock.clone()),
    );
    let handler = Composer::new()
        .with_limiter(Arc::new(limiter))
        .build(sleeping_base(Duration::ZERO));
    let call = |client: &'static str, key: &str| {
        handler(RequestContext::background(), RequestMeta::for_client(client), cmd(key))
    };

    assert!(call("a", "1").await.is_ok());
    assert!(call("b", "2").await.is_ok());
    assert!(call("c", "3").await.is_ok());
    assert_eq!(call("d", "4").await.unwrap_err().kind(), ErrorKind::RateLimited);

    clock.advance(Duration::from_secs(1));
    assert!(call("d", "5").await.is_ok());
}
