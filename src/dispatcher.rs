//! Hand-off from the gateway to the workers that execute transfers.

use crate::command::{TransferCommand, TransferResult};
use crate::context::RequestContext;
use crate::error::{GatewayError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Submits transfer jobs and reports load.
pub trait Dispatcher: Send + Sync {
    /// Queues `cmd`; the receiver yields exactly one result, or is dropped if
    /// the job was abandoned. A saturated or stopped dispatcher returns
    /// `Unavailable` so nothing downstream mistakes it for an outcome.
    fn submit(&self, ctx: RequestContext, cmd: TransferCommand) -> Result<oneshot::Receiver<TransferResult>>;
    fn queue_depth(&self) -> u64;
    fn active_workers(&self) -> u64;
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Simulated processing time per job.
    pub work_delay: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_capacity: 1024,
            work_delay: Duration::ZERO,
        }
    }
}

struct Job {
    ctx: RequestContext,
    cmd: TransferCommand,
    reply: oneshot::Sender<TransferResult>,
}

#[derive(Debug, Default)]
struct PoolStats {
    queued: AtomicU64,
    active: AtomicU64,
}

/// Bounded in-process worker pool.
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    stats: Arc<PoolStats>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts `config.workers` tasks that run until `shutdown` is cancelled.
    pub fn spawn(config: WorkerPoolConfig, shutdown: CancellationToken) -> Self {
        let workers = config.workers.max(1);
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let stats = Arc::new(PoolStats::default());

        let handles = (0..workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&receiver),
                    Arc::clone(&stats),
                    config.work_delay,
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(workers, queue_capacity = config.queue_capacity, "worker pool started");
        Self {
            sender,
            stats,
            handles: Mutex::new(handles),
        }
    }

    /// Waits for every worker task to exit.
    pub async fn join(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "worker task failed");
            }
        }
    }
}

impl Dispatcher for WorkerPool {
    fn submit(&self, ctx: RequestContext, cmd: TransferCommand) -> Result<oneshot::Receiver<TransferResult>> {
        let (reply, receiver) = oneshot::channel();
        self.stats.queued.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = self.sender.try_send(Job { ctx, cmd, reply }) {
            self.stats.queued.fetch_sub(1, Ordering::Relaxed);
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "dispatcher stopped",
            };
            debug!(reason, "transfer rejected by dispatcher");
            return Err(GatewayError::unavailable(reason));
        }
        Ok(receiver)
    }

    fn queue_depth(&self) -> u64 {
        self.stats.queued.load(Ordering::Relaxed)
    }

    fn active_workers(&self) -> u64 {
        self.stats.active.load(Ordering::Relaxed)
    }
}

async fn run_worker(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    stats: Arc<PoolStats>,
    work_delay: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = next else { break };
        stats.queued.fetch_sub(1, Ordering::Relaxed);

        if job.ctx.err().is_some() {
            debug!(worker = id, "skipping job for finished request");
            continue;
        }

        stats.active.fetch_add(1, Ordering::Relaxed);
        let outcome = tokio::select! {
            _ = job.ctx.done() => None,
            result = execute(&job.cmd, work_delay) => Some(result),
        };
        stats.active.fetch_sub(1, Ordering::Relaxed);

        if let Some(result) = outcome {
            // the requester may have given up already
            let _ = job.reply.send(result);
        }
    }
    debug!(worker = id, "worker stopped");
}

async fn execute(cmd: &TransferCommand, work_delay: Duration) -> TransferResult {
    if !work_delay.is_zero() {
        tokio::time::sleep(work_delay).await;
    }
    TransferResult::success(format!(
        "transferred {} cents from {} to {}",
        cmd.amount_cents, cmd.from_account, cmd.to_account
    ))
}
