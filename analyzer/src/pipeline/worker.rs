//! Worker tasks and the pool that owns them.
//!
//! Each worker is a tokio task that owns one [`AnalysisClient`] for its whole
//! life. Workers share the work receiver behind a mutex, so each item is
//! picked up by exactly one worker, and publish every outcome (success or
//! failure) on the result channel. A panic inside the client is caught per
//! item and published as a failure like any other.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chess::PositionKey;
use engine::AnalysisClient;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{AnalysisResult, DepthRange, DepthRecord, ItemError, WorkItem, WorkerResponse};

type SharedWorkReceiver = Arc<Mutex<mpsc::UnboundedReceiver<WorkItem>>>;

/// How a worker left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Received a shutdown sentinel.
    Sentinel,
    /// The pool was cancelled; any in-flight item was abandoned.
    Cancelled,
    /// The work or result channel closed.
    ChannelClosed,
}

/// A long-lived worker task. Receives items from the shared channel and
/// processes them one at a time.
pub async fn run_analysis_worker<A: AnalysisClient>(
    worker_id: usize,
    mut client: A,
    work_rx: SharedWorkReceiver,
    result_tx: mpsc::UnboundedSender<WorkerResponse>,
    depths: DepthRange,
    cancel: CancellationToken,
) -> WorkerExit {
    tracing::info!(worker_id, client = client.label(), "Analysis worker started");

    let exit = loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break WorkerExit::Cancelled,
            item = next_item(&work_rx) => item,
        };

        let key = match item {
            Some(WorkItem::Analyze(key)) => key,
            Some(WorkItem::Shutdown) => break WorkerExit::Sentinel,
            None => break WorkerExit::ChannelClosed,
        };

        tracing::debug!(worker_id, key = %key, "Starting analysis");
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(worker_id, key = %key, "Abandoning in-flight item");
                break WorkerExit::Cancelled;
            }
            outcome = AssertUnwindSafe(analyze_item(&mut client, &key, depths)).catch_unwind() => {
                outcome.unwrap_or_else(|payload| Err(ItemError::Panicked(panic_message(&*payload))))
            }
        };
        let elapsed = started.elapsed();

        match &outcome {
            Ok(result) => tracing::debug!(worker_id, key = %key, depth = ?result.max_depth(), ?elapsed, "Analysis complete"),
            Err(e) => tracing::warn!(worker_id, key = %key, "Analysis failed: {}", e),
        }

        let response = WorkerResponse {
            worker_id,
            key,
            outcome,
            elapsed,
        };
        if result_tx.send(response).is_err() {
            tracing::warn!(worker_id, "Result channel closed, worker exiting");
            break WorkerExit::ChannelClosed;
        }
    };

    tracing::info!(worker_id, ?exit, "Analysis worker stopping");
    client.shutdown().await;
    exit
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn next_item(work_rx: &Mutex<mpsc::UnboundedReceiver<WorkItem>>) -> Option<WorkItem> {
    work_rx.lock().await.recv().await
}

/// Reset the client, then analyze the position once per depth. Any failing
/// depth fails the whole item.
async fn analyze_item<A: AnalysisClient>(
    client: &mut A,
    key: &PositionKey,
    depths: DepthRange,
) -> Result<AnalysisResult, ItemError> {
    let board = key.to_board()?;
    client.configure(true).await.map_err(ItemError::Reset)?;

    let mut records = Vec::with_capacity(depths.iter().count());
    for depth in depths.iter() {
        let evaluation = client
            .analyze(&board, depth)
            .await
            .map_err(|source| ItemError::Engine { depth, source })?;
        records.push(DepthRecord { depth, evaluation });
    }
    Ok(AnalysisResult::new(records))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("every worker has exited")]
pub struct PoolClosed;

/// Result of [`WorkerPool::shutdown`].
#[derive(Debug, Default)]
pub struct PoolShutdown {
    pub sentinels_sent: usize,
    /// `(worker_id, exit)` of every worker that finished on its own.
    pub exits: Vec<(usize, WorkerExit)>,
    pub panicked: usize,
    /// Workers still running at the grace deadline.
    pub aborted: usize,
    /// Responses published after the coordinator stopped draining.
    pub leftover: Vec<WorkerResponse>,
}

impl PoolShutdown {
    pub fn joined(&self) -> usize {
        self.exits.len() + self.panicked
    }
}

/// Fixed set of workers fed through an unbounded work channel.
pub struct WorkerPool {
    work_tx: mpsc::UnboundedSender<WorkItem>,
    result_rx: mpsc::UnboundedReceiver<WorkerResponse>,
    handles: Vec<(usize, JoinHandle<WorkerExit>)>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn one worker per client. `cancel` makes workers abandon their
    /// current item and exit.
    pub fn start<A: AnalysisClient>(
        clients: Vec<A>,
        depths: DepthRange,
        cancel: CancellationToken,
    ) -> Self {
        let (work_tx, work_rx) = mpsc::unbounded_channel::<WorkItem>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<WorkerResponse>();
        let shared_rx = Arc::new(Mutex::new(work_rx));

        let handles = clients
            .into_iter()
            .enumerate()
            .map(|(worker_id, client)| {
                let handle = tokio::spawn(run_analysis_worker(
                    worker_id,
                    client,
                    shared_rx.clone(),
                    result_tx.clone(),
                    depths,
                    cancel.clone(),
                ));
                (worker_id, handle)
            })
            .collect::<Vec<_>>();

        tracing::info!(
            worker_count = handles.len(),
            min_depth = depths.min,
            target_depth = depths.target,
            "Worker pool started"
        );

        Self {
            work_tx,
            result_rx,
            handles,
            cancel,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Queue one item. Fails only when every worker has already exited.
    pub fn submit(&self, key: PositionKey) -> Result<(), PoolClosed> {
        self.work_tx
            .send(WorkItem::Analyze(key))
            .map_err(|_| PoolClosed)
    }

    /// Next published response; `None` once every worker is gone.
    pub async fn next_response(&mut self) -> Option<WorkerResponse> {
        self.result_rx.recv().await
    }

    /// A response that is already published, without waiting.
    pub fn try_next_response(&mut self) -> Option<WorkerResponse> {
        self.result_rx.try_recv().ok()
    }

    /// Cancel workers immediately; they abandon in-flight items.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Send one sentinel per worker and join them all. Workers that have not
    /// exited by `grace` are aborted, which drops (and so kills) their client.
    pub async fn shutdown(mut self, grace: Duration) -> PoolShutdown {
        let mut outcome = PoolShutdown::default();
        for _ in 0..self.handles.len() {
            if self.work_tx.send(WorkItem::Shutdown).is_ok() {
                outcome.sentinels_sent += 1;
            }
        }
        tracing::info!(sentinels = outcome.sentinels_sent, "Shutdown sentinels queued");

        let deadline = tokio::time::Instant::now() + grace;
        for (worker_id, mut handle) in std::mem::take(&mut self.handles) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(exit)) => outcome.exits.push((worker_id, exit)),
                Ok(Err(e)) => {
                    tracing::error!(worker_id, "Worker task failed: {}", e);
                    outcome.panicked += 1;
                }
                Err(_) => {
                    tracing::warn!(worker_id, "Worker did not stop within {:?}, aborting", grace);
                    handle.abort();
                    outcome.aborted += 1;
                }
            }
        }

        while let Ok(response) = self.result_rx.try_recv() {
            outcome.leftover.push(response);
        }

        tracing::info!(
            joined = outcome.joined(),
            aborted = outcome.aborted,
            leftover = outcome.leftover.len(),
            "Worker pool stopped"
        );
        outcome
    }
}
