//! Server side of the worker channel.
//!
//! Each accepted connection gets an opaque worker id and an entry in the
//! pool. A liveness deadline is armed on connect and pushed out by every
//! heartbeat frame; when it fires the connection is force-closed and the
//! worker drops out of the pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::WorkerId;
use crate::infra::{ProofResult, ProverError, Result, WorkerDispatch};

use super::protocol::{ServerFrame, WorkerFrame};

/// Channel server tuning knobs.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Liveness window; refreshed by every heartbeat frame.
    pub connection_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_millis(35_000),
        }
    }
}

impl ChannelConfig {
    /// Load configuration from environment.
    pub fn from_env() -> Self {
        let connection_timeout = std::env::var("CONNECTION_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(35_000));

        Self { connection_timeout }
    }
}

struct WorkerEntry {
    sender: mpsc::Sender<ServerFrame>,
    busy: bool,
}

/// The connected-worker set.
///
/// Single-writer discipline: entries are added and removed by the
/// per-connection handlers; the scheduler only flips the busy flag through
/// [`WorkerDispatch`].
pub struct WorkerPool {
    config: ChannelConfig,
    workers: Mutex<HashMap<WorkerId, WorkerEntry>>,
    results_tx: mpsc::Sender<ProofResult>,
}

impl WorkerPool {
    pub fn new(config: ChannelConfig, results_tx: mpsc::Sender<ProofResult>) -> Self {
        Self {
            config,
            workers: Mutex::new(HashMap::new()),
            results_tx,
        }
    }

    /// Number of currently connected workers.
    pub fn connected(&self) -> usize {
        self.lock().len()
    }

    fn register(&self, id: WorkerId, sender: mpsc::Sender<ServerFrame>) {
        self.lock().insert(
            id,
            WorkerEntry {
                sender,
                busy: false,
            },
        );
        info!(worker = %id, "Worker connected");
    }

    fn unregister(&self, id: WorkerId) {
        self.lock().remove(&id);
        info!(worker = %id, "Worker disconnected");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<WorkerId, WorkerEntry>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl WorkerDispatch for WorkerPool {
    async fn acquire(&self) -> Option<WorkerId> {
        let mut workers = self.lock();
        let id = workers
            .iter()
            .find(|(_, entry)| !entry.busy && !entry.sender.is_closed())
            .map(|(id, _)| *id)?;
        if let Some(entry) = workers.get_mut(&id) {
            entry.busy = true;
        }
        Some(id)
    }

    async fn send(&self, worker: WorkerId, frame: ServerFrame) -> Result<()> {
        let sender = self
            .lock()
            .get(&worker)
            .map(|entry| entry.sender.clone())
            .ok_or_else(|| {
                ProverError::WorkerDispatchFailed(format!("worker {worker} left the pool"))
            })?;
        sender
            .send(frame)
            .await
            .map_err(|_| ProverError::WorkerDispatchFailed(format!("worker {worker} channel closed")))
    }

    async fn release(&self, worker: WorkerId) {
        if let Some(entry) = self.lock().get_mut(&worker) {
            entry.busy = false;
        }
    }
}

/// Drive one accepted worker connection until it closes or goes silent.
pub async fn handle_socket(socket: WebSocket, pool: Arc<WorkerPool>) {
    let worker_id = WorkerId::new();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(16);
    pool.register(worker_id, out_tx);

    let (mut sink, mut stream) = socket.split();
    let mut deadline = Instant::now() + pool.config.connection_timeout;

    loop {
        tokio::select! {
            outbound = out_rx.recv() => {
                let Some(frame) = outbound else { break };
                match serde_json::to_string(&frame) {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            warn!(worker = %worker_id, "Send on closed worker socket");
                            break;
                        }
                    }
                    Err(e) => warn!(worker = %worker_id, error = %e, "Unencodable frame"),
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_worker_frame(&text, worker_id, &pool, &mut sink, &mut deadline)
                            .await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(worker = %worker_id, "Worker closed the channel");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Raw control frames carry no protocol meaning here.
                    }
                    Some(Err(e)) => {
                        warn!(worker = %worker_id, error = %e, "Worker socket error");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(worker = %worker_id, "No liveness evidence, force-closing");
                break;
            }
        }
    }

    pool.unregister(worker_id);
}

async fn handle_worker_frame(
    text: &str,
    worker_id: WorkerId,
    pool: &Arc<WorkerPool>,
    sink: &mut SplitSink<WebSocket, Message>,
    deadline: &mut Instant,
) {
    let frame: WorkerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(worker = %worker_id, error = %e, "Discarding unknown worker message");
            return;
        }
    };

    match frame {
        WorkerFrame::Ping => {
            *deadline = Instant::now() + pool.config.connection_timeout;
            if let Ok(text) = serde_json::to_string(&ServerFrame::Pong) {
                let _ = sink.send(Message::Text(text)).await;
            }
        }
        WorkerFrame::Pong => {
            *deadline = Instant::now() + pool.config.connection_timeout;
        }
        WorkerFrame::GenerateProof { proof_id, results } => {
            debug!(worker = %worker_id, job_id = %proof_id, "Worker reply received");
            let result = ProofResult {
                proof_id,
                proof: results.proof,
                public_signals: results.public,
            };
            if pool.results_tx.send(result).await.is_err() {
                warn!(worker = %worker_id, "Scheduler reply channel is closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> WorkerPool {
        let (results_tx, _results_rx) = mpsc::channel(8);
        WorkerPool::new(ChannelConfig::default(), results_tx)
    }

    #[tokio::test]
    async fn acquire_empty_pool_returns_none() {
        let pool = pool();
        assert!(pool.acquire().await.is_none());
    }

    #[tokio::test]
    async fn acquire_marks_busy_until_release() {
        let pool = pool();
        let id = WorkerId::new();
        let (tx, _rx) = mpsc::channel(4);
        pool.register(id, tx);

        assert_eq!(pool.acquire().await, Some(id));
        // Busy: nothing left to hand out.
        assert!(pool.acquire().await.is_none());

        pool.release(id).await;
        assert_eq!(pool.acquire().await, Some(id));
    }

    #[tokio::test]
    async fn closed_channels_are_not_handed_out() {
        let pool = pool();
        let id = WorkerId::new();
        let (tx, rx) = mpsc::channel(4);
        pool.register(id, tx);
        drop(rx);
        assert!(pool.acquire().await.is_none());
    }

    #[tokio::test]
    async fn send_to_departed_worker_is_a_dispatch_failure() {
        let pool = pool();
        let err = pool.send(WorkerId::new(), ServerFrame::Ping).await;
        assert!(matches!(err, Err(ProverError::WorkerDispatchFailed(_))));
    }

    #[tokio::test]
    async fn unregister_removes_the_entry() {
        let pool = pool();
        let id = WorkerId::new();
        let (tx, _rx) = mpsc::channel(4);
        pool.register(id, tx);
        assert_eq!(pool.connected(), 1);
        pool.unregister(id);
        assert_eq!(pool.connected(), 0);
        assert!(pool.acquire().await.is_none());
    }
}
