//! Proof job scheduler.
//!
//! A single scheduler instance polls the store on a periodic tick,
//! dispatches the oldest `waiting` job to an idle worker, and arms a
//! per-job timeout. Single-assignment is enforced by an in-memory
//! processing map owned by this instance; multi-process deployments would
//! need a distributed claim and are out of scope.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channel::protocol::{ProofTaskPayload, ServerFrame};
use crate::domain::{Groth16Proof, JobStatus, WorkerId};

use super::{ProofJobStore, ProverError, Result};

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Store poll cadence.
    pub poll_interval: Duration,
    /// How long a dispatched job may stay in `generating`.
    pub proof_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_000),
            proof_timeout: Duration::from_millis(600_000),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from environment.
    pub fn from_env() -> Self {
        let poll_interval = std::env::var("POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(1_000));

        let proof_timeout = std::env::var("PROOF_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(600_000));

        Self {
            poll_interval,
            proof_timeout,
        }
    }
}

/// Worker-facing surface the scheduler needs: pick an idle worker, send it
/// a frame, give it back.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkerDispatch: Send + Sync {
    /// First live, open, idle worker; marks it busy. `None` when the pool
    /// has nobody free.
    async fn acquire(&self) -> Option<WorkerId>;

    /// Ship a frame to an acquired worker.
    async fn send(&self, worker: WorkerId, frame: ServerFrame) -> Result<()>;

    /// Return a worker to the idle set.
    async fn release(&self, worker: WorkerId);
}

/// A worker's reply for one job.
#[derive(Debug, Clone)]
pub struct ProofResult {
    pub proof_id: Uuid,
    pub proof: Groth16Proof,
    pub public_signals: Vec<String>,
}

/// Control messages for the scheduler loop.
#[derive(Debug)]
pub enum SchedulerMessage {
    /// Stop after the current iteration.
    Shutdown,
}

type ProcessingMap = Arc<Mutex<HashMap<Uuid, WorkerId>>>;

/// The scheduler loop.
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn ProofJobStore>,
    dispatch: Arc<dyn WorkerDispatch>,
    /// Jobs currently claimed by this instance, with the worker holding
    /// each. Single-writer: the tick and the timeout tasks.
    processing: ProcessingMap,
    control_tx: mpsc::Sender<SchedulerMessage>,
    control_rx: mpsc::Receiver<SchedulerMessage>,
    results_rx: mpsc::Receiver<ProofResult>,
}

impl Scheduler {
    /// `results_rx` receives worker replies from the channel server.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn ProofJobStore>,
        dispatch: Arc<dyn WorkerDispatch>,
        results_rx: mpsc::Receiver<ProofResult>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::channel(16);
        Self {
            config,
            store,
            dispatch,
            processing: Arc::new(Mutex::new(HashMap::new())),
            control_tx,
            control_rx,
            results_rx,
        }
    }

    /// Sender for controlling the scheduler.
    pub fn control_handle(&self) -> mpsc::Sender<SchedulerMessage> {
        self.control_tx.clone()
    }

    /// Run until shutdown.
    pub async fn run(mut self) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            proof_timeout_ms = self.config.proof_timeout.as_millis() as u64,
            "Starting proof scheduler"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Scheduler tick failed");
                    }
                }
                Some(result) = self.results_rx.recv() => {
                    self.handle_result(result).await;
                }
                Some(msg) = self.control_rx.recv() => {
                    match msg {
                        SchedulerMessage::Shutdown => {
                            info!("Proof scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// One scheduling pass: at most one dispatch per tick.
    async fn tick(&self) -> Result<()> {
        let Some(job) = self.store.find_oldest_waiting().await? else {
            return Ok(());
        };

        // Race guard between the tick and timeout cleanup.
        if lock(&self.processing).contains_key(&job.id) {
            return Ok(());
        }

        let Some(worker) = self.dispatch.acquire().await else {
            debug!(job_id = %job.id, "No idle worker, leaving job waiting");
            return Ok(());
        };

        lock(&self.processing).insert(job.id, worker);

        if let Err(e) = self.store.mark_generating(job.id).await {
            // Somebody else moved the row; undo the claim.
            lock(&self.processing).remove(&job.id);
            self.dispatch.release(worker).await;
            return Err(e);
        }

        let (Some(inputs), Some(fields)) = (job.inputs.clone(), job.fields.clone()) else {
            warn!(job_id = %job.id, "Job has no circuit inputs, failing it");
            self.store.mark_failed(job.id).await?;
            lock(&self.processing).remove(&job.id);
            self.dispatch.release(worker).await;
            return Err(ProverError::Internal(format!(
                "job {} inserted without inputs",
                job.id
            )));
        };

        let frame = ServerFrame::GenerateProof {
            proof_id: job.id,
            payload: ProofTaskPayload { inputs, fields },
        };
        match self.dispatch.send(worker, frame).await {
            Ok(()) => {
                info!(job_id = %job.id, worker = %worker, "Dispatched proof job");
            }
            Err(e) => {
                // The job stays `generating`; the timeout below converts it.
                warn!(job_id = %job.id, worker = %worker, error = %e, "Worker dispatch failed");
            }
        }

        self.arm_timeout(job.id);
        Ok(())
    }

    /// Arm the per-job timeout. The task captures only the store, the
    /// dispatch pool and the processing map, never the scheduler itself, so
    /// shutting the scheduler down cannot leak through a pending timer.
    fn arm_timeout(&self, job_id: Uuid) {
        let store = Arc::clone(&self.store);
        let dispatch = Arc::clone(&self.dispatch);
        let processing = Arc::clone(&self.processing);
        let timeout = self.config.proof_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            match store.get_job(job_id).await {
                Ok(Some(job)) if job.status == JobStatus::Generating => {
                    match store.mark_failed(job_id).await {
                        Ok(true) => warn!(job_id = %job_id, "Proof job timed out"),
                        Ok(false) => debug!(job_id = %job_id, "Timeout raced a terminal update"),
                        Err(e) => error!(job_id = %job_id, error = %e, "Timeout update failed"),
                    }
                }
                Ok(_) => {}
                Err(e) => error!(job_id = %job_id, error = %e, "Timeout re-read failed"),
            }

            let worker = lock(&processing).remove(&job_id);
            if let Some(worker) = worker {
                dispatch.release(worker).await;
            }
        });
    }

    /// Record a worker reply. The first terminal transition wins; a reply
    /// for an already-failed job is logged and dropped.
    async fn handle_result(&self, result: ProofResult) {
        let id = result.proof_id;
        match self
            .store
            .complete_job(id, &result.proof, &result.public_signals)
            .await
        {
            Ok(true) => info!(job_id = %id, "Proof job generated"),
            Ok(false) => {
                warn!(job_id = %id, "Reply for a terminal job, attempting failure record");
                match self.store.mark_failed(id).await {
                    Ok(_) => {}
                    Err(e) => error!(job_id = %id, error = %e, "Failure record refused"),
                }
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "Recording proof failed");
                if let Err(e) = self.store.mark_failed(id).await {
                    error!(job_id = %id, error = %e, "Failure record refused");
                }
            }
        }

        let worker = lock(&self.processing).remove(&id);
        if let Some(worker) = worker {
            self.dispatch.release(worker).await;
        }
    }
}

fn lock(map: &ProcessingMap) -> std::sync::MutexGuard<'_, HashMap<Uuid, WorkerId>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawn the scheduler as a background task.
pub fn spawn_scheduler(
    config: SchedulerConfig,
    store: Arc<dyn ProofJobStore>,
    dispatch: Arc<dyn WorkerDispatch>,
    results_rx: mpsc::Receiver<ProofResult>,
) -> (tokio::task::JoinHandle<()>, mpsc::Sender<SchedulerMessage>) {
    let scheduler = Scheduler::new(config, store, dispatch, results_rx);
    let control = scheduler.control_handle();
    let handle = tokio::spawn(scheduler.run());
    (handle, control)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(1_000));
        assert_eq!(config.proof_timeout, Duration::from_millis(600_000));
    }
}
