//! Scheduler integration tests over an in-memory SQLite store and a test
//! worker dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use tokio::sync::mpsc;
use uuid::Uuid;

use zkauth_prover::channel::protocol::ServerFrame;
use zkauth_prover::domain::{
    CircuitInputs, Groth16Proof, IssBase64Details, JobStatus, ProofFields, WorkerId,
};
use zkauth_prover::infra::{
    spawn_scheduler, ProofJobStore, ProofResult, ProverError, Result, SchedulerConfig,
    SqliteJobStore, WorkerDispatch,
};
use zkauth_prover::ProofJob;

/// One controllable worker slot: flip `online` to simulate connect and
/// disconnect; dispatched frames land on the channel.
struct TestDispatch {
    id: WorkerId,
    online: AtomicBool,
    busy: AtomicBool,
    frames: mpsc::UnboundedSender<ServerFrame>,
}

impl TestDispatch {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                id: WorkerId::new(),
                online: AtomicBool::new(false),
                busy: AtomicBool::new(false),
                frames: tx,
            }),
            rx,
        )
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkerDispatch for TestDispatch {
    async fn acquire(&self) -> Option<WorkerId> {
        if !self.online.load(Ordering::SeqCst) {
            return None;
        }
        if self.busy.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.id)
    }

    async fn send(&self, _worker: WorkerId, frame: ServerFrame) -> Result<()> {
        self.frames
            .send(frame)
            .map_err(|_| ProverError::WorkerDispatchFailed("test channel closed".to_string()))
    }

    async fn release(&self, _worker: WorkerId) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

async fn test_store() -> Arc<dyn ProofJobStore> {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    let store = SqliteJobStore::new(pool);
    store.initialize().await.unwrap();
    Arc::new(store)
}

fn sample_job(nonce: &str) -> ProofJob {
    ProofJob::new(
        nonce.to_string(),
        "a.b.c".to_string(),
        CircuitInputs::default(),
        ProofFields {
            address_seed: "77".to_string(),
            header: "1".to_string(),
            iss_base64_details: IssBase64Details {
                value: "2".to_string(),
                index_mod_4: 3,
            },
        },
    )
}

fn sample_proof() -> Groth16Proof {
    Groth16Proof {
        pi_a: ["1".into(), "2".into(), "1".into()],
        pi_b: [
            ["1".into(), "2".into()],
            ["3".into(), "4".into()],
            ["1".into(), "0".into()],
        ],
        pi_c: ["5".into(), "6".into(), "1".into()],
    }
}

fn fast_config(timeout: Duration) -> SchedulerConfig {
    SchedulerConfig {
        poll_interval: Duration::from_millis(25),
        proof_timeout: timeout,
    }
}

async fn wait_for_status(
    store: &Arc<dyn ProofJobStore>,
    id: Uuid,
    status: JobStatus,
) -> ProofJob {
    for _ in 0..200 {
        let job = store.get_job(id).await.unwrap().unwrap();
        if job.status == status {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never reached {status}");
}

#[tokio::test]
async fn tick_without_workers_mutates_nothing() {
    let store = test_store().await;
    let (dispatch, mut frames) = TestDispatch::new();
    let (_results_tx, results_rx) = mpsc::channel(8);

    let job = sample_job("n1");
    store.insert_job(&job).await.unwrap();

    let (_handle, control) = spawn_scheduler(
        fast_config(Duration::from_secs(600)),
        Arc::clone(&store),
        dispatch.clone() as Arc<dyn WorkerDispatch>,
        results_rx,
    );

    // Several ticks pass with nobody connected.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let loaded = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Waiting);
    assert!(frames.try_recv().is_err());

    // A worker connects: the job is dispatched on a later tick.
    dispatch.set_online(true);
    let loaded = wait_for_status(&store, job.id, JobStatus::Generating).await;
    assert_eq!(loaded.status, JobStatus::Generating);

    let frame = frames.recv().await.unwrap();
    match frame {
        ServerFrame::GenerateProof { proof_id, payload } => {
            assert_eq!(proof_id, job.id);
            assert_eq!(payload.fields.address_seed, "77");
        }
        other => panic!("expected a generateProof frame, got {other:?}"),
    }

    control
        .send(zkauth_prover::infra::SchedulerMessage::Shutdown)
        .await
        .unwrap();
}

#[tokio::test]
async fn worker_reply_records_the_proof() {
    let store = test_store().await;
    let (dispatch, mut frames) = TestDispatch::new();
    dispatch.set_online(true);
    let (results_tx, results_rx) = mpsc::channel(8);

    let job = sample_job("n1");
    store.insert_job(&job).await.unwrap();

    let (_handle, _control) = spawn_scheduler(
        fast_config(Duration::from_secs(600)),
        Arc::clone(&store),
        dispatch.clone() as Arc<dyn WorkerDispatch>,
        results_rx,
    );

    let frame = frames.recv().await.unwrap();
    let ServerFrame::GenerateProof { proof_id, .. } = frame else {
        panic!("expected a generateProof frame");
    };

    results_tx
        .send(ProofResult {
            proof_id,
            proof: sample_proof(),
            public_signals: vec!["9".to_string()],
        })
        .await
        .unwrap();

    let done = wait_for_status(&store, job.id, JobStatus::Generated).await;
    assert_eq!(done.proof.unwrap(), sample_proof());
    assert_eq!(done.public_signals.unwrap(), vec!["9".to_string()]);
    assert!(done.updated_at >= done.created_at);
}

#[tokio::test]
async fn timeout_converts_generating_to_failed() {
    let store = test_store().await;
    let (dispatch, mut frames) = TestDispatch::new();
    dispatch.set_online(true);
    let (_results_tx, results_rx) = mpsc::channel(8);

    let job = sample_job("n1");
    store.insert_job(&job).await.unwrap();

    let (_handle, _control) = spawn_scheduler(
        fast_config(Duration::from_millis(150)),
        Arc::clone(&store),
        dispatch.clone() as Arc<dyn WorkerDispatch>,
        results_rx,
    );

    let _ = frames.recv().await.unwrap();
    let failed = wait_for_status(&store, job.id, JobStatus::Failed).await;
    // The inputs recorded at creation survive the failure.
    assert!(failed.inputs.is_some());
    assert!(failed.proof.is_none());
}

#[tokio::test]
async fn late_reply_after_timeout_does_not_overwrite_failed() {
    let store = test_store().await;
    let (dispatch, mut frames) = TestDispatch::new();
    dispatch.set_online(true);
    let (results_tx, results_rx) = mpsc::channel(8);

    let job = sample_job("n1");
    store.insert_job(&job).await.unwrap();

    let (_handle, _control) = spawn_scheduler(
        fast_config(Duration::from_millis(100)),
        Arc::clone(&store),
        dispatch.clone() as Arc<dyn WorkerDispatch>,
        results_rx,
    );

    let ServerFrame::GenerateProof { proof_id, .. } = frames.recv().await.unwrap() else {
        panic!("expected a generateProof frame");
    };

    wait_for_status(&store, job.id, JobStatus::Failed).await;

    // The straggler finally answers.
    results_tx
        .send(ProofResult {
            proof_id,
            proof: sample_proof(),
            public_signals: vec![],
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let still = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(still.status, JobStatus::Failed);
    assert!(still.proof.is_none());
}

#[tokio::test]
async fn jobs_are_selected_oldest_first() {
    let store = test_store().await;
    let (dispatch, mut frames) = TestDispatch::new();
    dispatch.set_online(true);
    let (results_tx, results_rx) = mpsc::channel(8);

    let mut older = sample_job("n1");
    older.created_at = chrono::Utc::now() - chrono::Duration::seconds(30);
    older.updated_at = older.created_at;
    let newer = sample_job("n2");
    store.insert_job(&newer).await.unwrap();
    store.insert_job(&older).await.unwrap();

    let (_handle, _control) = spawn_scheduler(
        fast_config(Duration::from_secs(600)),
        Arc::clone(&store),
        dispatch.clone() as Arc<dyn WorkerDispatch>,
        results_rx,
    );

    let ServerFrame::GenerateProof { proof_id, .. } = frames.recv().await.unwrap() else {
        panic!("expected a generateProof frame");
    };
    assert_eq!(proof_id, older.id, "oldest waiting job goes first");

    // Completing the first frees the worker for the second.
    results_tx
        .send(ProofResult {
            proof_id,
            proof: sample_proof(),
            public_signals: vec![],
        })
        .await
        .unwrap();

    let ServerFrame::GenerateProof { proof_id, .. } = frames.recv().await.unwrap() else {
        panic!("expected a generateProof frame");
    };
    assert_eq!(proof_id, newer.id);
}
