//! Worker process: connects to the scheduler and executes proof tasks.

use zkauth_prover::channel::{WorkerConfig, WorkerRuntime};
use zkauth_prover::prover::{NativeProver, ProverConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zkauth_prover::server::init_tracing();

    let prover_config = ProverConfig::from_env()?;
    let worker_config = WorkerConfig::from_env();

    let runtime = WorkerRuntime::new(worker_config, NativeProver::new(prover_config).into_backend());
    runtime.run().await;

    Ok(())
}
