//! Worker-side proof execution.
//!
//! Materialises the circuit inputs into a per-job working directory keyed
//! by `address_seed` (no cross-job collisions, and the directory doubles as
//! an audit trail), then drives the native witness generator and Groth16
//! prover as subprocesses.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::{debug, info};

use crate::channel::protocol::{ProofResults, ProofTaskPayload};
use crate::domain::Groth16Proof;
use crate::infra::{ProverError, Result};

/// Proof backend contract: payload in, proof material out.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProofBackend: Send + Sync {
    async fn prove(&self, payload: ProofTaskPayload) -> Result<ProofResults>;
}

/// Process-wide prover configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ProverConfig {
    /// Root of the per-job working directories.
    pub cache_dir: PathBuf,
    /// Proving key bound to the circuit.
    pub zkey_path: PathBuf,
    /// Witness generator: `witness_bin input.json witness.wtns`.
    pub witness_bin: PathBuf,
    /// Prover: `prover_bin zkey witness.wtns proof.json public.json`.
    pub prover_bin: PathBuf,
}

impl ProverConfig {
    /// Load configuration from environment. `PROOF_MODE` selects the
    /// backend; only `binary` is compiled into this build.
    pub fn from_env() -> Result<Self> {
        match std::env::var("PROOF_MODE").as_deref() {
            Ok("binary") | Err(_) => {}
            Ok("wasm") => {
                return Err(ProverError::Configuration(
                    "PROOF_MODE=wasm selects the in-process prover, which this build \
                     does not include; use PROOF_MODE=binary"
                        .to_string(),
                ))
            }
            Ok(other) => {
                return Err(ProverError::Configuration(format!(
                    "unknown PROOF_MODE {other:?}"
                )))
            }
        }

        Ok(Self {
            cache_dir: env_path("CACHE_DIR", "./cache"),
            zkey_path: env_path("ZKEY_PATH", "./artifacts/circuit.zkey"),
            witness_bin: env_path("WITNESS_BIN_PATH", "./artifacts/witness"),
            prover_bin: env_path("PROVER_BIN_PATH", "./artifacts/prover"),
        })
    }
}

fn env_path(name: &str, default: &str) -> PathBuf {
    std::env::var(name)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

/// Subprocess-backed prover.
pub struct NativeProver {
    config: ProverConfig,
}

impl NativeProver {
    pub fn new(config: ProverConfig) -> Self {
        Self { config }
    }

    pub fn into_backend(self) -> Arc<dyn ProofBackend> {
        Arc::new(self)
    }

    async fn run_step(&self, name: &str, binary: &Path, args: &[&PathBuf]) -> Result<()> {
        debug!(step = name, binary = %binary.display(), "Running prover step");
        let output = Command::new(binary)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                ProverError::WorkerExecutionFailed(format!(
                    "{name} ({}) failed to start: {e}",
                    binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(ProverError::WorkerExecutionFailed(format!(
                "{name} exited with {}: {tail}",
                output.status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ProofBackend for NativeProver {
    async fn prove(&self, payload: ProofTaskPayload) -> Result<ProofResults> {
        let work_dir = self.config.cache_dir.join(&payload.fields.address_seed);
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| ProverError::WorkerExecutionFailed(format!("mkdir: {e}")))?;

        let input_path = work_dir.join("input.json");
        let witness_path = work_dir.join("witness.wtns");
        let proof_path = work_dir.join("proof.json");
        let public_path = work_dir.join("public.json");

        let input_json = serde_json::to_vec_pretty(&payload.inputs)
            .map_err(|e| ProverError::Internal(format!("inputs encode: {e}")))?;
        tokio::fs::write(&input_path, input_json)
            .await
            .map_err(|e| ProverError::WorkerExecutionFailed(format!("write input: {e}")))?;

        self.run_step(
            "witness",
            &self.config.witness_bin,
            &[&input_path, &witness_path],
        )
        .await?;
        self.run_step(
            "prover",
            &self.config.prover_bin,
            &[
                &self.config.zkey_path,
                &witness_path,
                &proof_path,
                &public_path,
            ],
        )
        .await?;

        let proof_json = tokio::fs::read(&proof_path)
            .await
            .map_err(|e| ProverError::WorkerExecutionFailed(format!("read proof: {e}")))?;
        let proof: Groth16Proof = serde_json::from_slice(&proof_json)
            .map_err(|e| ProverError::WorkerExecutionFailed(format!("parse proof: {e}")))?;

        let public_json = tokio::fs::read(&public_path)
            .await
            .map_err(|e| ProverError::WorkerExecutionFailed(format!("read public: {e}")))?;
        let public: Vec<String> = serde_json::from_slice(&public_json)
            .map_err(|e| ProverError::WorkerExecutionFailed(format!("parse public: {e}")))?;

        info!(
            work_dir = %work_dir.display(),
            "Proof artifacts written"
        );
        Ok(ProofResults { proof, public })
    }
}
