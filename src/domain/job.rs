//! Proof job row: one durable record per accepted proof request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CircuitInputs, Groth16Proof, JobStatus, ProofFields};

/// A durable proof job.
///
/// Invariants:
/// - at most one job exists per `nonce` (enforced by the store);
/// - `inputs`/`fields` are set at creation and never rewritten;
/// - `proof`/`public` are set only on the `generated` transition;
/// - `updated_at >= created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofJob {
    pub id: Uuid,
    /// References the consumed `NonceRecord`; unique across jobs.
    pub nonce: String,
    /// The raw token the job was built from, kept for audit.
    pub jwt: String,
    pub inputs: Option<CircuitInputs>,
    pub fields: Option<ProofFields>,
    pub proof: Option<Groth16Proof>,
    #[serde(rename = "public")]
    pub public_signals: Option<Vec<String>>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProofJob {
    /// Create a fresh `waiting` job carrying the circuit inputs it was
    /// admitted with.
    pub fn new(nonce: String, jwt: String, inputs: CircuitInputs, fields: ProofFields) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            nonce,
            jwt,
            inputs: Some(inputs),
            fields: Some(fields),
            proof: None,
            public_signals: None,
            status: JobStatus::Waiting,
            created_at: now,
            updated_at: now,
        }
    }
}
