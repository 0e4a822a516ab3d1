//! Shared type definitions: job status, proof shapes, nonce records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a proof job.
///
/// Transitions form a DAG: `waiting -> generating -> {generated, failed}`.
/// Terminal states are sinks; no backward transitions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Inserted, not yet dispatched to a worker.
    Waiting,
    /// Dispatched to a worker; a timeout is armed.
    Generating,
    /// Proof and public signals recorded.
    Generated,
    /// Timed out or the terminal update was refused.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Generating => "generating",
            JobStatus::Generated => "generated",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(JobStatus::Waiting),
            "generating" => Some(JobStatus::Generating),
            "generated" => Some(JobStatus::Generated),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Generated | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal edge of the status DAG.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Waiting, JobStatus::Generating)
                | (JobStatus::Generating, JobStatus::Generated)
                | (JobStatus::Generating, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque identifier assigned to a connected worker channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Groth16 proof over BN254 as emitted by the prover: three points in
/// projective decimal-string coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    pub pi_a: [String; 3],
    pub pi_b: [[String; 2]; 3],
    pub pi_c: [String; 3],
}

/// Location of the `iss` claim within the base64 payload, as the on-chain
/// verifier consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssBase64Details {
    /// Poseidon hash of the base64 substring covering the `iss` claim.
    pub value: String,
    /// Offset of that substring within the payload, mod 4.
    pub index_mod_4: u8,
}

/// Identity-derived fields returned alongside the circuit inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofFields {
    /// Poseidon commitment to `(kc_name, sub, aud, salt)`; the user's
    /// on-chain address derives from it.
    pub address_seed: String,
    /// Poseidon hash of the base64url JWT header.
    pub header: String,
    pub iss_base64_details: IssBase64Details,
}

/// Record created when a login nonce is issued and consumed exactly once
/// when the corresponding token returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRecord {
    /// Hex-encoded 32-byte Ed25519 public key (`0x` + 64 hex chars); unique.
    pub ephemeral_public_key: String,
    /// Poseidon-derived commitment bound into the JWT by the provider.
    pub nonce: String,
    /// Decimal randomness folded into the nonce commitment.
    pub randomness: String,
    /// Last epoch at which the ephemeral key is valid.
    pub max_epoch: u64,
    /// 32 random bytes, base64url; the CSRF token for the OAuth round trip.
    pub auth_state: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Waiting,
            JobStatus::Generating,
            JobStatus::Generated,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("done"), None);
    }

    #[test]
    fn status_serde_uses_lowercase() {
        let json = serde_json::to_string(&JobStatus::Generating).unwrap();
        assert_eq!(json, "\"generating\"");
        let back: JobStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(back, JobStatus::Failed);
    }

    #[test]
    fn terminal_states_are_sinks() {
        for terminal in [JobStatus::Generated, JobStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                JobStatus::Waiting,
                JobStatus::Generating,
                JobStatus::Generated,
                JobStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn dag_edges() {
        assert!(JobStatus::Waiting.can_transition_to(JobStatus::Generating));
        assert!(JobStatus::Generating.can_transition_to(JobStatus::Generated));
        assert!(JobStatus::Generating.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Waiting.can_transition_to(JobStatus::Generated));
        assert!(!JobStatus::Generating.can_transition_to(JobStatus::Waiting));
    }

    #[test]
    fn groth16_proof_serde_shape() {
        let proof = Groth16Proof {
            pi_a: ["1".into(), "2".into(), "1".into()],
            pi_b: [
                ["1".into(), "2".into()],
                ["3".into(), "4".into()],
                ["1".into(), "0".into()],
            ],
            pi_c: ["5".into(), "6".into(), "1".into()],
        };
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["pi_a"].as_array().unwrap().len(), 3);
        assert_eq!(json["pi_b"][1][1], "4");
        let back: Groth16Proof = serde_json::from_value(json).unwrap();
        assert_eq!(back, proof);
    }
}
