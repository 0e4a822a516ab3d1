//! zkauth-prover Library
//!
//! Bridges an OAuth2 identity assertion (a signed RS256 JWT) to a
//! zero-knowledge proof that the user controls a chain-bound ephemeral key,
//! without revealing the OAuth identity on chain.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (proof jobs, nonce records, circuit inputs)
//! - [`crypto`] - Poseidon over BN254, base conversion, nonce commitments
//! - [`jwt`] - JWT dissection and claim location
//! - [`zk`] - Circuit input construction
//! - [`jwks`] - Identity-provider key set resolution
//! - [`salt`] - Salt oracle contract
//! - [`infra`] - Job store, scheduler, error taxonomy
//! - [`channel`] - Bidirectional worker channel (server and worker sides)
//! - [`prover`] - Worker-side witness and prover execution
//! - [`api`] - HTTP surface (health, job submission, job polling)

pub mod api;
pub mod channel;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod jwks;
pub mod jwt;
pub mod prover;
pub mod salt;
pub mod server;
pub mod zk;

// Re-export commonly used types
pub use domain::{
    CircuitInputs, Groth16Proof, IssBase64Details, JobStatus, NonceRecord, ProofFields, ProofJob,
};

pub use infra::{ProofJobStore, ProverError, Result, Scheduler, SqliteJobStore};

pub use zk::{generate_zk_input, ZkInputRequest, ZkInputResult};
