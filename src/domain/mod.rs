//! Core domain types for zkauth-prover.

pub mod inputs;
pub mod job;
pub mod types;

pub use inputs::CircuitInputs;
pub use job::ProofJob;
pub use types::{Groth16Proof, IssBase64Details, JobStatus, NonceRecord, ProofFields, WorkerId};
