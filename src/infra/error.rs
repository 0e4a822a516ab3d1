//! Error types for the zkauth-prover pipeline.
//!
//! One taxonomy covers both the synchronous input-construction path (errors
//! propagate to the initiator) and the asynchronous scheduler/worker path
//! (errors are recorded on the job row and logged, never raised to the
//! initiator).

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur across the proving pipeline.
#[derive(Error, Debug)]
pub enum ProverError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed JWT: wrong segment count, bad base64, or non-JSON content
    #[error("invalid jwt shape: {0}")]
    InvalidJwtShape(String),

    /// A required claim is absent from the payload
    #[error("missing claim: {0}")]
    MissingClaim(String),

    /// No JWKS entry matches the token's key id
    #[error("unknown kid: {0}")]
    UnknownKid(String),

    /// Poseidon arity above the supported maximum
    #[error("unable to hash length {0}")]
    HashArityUnsupported(usize),

    /// Poseidon called with no inputs
    #[error("cannot hash an empty input")]
    EmptyInput,

    /// The token's nonce has no live record (never issued or already spent)
    #[error("unknown nonce: {0}")]
    UnknownNonce(String),

    /// Channel closed between worker selection and send
    #[error("worker dispatch failed: {0}")]
    WorkerDispatchFailed(String),

    /// Witness or prover step failed on the worker
    #[error("worker execution failed: {0}")]
    WorkerExecutionFailed(String),

    /// Update refused because the row is terminal or gone
    #[error("store update conflict for job {0}")]
    StoreUpdateConflict(Uuid),

    /// Job not found
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// Heartbeat discipline violated; the connection must be torn down
    #[error("channel unhealthy: {0}")]
    ChannelUnhealthy(String),

    /// Salt oracle call failed
    #[error("salt oracle error: {0}")]
    SaltOracle(String),

    /// JWKS endpoint could not be fetched or parsed
    #[error("jwks fetch error: {0}")]
    JwksFetch(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, ProverError>;
