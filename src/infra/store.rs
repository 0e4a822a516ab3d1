//! Durable store contract for proof jobs and nonce records.
//!
//! Invariant: terminal statuses are sinks. Every mutation carries a status
//! precondition so the first terminal transition wins and later writers
//! observe a conflict instead of overwriting.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use crate::domain::{Groth16Proof, NonceRecord, ProofJob};

use super::Result;

/// Key-addressable rows with atomic single-row updates.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProofJobStore: Send + Sync {
    /// Atomically create a job. Fails if a job for the nonce already exists.
    async fn insert_job(&self, job: &ProofJob) -> Result<()>;

    /// Read a job by id.
    async fn get_job(&self, id: Uuid) -> Result<Option<ProofJob>>;

    /// The oldest `waiting` job by `created_at`, if any.
    async fn find_oldest_waiting(&self) -> Result<Option<ProofJob>>;

    /// `waiting -> generating`. Errors with a conflict if the row is not
    /// `waiting`.
    async fn mark_generating(&self, id: Uuid) -> Result<()>;

    /// `generating -> failed`. Returns whether a row changed; terminal rows
    /// are left untouched.
    async fn mark_failed(&self, id: Uuid) -> Result<bool>;

    /// `generating -> generated`, recording the proof and public signals.
    /// Returns whether a row changed.
    async fn complete_job(
        &self,
        id: Uuid,
        proof: &Groth16Proof,
        public_signals: &[String],
    ) -> Result<bool>;

    /// Persist a freshly issued nonce record.
    async fn insert_nonce_record(&self, record: &NonceRecord) -> Result<()>;

    /// Consume a nonce record: read and delete in one transaction so each
    /// record is spent at most once.
    async fn consume_nonce(&self, nonce: &str) -> Result<Option<NonceRecord>>;
}
