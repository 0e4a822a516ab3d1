//! SQLite-backed proof job store.
//!
//! One row per job, JSON-encoded circuit inputs and proof columns, RFC3339
//! timestamps. Status preconditions live in the UPDATE statements so the
//! terminal-state discipline holds even against a concurrent writer.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, FromRow};
use uuid::Uuid;

use crate::domain::{CircuitInputs, Groth16Proof, JobStatus, NonceRecord, ProofFields, ProofJob};

use super::{ProofJobStore, ProverError, Result};
use async_trait::async_trait;

/// SQLite job store.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Wrap an existing connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database at the given path.
    pub async fn from_path(path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(path).await?;
        Ok(Self { pool })
    }

    /// Create the schema if it does not exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS proof_jobs (
                id TEXT PRIMARY KEY,
                nonce TEXT NOT NULL UNIQUE,
                jwt TEXT NOT NULL,
                inputs TEXT,
                fields TEXT,
                proof TEXT,
                public_signals TEXT,
                status TEXT NOT NULL
                    CHECK (status IN ('waiting','generating','generated','failed')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_proof_jobs_status_created
            ON proof_jobs(status, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nonce_records (
                nonce TEXT PRIMARY KEY,
                ephemeral_public_key TEXT NOT NULL UNIQUE,
                randomness TEXT NOT NULL,
                max_epoch INTEGER NOT NULL,
                auth_state TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ProofJobStore for SqliteJobStore {
    async fn insert_job(&self, job: &ProofJob) -> Result<()> {
        let inputs_json = job
            .inputs
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ProverError::Internal(e.to_string()))?;
        let fields_json = job
            .fields
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ProverError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO proof_jobs (
                id, nonce, jwt, inputs, fields,
                proof, public_signals, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, NULL, NULL, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(&job.nonce)
        .bind(&job.jwt)
        .bind(inputs_json)
        .bind(fields_json)
        .bind(job.status.as_str())
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<ProofJob>> {
        let row = sqlx::query_as::<_, ProofJobRow>(
            r#"
            SELECT id, nonce, jwt, inputs, fields,
                   proof, public_signals, status, created_at, updated_at
            FROM proof_jobs
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProofJob::try_from).transpose()
    }

    async fn find_oldest_waiting(&self) -> Result<Option<ProofJob>> {
        let row = sqlx::query_as::<_, ProofJobRow>(
            r#"
            SELECT id, nonce, jwt, inputs, fields,
                   proof, public_signals, status, created_at, updated_at
            FROM proof_jobs
            WHERE status = 'waiting'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProofJob::try_from).transpose()
    }

    async fn mark_generating(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE proof_jobs SET status = 'generating', updated_at = ?
            WHERE id = ? AND status = 'waiting'
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ProverError::StoreUpdateConflict(id));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE proof_jobs SET status = 'failed', updated_at = ?
            WHERE id = ? AND status = 'generating'
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_job(
        &self,
        id: Uuid,
        proof: &Groth16Proof,
        public_signals: &[String],
    ) -> Result<bool> {
        let proof_json =
            serde_json::to_string(proof).map_err(|e| ProverError::Internal(e.to_string()))?;
        let public_json = serde_json::to_string(public_signals)
            .map_err(|e| ProverError::Internal(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE proof_jobs
            SET status = 'generated', proof = ?, public_signals = ?, updated_at = ?
            WHERE id = ? AND status = 'generating'
            "#,
        )
        .bind(proof_json)
        .bind(public_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_nonce_record(&self, record: &NonceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO nonce_records (
                nonce, ephemeral_public_key, randomness,
                max_epoch, auth_state, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.nonce)
        .bind(&record.ephemeral_public_key)
        .bind(&record.randomness)
        .bind(record.max_epoch as i64)
        .bind(&record.auth_state)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume_nonce(&self, nonce: &str) -> Result<Option<NonceRecord>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, NonceRecordRow>(
            r#"
            SELECT nonce, ephemeral_public_key, randomness,
                   max_epoch, auth_state, created_at
            FROM nonce_records
            WHERE nonce = ?
            "#,
        )
        .bind(nonce)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query("DELETE FROM nonce_records WHERE nonce = ?")
            .bind(nonce)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(NonceRecord::try_from(row)?))
    }
}

/// Raw row from the proof_jobs table.
#[derive(Debug, FromRow)]
struct ProofJobRow {
    id: String,
    nonce: String,
    jwt: String,
    inputs: Option<String>,
    fields: Option<String>,
    proof: Option<String>,
    public_signals: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ProofJobRow> for ProofJob {
    type Error = ProverError;

    fn try_from(row: ProofJobRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| ProverError::Internal(format!("invalid job id: {e}")))?;

        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| ProverError::Internal(format!("invalid status: {}", row.status)))?;

        let inputs: Option<CircuitInputs> = row
            .inputs
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| ProverError::Internal(format!("invalid inputs JSON: {e}")))?;

        let fields: Option<ProofFields> = row
            .fields
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| ProverError::Internal(format!("invalid fields JSON: {e}")))?;

        let proof: Option<Groth16Proof> = row
            .proof
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| ProverError::Internal(format!("invalid proof JSON: {e}")))?;

        let public_signals: Option<Vec<String>> = row
            .public_signals
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| ProverError::Internal(format!("invalid public signals JSON: {e}")))?;

        Ok(ProofJob {
            id,
            nonce: row.nonce,
            jwt: row.jwt,
            inputs,
            fields,
            proof,
            public_signals,
            status,
            created_at: parse_timestamp(&row.created_at, "created_at")?,
            updated_at: parse_timestamp(&row.updated_at, "updated_at")?,
        })
    }
}

/// Raw row from the nonce_records table.
#[derive(Debug, FromRow)]
struct NonceRecordRow {
    nonce: String,
    ephemeral_public_key: String,
    randomness: String,
    max_epoch: i64,
    auth_state: String,
    created_at: String,
}

impl TryFrom<NonceRecordRow> for NonceRecord {
    type Error = ProverError;

    fn try_from(row: NonceRecordRow) -> Result<Self> {
        Ok(NonceRecord {
            nonce: row.nonce,
            ephemeral_public_key: row.ephemeral_public_key,
            randomness: row.randomness,
            max_epoch: row.max_epoch as u64,
            auth_state: row.auth_state,
            created_at: parse_timestamp(&row.created_at, "created_at")?,
        })
    }
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ProverError::Internal(format!("invalid {column}: {e}")))
}
