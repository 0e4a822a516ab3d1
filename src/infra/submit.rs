//! Job submission: the bridge from a returned token to a `waiting` proof
//! job.
//!
//! Consumes the nonce record the token was issued against, resolves the
//! salt and the provider key, builds the circuit inputs and inserts the
//! job. Input-construction errors surface synchronously to the caller; from
//! insertion on, the initiator observes the job by polling.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::crypto::{generate_auth_state, generate_nonce};
use crate::domain::{NonceRecord, ProofJob};
use crate::jwks::KeyResolver;
use crate::jwt::dissect;
use crate::salt::SaltOracle;
use crate::zk::{generate_zk_input, ZkInputRequest};

use super::{ProofJobStore, ProverError, Result};

/// Accepts tokens and turns them into durable proof jobs.
pub struct SubmitService {
    store: Arc<dyn ProofJobStore>,
    salt_oracle: Arc<dyn SaltOracle>,
    key_resolver: Arc<dyn KeyResolver>,
}

impl SubmitService {
    pub fn new(
        store: Arc<dyn ProofJobStore>,
        salt_oracle: Arc<dyn SaltOracle>,
        key_resolver: Arc<dyn KeyResolver>,
    ) -> Self {
        Self {
            store,
            salt_oracle,
            key_resolver,
        }
    }

    /// Issue a login nonce for an ephemeral key and persist its record.
    pub async fn issue_nonce(
        &self,
        ephemeral_public_key: &str,
        max_epoch: u64,
    ) -> Result<NonceRecord> {
        let parts = generate_nonce(ephemeral_public_key, max_epoch)?;
        let record = NonceRecord {
            ephemeral_public_key: ephemeral_public_key.to_string(),
            nonce: parts.nonce,
            randomness: parts.randomness,
            max_epoch,
            auth_state: generate_auth_state(),
            created_at: Utc::now(),
        };
        self.store.insert_nonce_record(&record).await?;
        info!(nonce = %record.nonce, "Issued login nonce");
        Ok(record)
    }

    /// Accept a returned token: build circuit inputs and insert the job.
    pub async fn submit(&self, jwt: &str) -> Result<ProofJob> {
        let parts = dissect(jwt)?;

        let record = self
            .store
            .consume_nonce(&parts.claims.nonce)
            .await?
            .ok_or_else(|| ProverError::UnknownNonce(parts.claims.nonce.clone()))?;

        let salt = self.salt_oracle.salt_for(jwt).await?;
        let jwk = self.key_resolver.resolve(&parts.kid).await?;
        let jwks = [jwk];

        let max_epoch = record.max_epoch.to_string();
        let request = ZkInputRequest {
            jwt,
            salt: &salt,
            ephemeral_public_key: &record.ephemeral_public_key,
            max_epoch: &max_epoch,
            randomness: &record.randomness,
            jwks: &jwks,
        };
        let result = generate_zk_input(&request)?;

        let job = ProofJob::new(
            parts.claims.nonce,
            jwt.to_string(),
            result.inputs,
            result.fields,
        );
        self.store.insert_job(&job).await?;
        info!(job_id = %job.id, nonce = %job.nonce, "Accepted proof job");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::store::MockProofJobStore;
    use crate::jwks::MockKeyResolver;
    use crate::salt::MockSaltOracle;

    fn wired(store: MockProofJobStore) -> SubmitService {
        let mut oracle = MockSaltOracle::new();
        oracle.expect_salt_for().returning(|_| Ok("1".to_string()));
        let mut resolver = MockKeyResolver::new();
        resolver
            .expect_resolve()
            .returning(|kid| Err(ProverError::UnknownKid(kid.to_string())));
        SubmitService::new(Arc::new(store), Arc::new(oracle), Arc::new(resolver))
    }

    #[tokio::test]
    async fn malformed_token_is_rejected_before_any_store_access() {
        let store = MockProofJobStore::new(); // no expectations: must not be touched
        let service = wired(store);
        let err = service.submit("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, ProverError::InvalidJwtShape(_)));
    }

    #[tokio::test]
    async fn unknown_nonce_is_rejected() {
        let header = r#"{"alg":"RS256","kid":"k"}"#;
        let payload = r#"{"iss":"i","aud":"a","sub":"s","nonce":"ghost","iat":1}"#;
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        let jwt = format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(b"sig")
        );

        let mut store = MockProofJobStore::new();
        store.expect_consume_nonce().returning(|_| Ok(None));
        let service = wired(store);

        match service.submit(&jwt).await {
            Err(ProverError::UnknownNonce(nonce)) => assert_eq!(nonce, "ghost"),
            other => panic!("expected UnknownNonce, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn issue_nonce_persists_a_record() {
        const KEY: &str = "0xfafd1d9e25a87e9652976a7bb06c2e4777c2e539d90f3ee7b6b12b9a45118a88";
        let mut store = MockProofJobStore::new();
        store
            .expect_insert_nonce_record()
            .withf(|record: &NonceRecord| {
                record.max_epoch == 9 && record.nonce.len() == 27 && !record.auth_state.is_empty()
            })
            .returning(|_| Ok(()));
        let service = wired(store);

        let record = service.issue_nonce(KEY, 9).await.unwrap();
        assert_eq!(record.ephemeral_public_key, KEY);
    }
}
