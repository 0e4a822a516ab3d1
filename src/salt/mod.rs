//! Salt oracle contract.
//!
//! The salt service is an external collaborator: given a token it returns
//! an opaque decimal string. The pipeline imposes nothing on how the salt
//! is derived, only that `address_seed` stays deterministic in whatever
//! string arrives.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;

use crate::infra::{ProverError, Result};

/// Resolves the user salt for a token.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SaltOracle: Send + Sync {
    /// Fetch the salt bound to the token's identity.
    async fn salt_for(&self, jwt: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct SaltResponse {
    salt: String,
}

/// HTTP client for the salt service: `POST {url}` with `{"token": <jwt>}`,
/// response `{"salt": "<decimal>"}`.
pub struct HttpSaltOracle {
    url: String,
    http: reqwest::Client,
}

impl HttpSaltOracle {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SaltOracle for HttpSaltOracle {
    async fn salt_for(&self, jwt: &str) -> Result<String> {
        let response: SaltResponse = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "token": jwt }))
            .send()
            .await
            .map_err(|e| ProverError::SaltOracle(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProverError::SaltOracle(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProverError::SaltOracle(e.to_string()))?;
        Ok(response.salt)
    }
}
