//! Identity-provider key set (JWKS) resolution.
//!
//! The provider publishes its RSA public keys as a JSON array; the builder
//! selects one by exact `kid` match. Fetching is a thin reqwest client with
//! a cache; a `kid` miss triggers one refresh before failing, so provider
//! key rotation does not require a restart.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::infra::{ProverError, Result};

/// A single JSON Web Key as served by the provider's certs endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    /// Base64url modulus.
    pub n: String,
    /// Base64url public exponent.
    pub e: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
}

/// The provider's key set document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Select a key by exact `kid` match.
pub fn find_by_kid<'a>(keys: &'a [Jwk], kid: &str) -> Result<&'a Jwk> {
    keys.iter()
        .find(|key| key.kid == kid)
        .ok_or_else(|| ProverError::UnknownKid(kid.to_string()))
}

/// Resolves a key id to the provider key it names.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, kid: &str) -> Result<Jwk>;
}

/// Caching JWKS client.
pub struct JwksClient {
    url: String,
    http: reqwest::Client,
    cache: RwLock<HashMap<String, Jwk>>,
}

impl JwksClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn cached(&self, kid: &str) -> Option<Jwk> {
        self.cache.read().ok().and_then(|g| g.get(kid).cloned())
    }

    async fn refresh(&self) -> Result<()> {
        let set: JwkSet = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProverError::JwksFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProverError::JwksFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProverError::JwksFetch(e.to_string()))?;

        if let Ok(mut guard) = self.cache.write() {
            guard.clear();
            for key in set.keys {
                guard.insert(key.kid.clone(), key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KeyResolver for JwksClient {
    /// Resolve a key id, refreshing the cache once on a miss.
    async fn resolve(&self, kid: &str) -> Result<Jwk> {
        if let Some(key) = self.cached(kid) {
            return Ok(key);
        }
        self.refresh().await?;
        self.cached(kid)
            .ok_or_else(|| ProverError::UnknownKid(kid.to_string()))
    }
}
