//! Server bootstrap.
//!
//! Wires together configuration, the SQLite job store, the worker channel
//! pool, the scheduler and the Axum router. Configuration is read once
//! here; nothing re-reads the environment mid-run.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::{self, AppState};
use crate::channel::{ChannelConfig, WorkerPool};
use crate::infra::{
    spawn_scheduler, ProofJobStore, SchedulerConfig, SqliteJobStore, SubmitService, WorkerDispatch,
};
use crate::jwks::JwksClient;
use crate::salt::HttpSaltOracle;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL.
    pub database_url: String,
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Identity provider certs endpoint.
    pub jwks_url: String,
    /// Salt oracle endpoint.
    pub salt_service_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://zkauth.db?mode=rwc".to_string());

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .expect("Invalid listen address");

        let jwks_url = std::env::var("JWKS_URL")
            .unwrap_or_else(|_| "https://www.googleapis.com/oauth2/v3/certs".to_string());

        let salt_service_url = std::env::var("SALT_SERVICE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:5002/get_salt".to_string());

        Self {
            database_url,
            listen_addr,
            jwks_url,
            salt_service_url,
        }
    }
}

/// Initialise tracing from `RUST_LOG`, defaulting to info.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Start the server: store, scheduler, worker channel and HTTP listener.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting zkauth-prover v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();

    let store = SqliteJobStore::from_path(&config.database_url).await?;
    store.initialize().await?;
    let store: Arc<dyn ProofJobStore> = Arc::new(store);

    let (results_tx, results_rx) = mpsc::channel(64);
    let pool = Arc::new(WorkerPool::new(ChannelConfig::from_env(), results_tx));

    let (_scheduler_handle, _scheduler_control) = spawn_scheduler(
        SchedulerConfig::from_env(),
        Arc::clone(&store),
        Arc::clone(&pool) as Arc<dyn WorkerDispatch>,
        results_rx,
    );

    let submit = Arc::new(SubmitService::new(
        Arc::clone(&store),
        Arc::new(HttpSaltOracle::new(config.salt_service_url.clone())),
        Arc::new(JwksClient::new(config.jwks_url.clone())),
    ));

    let state = AppState {
        submit,
        store,
        pool,
    };
    let app = api::router(state);

    info!(addr = %config.listen_addr, "Listening");
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_usable() {
        // Scoped to whatever the test environment carries; the defaults
        // must parse regardless.
        let config = Config::from_env();
        assert!(!config.database_url.is_empty());
        assert!(!config.jwks_url.is_empty());
    }
}
