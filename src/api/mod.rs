//! HTTP surface.
//!
//! Deliberately small: a health probe, nonce issuance, job submission, job
//! polling and the worker WebSocket endpoint. The OAuth2 authorization
//! dance and user-profile surfaces live elsewhere; the initiator observes a
//! job purely by polling it.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::channel::{handle_socket, WorkerPool};
use crate::domain::{JobStatus, NonceRecord, ProofJob};
use crate::infra::{ProofJobStore, ProverError, SubmitService};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub submit: Arc<SubmitService>,
    pub store: Arc<dyn ProofJobStore>,
    pub pool: Arc<WorkerPool>,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/nonce", post(issue_nonce))
        .route("/v1/proofs", post(submit_proof))
        .route("/v1/proofs/:id", get(get_proof))
        .route("/ws", get(worker_channel))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    connected_workers: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "zkauth-prover",
        version: env!("CARGO_PKG_VERSION"),
        connected_workers: state.pool.connected(),
    })
}

#[derive(Debug, Deserialize)]
struct NonceRequest {
    ephemeral_public_key: String,
    max_epoch: u64,
}

async fn issue_nonce(
    State(state): State<AppState>,
    Json(request): Json<NonceRequest>,
) -> Result<Json<NonceRecord>, ApiError> {
    let record = state
        .submit
        .issue_nonce(&request.ephemeral_public_key, request.max_epoch)
        .await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    jwt: String,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    id: Uuid,
    status: JobStatus,
}

async fn submit_proof(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let job = state.submit.submit(&request.jwt).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            id: job.id,
            status: job.status,
        }),
    ))
}

async fn get_proof(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProofJob>, ApiError> {
    let job = state
        .store
        .get_job(id)
        .await?
        .ok_or(ProverError::JobNotFound(id))?;
    Ok(Json(job))
}

async fn worker_channel(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let pool = Arc::clone(&state.pool);
    ws.on_upgrade(move |socket| handle_socket(socket, pool))
}

/// Error wrapper mapping pipeline errors to status codes.
#[derive(Debug)]
pub struct ApiError(ProverError);

impl From<ProverError> for ApiError {
    fn from(error: ProverError) -> Self {
        Self(error)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ProverError::InvalidJwtShape(_)
            | ProverError::MissingClaim(_)
            | ProverError::UnknownKid(_)
            | ProverError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ProverError::UnknownNonce(_) | ProverError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ProverError::SaltOracle(_) | ProverError::JwksFetch(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: ProverError) -> StatusCode {
        ApiError(error).into_response().status()
    }

    #[test]
    fn input_construction_errors_surface_as_422() {
        assert_eq!(
            status_of(ProverError::InvalidJwtShape("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(ProverError::MissingClaim("sub".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(ProverError::UnknownKid("k".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn lookups_surface_as_404() {
        assert_eq!(
            status_of(ProverError::JobNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ProverError::UnknownNonce("n".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn upstream_failures_surface_as_502() {
        assert_eq!(
            status_of(ProverError::SaltOracle("down".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn everything_else_is_500() {
        assert_eq!(
            status_of(ProverError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
