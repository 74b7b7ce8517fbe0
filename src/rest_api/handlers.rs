//! HTTP handlers for the REST API

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, instrument, warn};

use crate::controller::{ConfigService, StatusHandle, Trigger};
use crate::crd::ClusterConfiguration;
use crate::Error;

use super::dto::{ErrorResponse, HealthResponse, NotifyResponse};

/// Shared state of the REST API
pub struct ApiState {
    pub config: Arc<ConfigService>,
    pub status: StatusHandle,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn store_failure(action: &str, e: &Error) -> ApiError {
    error!("Failed to {} cluster configuration: {}", action, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(&format!("{action}_failed"), &e.to_string())),
    )
}

/// Health check endpoint
#[instrument(skip(state))]
pub async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        node: state.config.node_name().to_string(),
        last_pass: state.status.read().await.clone(),
    })
}

/// Return the stored cluster configuration
#[instrument(skip(state))]
pub async fn get_config(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<ClusterConfiguration>, ApiError> {
    state
        .config
        .get()
        .await
        .map(Json)
        .map_err(|e| store_failure("get", &e))
}

/// Merge an update into the cluster configuration
#[instrument(skip(state, patch))]
pub async fn set_config(
    State(state): State<Arc<ApiState>>,
    Json(patch): Json<ClusterConfiguration>,
) -> Result<Json<ClusterConfiguration>, ApiError> {
    match state.config.update(&patch).await {
        Ok(config) => Ok(Json(config)),
        Err(Error::ConfigError(message)) => {
            warn!("Rejected cluster configuration update: {}", message);
            Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("invalid_config", &message)),
            ))
        }
        Err(e) => Err(store_failure("update", &e)),
    }
}

/// A peer wrote the configuration; re-evaluate if this node leads
#[instrument(skip(state))]
pub async fn notify(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<NotifyResponse>, ApiError> {
    match state.config.on_config_changed(Trigger::PeerNotified).await {
        Ok(triggered) => Ok(Json(NotifyResponse { triggered })),
        Err(e) => {
            error!("Failed to check leadership on peer notification: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("leader_check_failed", &e.to_string())),
            ))
        }
    }
}
