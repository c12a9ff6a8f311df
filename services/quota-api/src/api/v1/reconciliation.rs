//! Reconciliation API endpoints.

use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use eduq_reconcile::{ReconcileError, MAX_DEADLINE};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::api::{error::ApiError, request_id};
use crate::state::AppState;

/// Create reconciliation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bulk", post(bulk_reconcile))
        .route("/status", get(status))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters for a bulk run.
#[derive(Debug, Deserialize)]
pub struct BulkQuery {
    /// Override the configured deadline, in seconds.
    pub timeout_secs: Option<u64>,
}

/// Static readiness of the reconciliation service.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
    pub timestamp: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Reconcile every student and wait for the result.
///
/// POST /v1/reconciliation/bulk
async fn bulk_reconcile(
    State(state): State<AppState>,
    Query(query): Query<BulkQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = request_id();

    let timeout = match query.timeout_secs {
        Some(secs) => Duration::from_secs(secs),
        None => state.bulk_timeout(),
    };
    let deadline = bulk_deadline(Instant::now(), timeout)
        .map_err(|e| e.with_request_id(request_id.clone()))?;

    info!(request_id = %request_id, timeout_secs = timeout.as_secs(), "Bulk reconciliation requested");

    match state.reconciler().reconcile_all(deadline).await {
        Ok(result) => Ok(Json(result)),
        Err(e @ ReconcileError::Timeout { .. }) => {
            warn!(request_id = %request_id, error = %e, "Bulk reconciliation timed out");
            Err(
                ApiError::gateway_timeout("reconciliation_timeout", e.to_string())
                    .with_request_id(request_id),
            )
        }
        Err(e @ ReconcileError::ListStudents(_)) => {
            error!(request_id = %request_id, error = %e, "Bulk reconciliation failed");
            Err(ApiError::internal("reconciliation_failed", e.to_string())
                .with_request_id(request_id))
        }
    }
}

/// Deadline for a bulk run started at `now`, bounded by [`MAX_DEADLINE`].
fn bulk_deadline(now: Instant, timeout: Duration) -> Result<Instant, ApiError> {
    if timeout.is_zero() || timeout > MAX_DEADLINE {
        return Err(ApiError::bad_request(
            "invalid_timeout",
            format!(
                "timeout_secs must be between 1 and {}",
                MAX_DEADLINE.as_secs()
            ),
        ));
    }
    now.checked_add(timeout).ok_or_else(|| {
        ApiError::bad_request("invalid_timeout", "timeout_secs is too large")
    })
}

/// Report that the reconciliation service is available.
///
/// GET /v1/reconciliation/status
async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ready".to_string(),
        message: "Reconciliation service is ready".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
