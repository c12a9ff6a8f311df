//! Direct quota API endpoints.
//!
//! Read and write a project's limits without going through enrollment
//! aggregation. All three require configured quota backends.

use std::time::Duration;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use eduq_model::QuotaProfile;
use eduq_reconcile::{
    ApplyCause, ApplyFailure, BackendKind, QuotaBackends, QuotaDiff, QuotaSnapshot, QuotaUpdate,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::api::{error::ApiError, request_id};
use crate::state::AppState;

/// Deadline for one direct apply request.
const APPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Create quota routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/current", get(current_quota))
        .route("/apply", post(apply_quota))
        .route("/apply-profile", post(apply_profile))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentQuery {
    pub project_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentQuotaResponse {
    pub project_id: String,
    #[serde(flatten)]
    pub current: QuotaSnapshot,
}

/// Partial limits for any subset of the three backends.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyQuotaRequest {
    pub project_id: String,
    #[serde(flatten)]
    pub update: QuotaUpdate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyQuotaResponse {
    pub project_id: String,
    pub applied: Vec<BackendKind>,
    /// State re-read after applying; absent if the re-read failed.
    pub current: Option<QuotaSnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyProfileRequest {
    pub project_id: String,
    pub profile: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub include_diff: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyProfileResponse {
    pub project_id: String,
    pub profile: String,
    pub plan: QuotaProfile,
    pub applied: bool,
    pub dry_run: bool,
    pub current: Option<QuotaSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<QuotaDiff>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Current limits and usage of a project.
///
/// GET /v1/quota/current?projectId=
async fn current_quota(
    State(state): State<AppState>,
    Query(query): Query<CurrentQuery>,
) -> Result<Json<CurrentQuotaResponse>, ApiError> {
    let request_id = request_id();
    let project_id = require_project(query.project_id.as_deref())
        .map_err(|e| e.with_request_id(request_id.clone()))?;
    let backends = require_backends(&state).map_err(|e| e.with_request_id(request_id.clone()))?;

    let current = read_current(backends, &project_id)
        .await
        .map_err(|e| e.with_request_id(request_id))?;

    Ok(Json(CurrentQuotaResponse {
        project_id,
        current,
    }))
}

/// Apply partial limits in compute, block-storage, network order.
///
/// POST /v1/quota/apply
async fn apply_quota(
    State(state): State<AppState>,
    Json(req): Json<ApplyQuotaRequest>,
) -> Result<Json<ApplyQuotaResponse>, ApiError> {
    let request_id = request_id();
    let project_id = require_project(Some(&req.project_id))
        .map_err(|e| e.with_request_id(request_id.clone()))?;
    let backends = require_backends(&state).map_err(|e| e.with_request_id(request_id.clone()))?;

    let update = req.update;
    if update.compute.is_empty() && update.block_storage.is_empty() && update.network.is_empty()
    {
        return Err(
            ApiError::bad_request("empty_update", "no quota fields supplied")
                .with_request_id(request_id),
        );
    }

    let applied = backends
        .apply(&project_id, &update, Instant::now() + APPLY_TIMEOUT)
        .await
        .map_err(|failure| apply_error(failure).with_request_id(request_id.clone()))?;

    info!(request_id = %request_id, project_id = %project_id, applied = ?applied, "Quota applied");

    let current = reread(backends, &project_id).await;
    Ok(Json(ApplyQuotaResponse {
        project_id,
        applied,
        current,
    }))
}

/// Apply a named catalog profile, optionally as a dry run with a diff.
///
/// POST /v1/quota/apply-profile
async fn apply_profile(
    State(state): State<AppState>,
    Json(req): Json<ApplyProfileRequest>,
) -> Result<Json<ApplyProfileResponse>, ApiError> {
    let request_id = request_id();
    let fail = |e: ApiError| e.with_request_id(request_id.clone());

    let project_id = require_project(Some(&req.project_id)).map_err(fail)?;
    let profile_name = req.profile.trim().to_lowercase();
    let plan = state.catalog().get(&profile_name).ok_or_else(|| {
        let known: Vec<&str> = state.catalog().names().collect();
        fail(ApiError::bad_request(
            "unknown_profile",
            format!("unknown profile '{}' (use one of: {})", req.profile, known.join(", ")),
        ))
    })?;
    let backends = require_backends(&state).map_err(fail)?;

    let before = read_current(backends, &project_id).await.map_err(fail)?;
    let diff = req.include_diff.then(|| before.diff(&plan));

    let mut response = ApplyProfileResponse {
        project_id,
        profile: profile_name,
        plan,
        applied: false,
        dry_run: req.dry_run,
        current: Some(before),
        diff,
    };

    if !req.dry_run {
        backends
            .apply(
                &response.project_id,
                &QuotaUpdate::from(plan),
                Instant::now() + APPLY_TIMEOUT,
            )
            .await
            .map_err(|failure| fail(apply_error(failure)))?;

        info!(
            request_id = %request_id,
            project_id = %response.project_id,
            profile = %response.profile,
            "Profile applied"
        );
        response.applied = true;
        response.current = reread(backends, &response.project_id).await;
    }

    Ok(Json(response))
}

// =============================================================================
// Helpers
// =============================================================================

fn require_project(project_id: Option<&str>) -> Result<String, ApiError> {
    match project_id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(ApiError::bad_request(
            "missing_project_id",
            "projectId is required",
        )),
    }
}

fn require_backends(state: &AppState) -> Result<&QuotaBackends, ApiError> {
    state.backends().ok_or_else(|| {
        ApiError::service_unavailable("backends_unavailable", "no quota backends configured")
    })
}

async fn read_current(backends: &QuotaBackends, project_id: &str) -> Result<QuotaSnapshot, ApiError> {
    backends.snapshot(project_id).await.map_err(|e| {
        let errors: Vec<String> = e.errors.iter().map(ToString::to_string).collect();
        ApiError::bad_gateway("quota_read_failed", e.to_string())
            .with_details(json!({ "errors": errors }))
    })
}

async fn reread(backends: &QuotaBackends, project_id: &str) -> Option<QuotaSnapshot> {
    match backends.snapshot(project_id).await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(project_id, error = %e, "Failed to re-read quota after apply");
            None
        }
    }
}

fn apply_error(failure: ApplyFailure) -> ApiError {
    let details = json!({
        "backend": failure.backend,
        "applied": failure.applied,
    });
    let err = match failure.cause {
        ApplyCause::DeadlineExceeded => {
            ApiError::gateway_timeout("quota_apply_timeout", failure.to_string())
        }
        ApplyCause::Backend(_) => ApiError::bad_gateway("quota_apply_failed", failure.to_string()),
    };
    err.with_details(details)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_request_accepts_partial_parts() {
        let req: ApplyQuotaRequest = serde_json::from_value(json!({
            "projectId": "p-1",
            "compute": { "cores": 12 },
            "network": { "floatingIPs": 2 }
        }))
        .unwrap();

        assert_eq!(req.project_id, "p-1");
        assert_eq!(req.update.compute.cores, Some(12));
        assert_eq!(req.update.compute.instances, None);
        assert!(req.update.block_storage.is_empty());
        assert_eq!(req.update.network.floating_ips, Some(2));
    }

    #[test]
    fn test_blank_project_is_rejected() {
        assert!(require_project(Some("  ")).is_err());
        assert!(require_project(None).is_err());
        assert_eq!(require_project(Some(" p-1 ")).unwrap(), "p-1");
    }
}
