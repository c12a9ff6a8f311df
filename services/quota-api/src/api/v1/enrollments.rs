//! Enrollment API endpoints.
//!
//! Creating or deleting an enrollment queues a reconciliation of the
//! student's quota; the response does not wait for it.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use eduq_model::{Enrollment, EnrollmentStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{error::ApiError, request_id};
use crate::state::AppState;

/// Create enrollment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(enroll))
        .route("/", get(list_enrollments))
        .route("/{course_id}", delete(unenroll))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to enroll a student in a course.
#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub course_id: String,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    EnrollmentStatus::Active.as_str().to_string()
}

/// Response for listing enrollments.
#[derive(Debug, Serialize)]
pub struct ListEnrollmentsResponse {
    pub items: Vec<Enrollment>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct UnenrollResponse {
    pub student_id: String,
    pub course_id: String,
    pub message: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Enroll a student, copying the course's validity window.
///
/// POST /v1/students/{student_id}/enrollments
async fn enroll(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    Json(req): Json<EnrollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = request_id();
    let fail = |e: ApiError| e.with_request_id(request_id.clone());

    let status: EnrollmentStatus = req
        .status
        .parse()
        .map_err(|e: eduq_model::ParseStatusError| {
            fail(ApiError::bad_request("invalid_status", e.to_string()))
        })?;

    let db = state.db();
    if db
        .students()
        .get(&student_id)
        .await
        .map_err(|e| fail(e.into()))?
        .is_none()
    {
        return Err(fail(ApiError::not_found(
            "student_not_found",
            format!("student {student_id} not found"),
        )));
    }

    let course = db
        .courses()
        .get(&req.course_id)
        .await
        .map_err(|e| fail(e.into()))?
        .ok_or_else(|| {
            fail(ApiError::not_found(
                "course_not_found",
                format!("course {} not found", req.course_id),
            ))
        })?;

    let enrollment = Enrollment {
        student_id: student_id.clone(),
        course_id: course.course_id.clone(),
        status,
        start_at: course.start_at,
        end_at: course.end_at,
    };
    db.enrollments()
        .upsert(&enrollment)
        .await
        .map_err(|e| fail(e.into()))?;

    info!(
        request_id = %request_id,
        student_id = %student_id,
        course_id = %course.course_id,
        status = %status,
        "Enrollment saved"
    );
    state.trigger().trigger(&student_id, Some(&course.course_id));

    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// Remove an enrollment.
///
/// DELETE /v1/students/{student_id}/enrollments/{course_id}
async fn unenroll(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(String, String)>,
) -> Result<Json<UnenrollResponse>, ApiError> {
    let request_id = request_id();

    let deleted = state
        .db()
        .enrollments()
        .delete(&student_id, &course_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    if !deleted {
        return Err(ApiError::not_found(
            "enrollment_not_found",
            format!("student {student_id} is not enrolled in {course_id}"),
        )
        .with_request_id(request_id));
    }

    info!(request_id = %request_id, student_id = %student_id, course_id = %course_id, "Enrollment removed");
    state.trigger().trigger(&student_id, Some(&course_id));

    Ok(Json(UnenrollResponse {
        message: "Student unenrolled successfully".to_string(),
        student_id,
        course_id,
    }))
}

/// List a student's enrollments.
///
/// GET /v1/students/{student_id}/enrollments
async fn list_enrollments(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<ListEnrollmentsResponse>, ApiError> {
    let items = state
        .db()
        .enrollments()
        .list_for_student(&student_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id()))?;

    Ok(Json(ListEnrollmentsResponse {
        total: items.len(),
        items,
    }))
}
