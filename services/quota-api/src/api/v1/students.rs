//! Student API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use eduq_model::Student;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{error::ApiError, request_id};
use crate::db::NewStudent;
use crate::state::AppState;

/// Create student routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_student))
        .route("/", get(list_students))
        .route("/{student_id}", get(get_student))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to register a student.
#[derive(Debug, Deserialize)]
pub struct CreateStudentRequest {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    #[serde(default)]
    pub keystone_user_id: Option<String>,
    #[serde(default)]
    pub keystone_project_id: Option<String>,
}

impl CreateStudentRequest {
    fn validate(&self) -> Result<(), ApiError> {
        for (field, value) in [
            ("student_id", &self.student_id),
            ("name", &self.name),
            ("email", &self.email),
            ("department", &self.department),
        ] {
            if value.trim().is_empty() {
                return Err(ApiError::bad_request(
                    "invalid_request",
                    format!("{field} is required"),
                ));
            }
        }
        if !self.email.contains('@') {
            return Err(ApiError::bad_request("invalid_email", "email is not valid"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ListStudentsQuery {
    pub department: Option<String>,
}

/// Response for listing students.
#[derive(Debug, Serialize)]
pub struct ListStudentsResponse {
    pub items: Vec<Student>,
    pub total: usize,
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a student.
///
/// POST /v1/students
async fn create_student(
    State(state): State<AppState>,
    Json(req): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = request_id();
    req.validate()
        .map_err(|e| e.with_request_id(request_id.clone()))?;

    let student = state
        .db()
        .students()
        .create(NewStudent {
            student_id: req.student_id.trim().to_string(),
            name: req.name,
            email: req.email,
            department: req.department,
            keystone_user_id: req.keystone_user_id,
            keystone_project_id: req.keystone_project_id,
        })
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    info!(request_id = %request_id, student_id = %student.student_id, "Student created");
    Ok((StatusCode::CREATED, Json(student)))
}

/// List students.
///
/// GET /v1/students
async fn list_students(
    State(state): State<AppState>,
    Query(query): Query<ListStudentsQuery>,
) -> Result<Json<ListStudentsResponse>, ApiError> {
    let department = query.department.as_deref().filter(|d| !d.is_empty());
    let items = state
        .db()
        .students()
        .list(department)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id()))?;

    Ok(Json(ListStudentsResponse {
        total: items.len(),
        items,
    }))
}

/// Get a student.
///
/// GET /v1/students/{student_id}
async fn get_student(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<Student>, ApiError> {
    let request_id = request_id();
    let student = state
        .db()
        .students()
        .get(&student_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    match student {
        Some(student) => Ok(Json(student)),
        None => Err(ApiError::not_found(
            "student_not_found",
            format!("student {student_id} not found"),
        )
        .with_request_id(request_id)),
    }
}
