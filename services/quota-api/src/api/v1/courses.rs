//! Course API endpoints.
//!
//! Updating or deleting a course queues a reconciliation for every student
//! actively enrolled in it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use eduq_model::{Course, CourseDefaults, QuotaProfile};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{error::ApiError, request_id};
use crate::db::{CourseFilter, CourseUpdate, NewCourse};
use crate::state::AppState;

/// Create course routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_courses).post(create_course))
        .route(
            "/{course_id}",
            get(get_course).put(update_course).delete(delete_course),
        )
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to create a course.
#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub course_id: String,
    pub title: String,
    pub department: String,
    pub semester: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub quota_profile: QuotaProfile,
    #[serde(default)]
    pub defaults: Option<CourseDefaults>,
}

impl CreateCourseRequest {
    fn validate(&self) -> Result<(), ApiError> {
        for (field, value) in [
            ("course_id", &self.course_id),
            ("title", &self.title),
            ("department", &self.department),
            ("semester", &self.semester),
        ] {
            if value.trim().is_empty() {
                return Err(ApiError::bad_request(
                    "invalid_request",
                    format!("{field} is required"),
                ));
            }
        }
        check_window(self.start_at, self.end_at)?;
        check_profile(&self.quota_profile)
    }
}

/// Partial update of a course. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub department: Option<String>,
    pub semester: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub quota_profile: Option<QuotaProfile>,
    pub defaults: Option<CourseDefaults>,
}

impl UpdateCourseRequest {
    fn into_update(self) -> Result<CourseUpdate, ApiError> {
        for (field, value) in [
            ("title", &self.title),
            ("department", &self.department),
            ("semester", &self.semester),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ApiError::bad_request(
                    "invalid_request",
                    format!("{field} must not be blank"),
                ));
            }
        }
        if let Some(profile) = &self.quota_profile {
            check_profile(profile)?;
        }

        let update = CourseUpdate {
            title: self.title,
            department: self.department,
            semester: self.semester,
            start_at: self.start_at,
            end_at: self.end_at,
            quota_profile: self.quota_profile,
            defaults: self.defaults,
        };
        if update.is_empty() {
            return Err(ApiError::bad_request(
                "empty_update",
                "at least one field must be provided",
            ));
        }
        Ok(update)
    }
}

fn check_window(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Result<(), ApiError> {
    if start_at >= end_at {
        return Err(ApiError::bad_request(
            "invalid_date_range",
            "start_at must be before end_at",
        ));
    }
    Ok(())
}

fn check_profile(profile: &QuotaProfile) -> Result<(), ApiError> {
    match profile.out_of_range() {
        Some((field, value)) => Err(ApiError::bad_request(
            "invalid_quota_profile",
            format!(
                "quota_profile.{field} = {value} exceeds the maximum of {}",
                QuotaProfile::MAX_LIMIT
            ),
        )),
        None => Ok(()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListCoursesQuery {
    pub department: Option<String>,
    pub semester: Option<String>,
}

/// Response for listing courses.
#[derive(Debug, Serialize)]
pub struct ListCoursesResponse {
    pub items: Vec<Course>,
    pub total: usize,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a course.
///
/// POST /v1/courses
async fn create_course(
    State(state): State<AppState>,
    Json(req): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = request_id();
    req.validate()
        .map_err(|e| e.with_request_id(request_id.clone()))?;

    let course = state
        .db()
        .courses()
        .create(NewCourse {
            course_id: req.course_id.trim().to_string(),
            title: req.title,
            department: req.department,
            semester: req.semester,
            start_at: req.start_at,
            end_at: req.end_at,
            quota_profile: req.quota_profile,
            defaults: req.defaults,
        })
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    info!(request_id = %request_id, course_id = %course.course_id, "Course created");
    Ok((StatusCode::CREATED, Json(course)))
}

/// List courses.
///
/// GET /v1/courses
async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<ListCoursesQuery>,
) -> Result<Json<ListCoursesResponse>, ApiError> {
    let filter = CourseFilter {
        department: query.department.filter(|d| !d.is_empty()),
        semester: query.semester.filter(|s| !s.is_empty()),
    };
    let items = state
        .db()
        .courses()
        .list(&filter)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id()))?;

    Ok(Json(ListCoursesResponse {
        total: items.len(),
        items,
    }))
}

/// Get a course.
///
/// GET /v1/courses/{course_id}
async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<Course>, ApiError> {
    let request_id = request_id();
    let course = state
        .db()
        .courses()
        .get(&course_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id.clone()))?;

    course.map(Json).ok_or_else(|| {
        ApiError::not_found("course_not_found", format!("course {course_id} not found"))
            .with_request_id(request_id)
    })
}

/// Update a course in place.
///
/// PUT /v1/courses/{course_id}
async fn update_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(req): Json<UpdateCourseRequest>,
) -> Result<Json<Course>, ApiError> {
    let request_id = request_id();
    let fail = |e: ApiError| e.with_request_id(request_id.clone());
    let not_found = || ApiError::not_found("course_not_found", format!("course {course_id} not found"));

    let update = req.into_update().map_err(fail)?;

    let db = state.db();
    let existing = db
        .courses()
        .get(&course_id)
        .await
        .map_err(|e| fail(e.into()))?
        .ok_or_else(|| fail(not_found()))?;
    check_window(
        update.start_at.unwrap_or(existing.start_at),
        update.end_at.unwrap_or(existing.end_at),
    )
    .map_err(fail)?;

    let course = db
        .courses()
        .update(&course_id, &update)
        .await
        .map_err(|e| fail(e.into()))?
        .ok_or_else(|| fail(not_found()))?;

    let students = db
        .enrollments()
        .active_students_for_course(&course_id)
        .await
        .map_err(|e| fail(e.into()))?;
    for student_id in &students {
        state.trigger().trigger(student_id, Some(&course_id));
    }

    info!(
        request_id = %request_id,
        course_id = %course_id,
        affected_students = students.len(),
        "Course updated"
    );
    Ok(Json(course))
}

/// Delete a course and its enrollments.
///
/// DELETE /v1/courses/{course_id}
async fn delete_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let request_id = request_id();
    let fail = |e: ApiError| e.with_request_id(request_id.clone());

    // Enrollments cascade away with the course; collect them first.
    let db = state.db();
    let students = db
        .enrollments()
        .active_students_for_course(&course_id)
        .await
        .map_err(|e| fail(e.into()))?;

    let deleted = db
        .courses()
        .delete(&course_id)
        .await
        .map_err(|e| fail(e.into()))?;
    if !deleted {
        return Err(fail(ApiError::not_found(
            "course_not_found",
            format!("course {course_id} not found"),
        )));
    }

    for student_id in &students {
        state.trigger().trigger(student_id, Some(&course_id));
    }

    info!(
        request_id = %request_id,
        course_id = %course_id,
        affected_students = students.len(),
        "Course deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_partial_profile() {
        let req: CreateCourseRequest = serde_json::from_value(serde_json::json!({
            "course_id": "CS101",
            "title": "Intro",
            "department": "CS",
            "semester": "2025-1",
            "start_at": "2025-03-01T00:00:00Z",
            "end_at": "2025-06-30T00:00:00Z",
            "quota_profile": { "cores": 4, "ramMB": 4096 }
        }))
        .unwrap();

        assert!(req.validate().is_ok());
        assert_eq!(req.quota_profile.cores, 4);
        assert_eq!(req.quota_profile.instances, 0);
        assert!(req.defaults.is_none());
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let req: CreateCourseRequest = serde_json::from_value(serde_json::json!({
            "course_id": "CS101",
            "title": "Intro",
            "department": "CS",
            "semester": "2025-1",
            "start_at": "2025-06-30T00:00:00Z",
            "end_at": "2025-03-01T00:00:00Z",
            "quota_profile": {}
        }))
        .unwrap();

        let err = req.validate().unwrap_err();
        assert_eq!(err.problem.code, "invalid_date_range");
    }

    #[test]
    fn test_oversized_profile_is_rejected() {
        let req: CreateCourseRequest = serde_json::from_value(serde_json::json!({
            "course_id": "CS101",
            "title": "Intro",
            "department": "CS",
            "semester": "2025-1",
            "start_at": "2025-03-01T00:00:00Z",
            "end_at": "2025-06-30T00:00:00Z",
            "quota_profile": { "ramMB": 3_000_000_000u64 }
        }))
        .unwrap();

        let err = req.validate().unwrap_err();
        assert_eq!(err.problem.code, "invalid_quota_profile");
        assert!(err.problem.detail.contains("ramMB"));
    }

    #[test]
    fn test_empty_update_is_rejected() {
        let err = UpdateCourseRequest::default().into_update().unwrap_err();
        assert_eq!(err.problem.code, "empty_update");
    }

    #[test]
    fn test_partial_update_keeps_only_given_fields() {
        let req: UpdateCourseRequest = serde_json::from_value(serde_json::json!({
            "quota_profile": { "cores": 6 },
            "defaults": { "imageId": "ubuntu-24.04" }
        }))
        .unwrap();

        let update = req.into_update().unwrap();
        assert_eq!(update.quota_profile.map(|p| p.cores), Some(6));
        assert!(update.defaults.is_some());
        assert!(update.title.is_none());
        assert!(update.start_at.is_none());
    }

    #[test]
    fn test_update_rejects_blank_title_and_oversized_profile() {
        let blank = UpdateCourseRequest {
            title: Some("  ".to_string()),
            ..UpdateCourseRequest::default()
        };
        assert_eq!(blank.into_update().unwrap_err().problem.code, "invalid_request");

        let oversized = UpdateCourseRequest {
            quota_profile: Some(QuotaProfile {
                cores: QuotaProfile::MAX_LIMIT + 1,
                ..QuotaProfile::ZERO
            }),
            ..UpdateCourseRequest::default()
        };
        assert_eq!(
            oversized.into_update().unwrap_err().problem.code,
            "invalid_quota_profile"
        );
    }
}
