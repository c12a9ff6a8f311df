//! API v1 routes.

mod courses;
mod enrollments;
mod quota;
mod reconciliation;
mod students;

use axum::Router;

use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/reconciliation", reconciliation::routes())
        .nest("/students", students::routes())
        // Enrollments are nested under students: /v1/students/{student_id}/enrollments
        .nest("/students/{student_id}/enrollments", enrollments::routes())
        .nest("/courses", courses::routes())
        .nest("/quota", quota::routes())
}
