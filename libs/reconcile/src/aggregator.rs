//! Enrollment aggregation.
//!
//! Turns a student's enrollments into the list of courses that currently
//! contribute to their entitlement. A course that cannot be looked up is
//! skipped and reported; only failing to list the enrollments themselves (or
//! running out of time) fails the aggregation.

use eduq_model::Course;
use serde::Serialize;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::sources::{CourseCatalog, EnrollmentSource};

/// Outcome of looking up the course behind one active enrollment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseLookup {
    Found(Course),
    Skipped(SkippedCourse),
}

/// An active enrollment whose course could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedCourse {
    pub course_id: String,
    pub reason: String,
}

/// Courses that count toward the entitlement, plus the ones skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub active_courses: Vec<Course>,
    pub skipped: Vec<SkippedCourse>,
}

impl Aggregation {
    fn push(&mut self, lookup: CourseLookup) {
        match lookup {
            CourseLookup::Found(course) => self.active_courses.push(course),
            CourseLookup::Skipped(skipped) => self.skipped.push(skipped),
        }
    }
}

/// Aggregation could not produce a result at all.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("failed to get enrollments: {0}")]
    Enrollments(#[source] StoreError),

    #[error("deadline exceeded while {0}")]
    DeadlineExceeded(&'static str),
}

/// Collect the courses of every active enrollment of `student_id`.
pub async fn aggregate_active_courses(
    enrollments: &dyn EnrollmentSource,
    courses: &dyn CourseCatalog,
    student_id: &str,
    deadline: Instant,
) -> Result<Aggregation, AggregationError> {
    let all = timeout_at(deadline, enrollments.list_enrollments(student_id))
        .await
        .map_err(|_| AggregationError::DeadlineExceeded("listing enrollments"))?
        .map_err(AggregationError::Enrollments)?;

    let mut aggregation = Aggregation::default();

    for enrollment in all.iter().filter(|e| e.status.is_active()) {
        let lookup = timeout_at(deadline, courses.get_course(&enrollment.course_id))
            .await
            .map_err(|_| AggregationError::DeadlineExceeded("looking up courses"))?;

        let lookup = match lookup {
            Ok(Some(course)) => CourseLookup::Found(course),
            Ok(None) => CourseLookup::Skipped(SkippedCourse {
                course_id: enrollment.course_id.clone(),
                reason: "course not found".to_string(),
            }),
            Err(e) => CourseLookup::Skipped(SkippedCourse {
                course_id: enrollment.course_id.clone(),
                reason: e.to_string(),
            }),
        };

        if let CourseLookup::Skipped(skipped) = &lookup {
            warn!(
                student_id,
                course_id = %skipped.course_id,
                reason = %skipped.reason,
                "Skipping course during aggregation"
            );
        }
        aggregation.push(lookup);
    }

    debug!(
        student_id,
        enrollments = all.len(),
        active_courses = aggregation.active_courses.len(),
        skipped = aggregation.skipped.len(),
        "Aggregated enrollments"
    );

    Ok(aggregation)
}
