//! Record collaborators consumed by reconciliation.
//!
//! Students, courses and enrollments are owned elsewhere; reconciliation only
//! reads them through these traits.

use std::sync::Arc;

use async_trait::async_trait;
use eduq_model::{Course, Enrollment, Student};

use crate::error::StoreError;

/// Student lookups.
#[async_trait]
pub trait StudentDirectory: Send + Sync {
    /// Fetch one student. `Ok(None)` when the id is unknown.
    async fn get_student(&self, student_id: &str) -> Result<Option<Student>, StoreError>;

    /// Every known student, in a stable order.
    async fn list_students(&self) -> Result<Vec<Student>, StoreError>;
}

/// Enrollment lookups.
#[async_trait]
pub trait EnrollmentSource: Send + Sync {
    /// All enrollments of a student, whatever their status.
    async fn list_enrollments(&self, student_id: &str) -> Result<Vec<Enrollment>, StoreError>;
}

/// Course lookups.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Fetch one course. `Ok(None)` when the id is unknown.
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>, StoreError>;
}

/// The three record collaborators reconciliation reads from.
#[derive(Clone)]
pub struct Records {
    pub students: Arc<dyn StudentDirectory>,
    pub enrollments: Arc<dyn EnrollmentSource>,
    pub courses: Arc<dyn CourseCatalog>,
}

impl Records {
    /// Use one store for all three collaborators.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: StudentDirectory + EnrollmentSource + CourseCatalog + 'static,
    {
        Self {
            students: store.clone(),
            enrollments: store.clone(),
            courses: store,
        }
    }
}
