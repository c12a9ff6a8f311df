//! In-memory record collaborators for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use eduq_model::{Course, Enrollment, Student};

use crate::error::StoreError;
use crate::sources::{CourseCatalog, EnrollmentSource, StudentDirectory};

/// Students, courses and enrollments held in memory.
///
/// Students are returned in insertion order. Individual lookups can be
/// configured to fail or to respond slowly.
#[derive(Default)]
pub struct InMemoryRecords {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

#[derive(Default)]
struct Inner {
    students: Vec<Student>,
    courses: HashMap<String, Course>,
    enrollments: Vec<Enrollment>,
    failing_courses: HashSet<String>,
    failing_enrollments: HashSet<String>,
    fail_listing: bool,
}

impl InMemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every lookup by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn add_student(&self, student: Student) {
        self.lock().students.push(student);
    }

    pub fn add_course(&self, course: Course) {
        self.lock()
            .courses
            .insert(course.course_id.clone(), course);
    }

    pub fn add_enrollment(&self, enrollment: Enrollment) {
        self.lock().enrollments.push(enrollment);
    }

    /// Make lookups of `course_id` fail.
    pub fn fail_course(&self, course_id: &str) {
        self.lock().failing_courses.insert(course_id.to_string());
    }

    /// Make enrollment listing for `student_id` fail.
    pub fn fail_enrollments(&self, student_id: &str) {
        self.lock()
            .failing_enrollments
            .insert(student_id.to_string());
    }

    /// Make listing all students fail.
    pub fn fail_listing(&self) {
        self.lock().fail_listing = true;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl StudentDirectory for InMemoryRecords {
    async fn get_student(&self, student_id: &str) -> Result<Option<Student>, StoreError> {
        self.delay().await;
        Ok(self
            .lock()
            .students
            .iter()
            .find(|s| s.student_id == student_id)
            .cloned())
    }

    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        self.delay().await;
        let inner = self.lock();
        if inner.fail_listing {
            return Err(StoreError::Unavailable("student listing disabled".to_string()));
        }
        Ok(inner.students.clone())
    }
}

#[async_trait]
impl EnrollmentSource for InMemoryRecords {
    async fn list_enrollments(&self, student_id: &str) -> Result<Vec<Enrollment>, StoreError> {
        self.delay().await;
        let inner = self.lock();
        if inner.failing_enrollments.contains(student_id) {
            return Err(StoreError::Unavailable(format!(
                "enrollments for {student_id} unavailable"
            )));
        }
        Ok(inner
            .enrollments
            .iter()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CourseCatalog for InMemoryRecords {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>, StoreError> {
        self.delay().await;
        let inner = self.lock();
        if inner.failing_courses.contains(course_id) {
            return Err(StoreError::Unavailable(format!(
                "course {course_id} unavailable"
            )));
        }
        Ok(inner.courses.get(course_id).cloned())
    }
}
