//! Enrollment storage.
//!
//! (student_id, course_id) is unique; enrolling again updates status and
//! validity window in place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eduq_model::{Enrollment, EnrollmentStatus};
use eduq_reconcile::{EnrollmentSource, StoreError};
use sqlx::{postgres::PgPool, postgres::PgRow, Row};

use super::DbError;

struct EnrollmentRow(Enrollment);

impl<'r> sqlx::FromRow<'r, PgRow> for EnrollmentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<EnrollmentStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Self(Enrollment {
            student_id: row.try_get("student_id")?,
            course_id: row.try_get("course_id")?,
            status,
            start_at: row.try_get::<DateTime<Utc>, _>("start_at")?,
            end_at: row.try_get::<DateTime<Utc>, _>("end_at")?,
        }))
    }
}

/// Store for enrollment records.
#[derive(Clone)]
pub struct EnrollmentStore {
    pool: PgPool,
}

impl EnrollmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or update an enrollment.
    pub async fn upsert(&self, enrollment: &Enrollment) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO enrollments (student_id, course_id, status, start_at, end_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, course_id) DO UPDATE SET
                status = EXCLUDED.status,
                start_at = EXCLUDED.start_at,
                end_at = EXCLUDED.end_at
            "#,
        )
        .bind(&enrollment.student_id)
        .bind(&enrollment.course_id)
        .bind(enrollment.status.as_str())
        .bind(enrollment.start_at)
        .bind(enrollment.end_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(())
    }

    /// Delete an enrollment. Returns `false` if there was none.
    pub async fn delete(&self, student_id: &str, course_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM enrollments WHERE student_id = $1 AND course_id = $2")
            .bind(student_id)
            .bind(course_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(result.rows_affected() > 0)
    }

    /// All enrollments of a student, newest first.
    pub async fn list_for_student(&self, student_id: &str) -> Result<Vec<Enrollment>, DbError> {
        let rows = sqlx::query_as::<_, EnrollmentRow>(
            r#"
            SELECT student_id, course_id, status, start_at, end_at
            FROM enrollments
            WHERE student_id = $1
            ORDER BY start_at DESC, course_id
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Students holding an active enrollment in `course_id`.
    pub async fn active_students_for_course(&self, course_id: &str) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT student_id
            FROM enrollments
            WHERE course_id = $1 AND status = $2
            ORDER BY student_id
            "#,
        )
        .bind(course_id)
        .bind(EnrollmentStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("student_id"))
            .collect::<Result<_, _>>()
            .map_err(DbError::Query)
    }
}

#[async_trait]
impl EnrollmentSource for EnrollmentStore {
    async fn list_enrollments(&self, student_id: &str) -> Result<Vec<Enrollment>, StoreError> {
        Ok(self.list_for_student(student_id).await?)
    }
}
