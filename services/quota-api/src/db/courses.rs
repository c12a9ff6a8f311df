//! Course storage.
//!
//! The quota profile and provisioning defaults are stored as JSONB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eduq_model::{Course, CourseDefaults, QuotaProfile};
use eduq_reconcile::{CourseCatalog, StoreError};
use sqlx::types::Json;
use sqlx::{postgres::PgPool, postgres::PgRow, Row};

use super::DbError;

struct CourseRow(Course);

impl<'r> sqlx::FromRow<'r, PgRow> for CourseRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let Json(quota_profile) = row.try_get::<Json<QuotaProfile>, _>("quota_profile")?;
        let defaults = row
            .try_get::<Option<Json<CourseDefaults>>, _>("defaults")?
            .map(|Json(d)| d);

        Ok(Self(Course {
            course_id: row.try_get("course_id")?,
            title: row.try_get("title")?,
            department: row.try_get("department")?,
            semester: row.try_get("semester")?,
            start_at: row.try_get::<DateTime<Utc>, _>("start_at")?,
            end_at: row.try_get::<DateTime<Utc>, _>("end_at")?,
            quota_profile,
            defaults,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        }))
    }
}

/// Input for creating a course.
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub course_id: String,
    pub title: String,
    pub department: String,
    pub semester: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub quota_profile: QuotaProfile,
    pub defaults: Option<CourseDefaults>,
}

/// Partial course update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct CourseUpdate {
    pub title: Option<String>,
    pub department: Option<String>,
    pub semester: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub quota_profile: Option<QuotaProfile>,
    pub defaults: Option<CourseDefaults>,
}

impl CourseUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.department.is_none()
            && self.semester.is_none()
            && self.start_at.is_none()
            && self.end_at.is_none()
            && self.quota_profile.is_none()
            && self.defaults.is_none()
    }
}

/// Optional filters for listing courses.
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub department: Option<String>,
    pub semester: Option<String>,
}

/// Store for course records.
#[derive(Clone)]
pub struct CourseStore {
    pool: PgPool,
}

impl CourseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new course. Fails with `AlreadyExists` on a duplicate id.
    pub async fn create(&self, course: NewCourse) -> Result<Course, DbError> {
        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            INSERT INTO courses (
                course_id,
                title,
                department,
                semester,
                start_at,
                end_at,
                quota_profile,
                defaults
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING
                course_id, title, department, semester, start_at, end_at,
                quota_profile, defaults, created_at
            "#,
        )
        .bind(&course.course_id)
        .bind(&course.title)
        .bind(&course.department)
        .bind(&course.semester)
        .bind(course.start_at)
        .bind(course.end_at)
        .bind(Json(course.quota_profile))
        .bind(course.defaults.map(Json))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from_insert(e, "course", &course.course_id))?;

        Ok(row.0)
    }

    pub async fn get(&self, course_id: &str) -> Result<Option<Course>, DbError> {
        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            SELECT
                course_id, title, department, semester, start_at, end_at,
                quota_profile, defaults, created_at
            FROM courses
            WHERE course_id = $1
            "#,
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(|r| r.0))
    }

    /// List courses, newest start first.
    pub async fn list(&self, filter: &CourseFilter) -> Result<Vec<Course>, DbError> {
        let rows = sqlx::query_as::<_, CourseRow>(
            r#"
            SELECT
                course_id, title, department, semester, start_at, end_at,
                quota_profile, defaults, created_at
            FROM courses
            WHERE ($1::TEXT IS NULL OR department = $1)
              AND ($2::TEXT IS NULL OR semester = $2)
            ORDER BY start_at DESC, course_id
            "#,
        )
        .bind(filter.department.as_deref())
        .bind(filter.semester.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

impl CourseStore {
    /// Apply a partial update. Returns `None` if the course does not exist.
    ///
    /// Enrollments carry a copy of the course window, so a changed window is
    /// written through to them in the same transaction.
    pub async fn update(
        &self,
        course_id: &str,
        update: &CourseUpdate,
    ) -> Result<Option<Course>, DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            UPDATE courses SET
                title = COALESCE($2, title),
                department = COALESCE($3, department),
                semester = COALESCE($4, semester),
                start_at = COALESCE($5, start_at),
                end_at = COALESCE($6, end_at),
                quota_profile = COALESCE($7, quota_profile),
                defaults = COALESCE($8, defaults)
            WHERE course_id = $1
            RETURNING
                course_id, title, department, semester, start_at, end_at,
                quota_profile, defaults, created_at
            "#,
        )
        .bind(course_id)
        .bind(update.title.as_deref())
        .bind(update.department.as_deref())
        .bind(update.semester.as_deref())
        .bind(update.start_at)
        .bind(update.end_at)
        .bind(update.quota_profile.map(Json))
        .bind(update.defaults.clone().map(Json))
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::Query)?;

        let Some(CourseRow(course)) = row else {
            return Ok(None);
        };

        if update.start_at.is_some() || update.end_at.is_some() {
            sqlx::query("UPDATE enrollments SET start_at = $2, end_at = $3 WHERE course_id = $1")
                .bind(course_id)
                .bind(course.start_at)
                .bind(course.end_at)
                .execute(&mut *tx)
                .await
                .map_err(DbError::Query)?;
        }

        tx.commit().await.map_err(DbError::Query)?;
        Ok(Some(course))
    }

    /// Delete a course and, by cascade, its enrollments. Returns `false` if
    /// there was none.
    pub async fn delete(&self, course_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM courses WHERE course_id = $1")
            .bind(course_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CourseCatalog for CourseStore {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>, StoreError> {
        Ok(self.get(course_id).await?)
    }
}
