//! Student storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eduq_model::Student;
use eduq_reconcile::{StoreError, StudentDirectory};
use sqlx::{postgres::PgPool, postgres::PgRow, Row};

use super::DbError;

struct StudentRow(Student);

impl<'r> sqlx::FromRow<'r, PgRow> for StudentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Student {
            student_id: row.try_get("student_id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            department: row.try_get("department")?,
            keystone_user_id: row.try_get("keystone_user_id")?,
            keystone_project_id: row.try_get("keystone_project_id")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        }))
    }
}

/// Input for registering a student.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub student_id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub keystone_user_id: Option<String>,
    pub keystone_project_id: Option<String>,
}

/// Store for student records.
#[derive(Clone)]
pub struct StudentStore {
    pool: PgPool,
}

impl StudentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new student. Fails with `AlreadyExists` on a duplicate id.
    pub async fn create(&self, student: NewStudent) -> Result<Student, DbError> {
        let row = sqlx::query_as::<_, StudentRow>(
            r#"
            INSERT INTO students (
                student_id,
                name,
                email,
                department,
                keystone_user_id,
                keystone_project_id
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING
                student_id, name, email, department,
                keystone_user_id, keystone_project_id, created_at
            "#,
        )
        .bind(&student.student_id)
        .bind(&student.name)
        .bind(&student.email)
        .bind(&student.department)
        .bind(&student.keystone_user_id)
        .bind(&student.keystone_project_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from_insert(e, "student", &student.student_id))?;

        Ok(row.0)
    }

    pub async fn get(&self, student_id: &str) -> Result<Option<Student>, DbError> {
        let row = sqlx::query_as::<_, StudentRow>(
            r#"
            SELECT
                student_id, name, email, department,
                keystone_user_id, keystone_project_id, created_at
            FROM students
            WHERE student_id = $1
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(|r| r.0))
    }

    /// List students ordered by id, optionally restricted to one department.
    pub async fn list(&self, department: Option<&str>) -> Result<Vec<Student>, DbError> {
        let rows = sqlx::query_as::<_, StudentRow>(
            r#"
            SELECT
                student_id, name, email, department,
                keystone_user_id, keystone_project_id, created_at
            FROM students
            WHERE ($1::TEXT IS NULL OR department = $1)
            ORDER BY student_id
            "#,
        )
        .bind(department)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

#[async_trait]
impl StudentDirectory for StudentStore {
    async fn get_student(&self, student_id: &str) -> Result<Option<Student>, StoreError> {
        Ok(self.get(student_id).await?)
    }

    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        Ok(self.list(None).await?)
    }
}
