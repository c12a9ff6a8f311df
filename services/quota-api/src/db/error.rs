//! Database error types.

use eduq_reconcile::StoreError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}. Run from repo root or services/quota-api.")]
    MigrationDirNotFound { tried: String, last_error: String },

    /// A row with the same key already exists.
    #[error("{entity} '{id}' already exists")]
    AlreadyExists { entity: &'static str, id: String },
}

impl DbError {
    /// Classify a failed insert: unique violations become `AlreadyExists`.
    pub(crate) fn from_insert(err: sqlx::Error, entity: &'static str, id: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::AlreadyExists {
                entity,
                id: id.to_string(),
            },
            _ => Self::Query(err),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::query(err)
    }
}
