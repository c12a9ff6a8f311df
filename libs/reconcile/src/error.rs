//! Reconciliation error types.

use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendKind;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reading from a record collaborator (students, enrollments, courses).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying query failed.
    #[error("record query failed: {0}")]
    Query(#[source] BoxError),

    /// The store cannot serve requests right now.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn query(err: impl Into<BoxError>) -> Self {
        Self::Query(err.into())
    }
}

/// Failure talking to one remote quota subsystem.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network or client-side failure before a response arrived.
    #[error("{backend} request failed: {source}")]
    Transport {
        backend: BackendKind,
        #[source]
        source: BoxError,
    },

    /// The remote system answered with a non-success status.
    #[error("{backend} returned status {status}: {body}")]
    Status {
        backend: BackendKind,
        status: u16,
        body: String,
    },

    /// The response could not be understood.
    #[error("{backend} returned an unexpected response: {message}")]
    Decode {
        backend: BackendKind,
        message: String,
    },

    /// Credentials were rejected or no endpoint could be resolved.
    #[error("{backend} authentication failed: {message}")]
    Auth {
        backend: BackendKind,
        message: String,
    },

    /// The backend is known to be down.
    #[error("{backend} unavailable: {message}")]
    Unavailable {
        backend: BackendKind,
        message: String,
    },
}

impl BackendError {
    /// Which backend produced this error.
    pub fn backend(&self) -> BackendKind {
        match self {
            Self::Transport { backend, .. }
            | Self::Status { backend, .. }
            | Self::Decode { backend, .. }
            | Self::Auth { backend, .. }
            | Self::Unavailable { backend, .. } => *backend,
        }
    }

    /// Re-attribute an error to another backend (e.g. shared auth failures).
    pub fn for_backend(self, kind: BackendKind) -> Self {
        match self {
            Self::Transport { source, .. } => Self::Transport {
                backend: kind,
                source,
            },
            Self::Status { status, body, .. } => Self::Status {
                backend: kind,
                status,
                body,
            },
            Self::Decode { message, .. } => Self::Decode {
                backend: kind,
                message,
            },
            Self::Auth { message, .. } => Self::Auth {
                backend: kind,
                message,
            },
            Self::Unavailable { message, .. } => Self::Unavailable {
                backend: kind,
                message,
            },
        }
    }
}

/// Errors that abort a whole bulk run.
///
/// Per-student failures never surface here; they are recorded in the
/// student's summary instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The student population could not be enumerated.
    #[error("failed to list students: {0}")]
    ListStudents(#[source] StoreError),

    /// The run did not finish before its deadline.
    #[error("timeout after {elapsed:?} with {completed} of {total} students reconciled")]
    Timeout {
        elapsed: Duration,
        completed: usize,
        total: usize,
    },
}
