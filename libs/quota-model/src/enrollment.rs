//! Enrollment records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Dropped => "dropped",
        }
    }

    /// Only active enrollments contribute to a student's entitlement.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown enrollment status string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid enrollment status '{0}' (expected active, completed or dropped)")]
pub struct ParseStatusError(pub String);

impl FromStr for EnrollmentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "dropped" => Ok(Self::Dropped),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A student's enrollment in a course.
///
/// The window is copied from the course when the enrollment is written.
/// Reconciliation trusts `status` and does not re-check the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: String,
    pub course_id: String,
    pub status: EnrollmentStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}
