//! Per-student reconciliation outcome.

use std::fmt;

use eduq_model::{Course, QuotaProfile};
use serde::{Deserialize, Serialize};

use crate::aggregator::SkippedCourse;

/// Terminal state of one reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileStatus {
    /// Nothing was applied yet: no remote project or no backends. Not an error.
    Pending,

    /// All three backends hold the effective entitlement.
    Success,

    /// The attempt stopped at a failing step.
    Failed,
}

impl ReconcileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ReconcileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened when one student was reconciled.
///
/// Built fresh for every attempt and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentQuotaSummary {
    pub student_id: String,
    pub student_name: String,
    pub baseline_quota: QuotaProfile,
    pub active_courses: Vec<Course>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_courses: Vec<SkippedCourse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_quota: Option<QuotaProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_quota: Option<QuotaProfile>,
    pub status: ReconcileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StudentQuotaSummary {
    pub(crate) fn new(student_id: &str, student_name: &str, baseline: QuotaProfile) -> Self {
        Self {
            student_id: student_id.to_string(),
            student_name: student_name.to_string(),
            baseline_quota: baseline,
            active_courses: Vec::new(),
            skipped_courses: Vec::new(),
            effective_quota: None,
            applied_quota: None,
            status: ReconcileStatus::Pending,
            message: None,
        }
    }

    pub(crate) fn fail(mut self, message: impl Into<String>) -> Self {
        self.status = ReconcileStatus::Failed;
        self.applied_quota = None;
        self.message = Some(message.into());
        self
    }

    pub(crate) fn pending(mut self, message: impl Into<String>) -> Self {
        self.status = ReconcileStatus::Pending;
        self.message = Some(message.into());
        self
    }

    pub(crate) fn succeed(mut self, applied: QuotaProfile) -> Self {
        self.status = ReconcileStatus::Success;
        self.applied_quota = Some(applied);
        self.message = None;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ReconcileStatus::Success
    }
}
