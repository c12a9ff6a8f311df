//! Bulk reconciliation across every known student.

use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument, warn};

use crate::error::ReconcileError;
use crate::orchestrator::Reconciler;
use crate::summary::{ReconcileStatus, StudentQuotaSummary};

/// Aggregate outcome of one bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReconciliationResult {
    pub total_students: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub pending_count: usize,
    pub student_results: Vec<StudentQuotaSummary>,
    pub summary: String,
}

impl BulkReconciliationResult {
    fn from_results(student_results: Vec<StudentQuotaSummary>) -> Self {
        let count = |status| {
            student_results
                .iter()
                .filter(|r| r.status == status)
                .count()
        };
        let success_count = count(ReconcileStatus::Success);
        let failed_count = count(ReconcileStatus::Failed);
        let pending_count = count(ReconcileStatus::Pending);

        Self {
            total_students: student_results.len(),
            success_count,
            failed_count,
            pending_count,
            summary: format!(
                "Reconciliation completed: {success_count} success, {failed_count} failed, {pending_count} pending"
            ),
            student_results,
        }
    }
}

impl Reconciler {
    /// Reconcile every student, one after another, in listing order.
    ///
    /// A single student's failure is recorded and the run continues. Failing
    /// to list students, or reaching `deadline`, aborts the run and discards
    /// partial results.
    #[instrument(skip(self, deadline))]
    pub async fn reconcile_all(
        &self,
        deadline: Instant,
    ) -> Result<BulkReconciliationResult, ReconcileError> {
        let started = Instant::now();
        let timeout = |completed, total| ReconcileError::Timeout {
            elapsed: started.elapsed(),
            completed,
            total,
        };

        let students = timeout_at(deadline, self.records().students.list_students())
            .await
            .map_err(|_| timeout(0, 0))?
            .map_err(ReconcileError::ListStudents)?;

        let total = students.len();
        info!(total, "Starting bulk reconciliation");

        let mut results = Vec::with_capacity(total);
        for student in &students {
            if Instant::now() >= deadline {
                warn!(completed = results.len(), total, "Bulk reconciliation timed out");
                return Err(timeout(results.len(), total));
            }
            results.push(self.reconcile_resolved(student, deadline).await);
        }

        // The last student may have finished only because it ran out of time.
        if Instant::now() >= deadline {
            warn!(completed = results.len(), total, "Bulk reconciliation timed out");
            return Err(timeout(results.len(), total));
        }

        let result = BulkReconciliationResult::from_results(results);
        info!(
            total = result.total_students,
            success = result.success_count,
            failed = result.failed_count,
            pending = result.pending_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bulk reconciliation completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use eduq_model::{ProfileCatalog, Student};

    use crate::backend::BackendKind;
    use crate::memory::InMemoryRecords;
    use crate::mock::MockQuotaBackend;
    use crate::sources::Records;

    fn student(id: &str, project: Option<&str>) -> Student {
        Student {
            student_id: id.to_string(),
            name: id.to_uppercase(),
            email: format!("{id}@example.edu"),
            department: "CS".to_string(),
            keystone_user_id: None,
            keystone_project_id: project.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    fn reconciler(records: Arc<InMemoryRecords>, mock: MockQuotaBackend) -> Reconciler {
        Reconciler::new(
            Records::from_store(records),
            Arc::new(ProfileCatalog::builtin()),
        )
        .with_backends(Arc::new(mock).backends())
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_counts_partition_students() {
        let records = Arc::new(InMemoryRecords::new());
        records.add_student(student("s1", Some("p-1")));
        records.add_student(student("s2", None));
        records.add_student(student("s3", Some("p-3")));
        records.fail_enrollments("s3");

        let result = reconciler(records, MockQuotaBackend::new())
            .reconcile_all(deadline())
            .await
            .unwrap();

        assert_eq!(result.total_students, 3);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.pending_count, 1);
        assert_eq!(result.failed_count, 1);
        assert_eq!(
            result.summary,
            "Reconciliation completed: 1 success, 1 failed, 1 pending"
        );

        let ids: Vec<_> = result
            .student_results
            .iter()
            .map(|r| r.student_id.as_str())
            .collect();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);
    }

    #[tokio::test]
    async fn test_backend_failure_does_not_stop_run() {
        let records = Arc::new(InMemoryRecords::new());
        records.add_student(student("s1", Some("p-1")));
        records.add_student(student("s2", Some("p-2")));

        let result = reconciler(
            records,
            MockQuotaBackend::new().failing_on(BackendKind::Compute),
        )
        .reconcile_all(deadline())
        .await
        .unwrap();

        assert_eq!(result.failed_count, 2);
        assert_eq!(result.success_count, 0);
    }

    #[tokio::test]
    async fn test_empty_population() {
        let result = reconciler(Arc::new(InMemoryRecords::new()), MockQuotaBackend::new())
            .reconcile_all(deadline())
            .await
            .unwrap();

        assert_eq!(result.total_students, 0);
        assert!(result.student_results.is_empty());
        assert_eq!(
            result.summary,
            "Reconciliation completed: 0 success, 0 failed, 0 pending"
        );
    }

    #[tokio::test]
    async fn test_listing_failure_aborts() {
        let records = Arc::new(InMemoryRecords::new());
        records.add_student(student("s1", Some("p-1")));
        records.fail_listing();

        let err = reconciler(records, MockQuotaBackend::new())
            .reconcile_all(deadline())
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::ListStudents(_)));
    }

    #[tokio::test]
    async fn test_deadline_discards_partial_results() {
        let records = Arc::new(InMemoryRecords::new().with_latency(Duration::from_millis(30)));
        for i in 0..10 {
            records.add_student(student(&format!("s{i}"), Some("p")));
        }

        let err = reconciler(records, MockQuotaBackend::new())
            .reconcile_all(Instant::now() + Duration::from_millis(100))
            .await
            .unwrap_err();

        match err {
            ReconcileError::Timeout {
                completed, total, ..
            } => {
                assert!(completed < total);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
