//! Single-student reconciliation.
//!
//! Steps, each of which may end the attempt:
//!
//! 1. Resolve the student record
//! 2. Aggregate active courses (per-course failures are absorbed)
//! 3. Compute the effective entitlement from the `basic` baseline
//! 4. Stop as pending if there is no remote project or no backend
//! 5. Apply compute, block storage, then network; stop at the first failure
//!
//! Expected conditions never escape as errors; they end up in the returned
//! [`StudentQuotaSummary`].

use std::sync::Arc;

use eduq_model::{ProfileCatalog, Student};
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument, warn};

use crate::aggregator::aggregate_active_courses;
use crate::backend::{ApplyFailure, QuotaBackends, QuotaUpdate};
use crate::calculator::compute_effective;
use crate::sources::Records;
use crate::summary::StudentQuotaSummary;

/// Drives students' quota toward their computed entitlement.
#[derive(Clone)]
pub struct Reconciler {
    records: Records,
    catalog: Arc<ProfileCatalog>,
    backends: Option<QuotaBackends>,
}

impl Reconciler {
    /// Create a reconciler without backends; every attempt ends pending.
    pub fn new(records: Records, catalog: Arc<ProfileCatalog>) -> Self {
        Self {
            records,
            catalog,
            backends: None,
        }
    }

    /// Attach the three quota backends.
    pub fn with_backends(mut self, backends: QuotaBackends) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    pub fn backends(&self) -> Option<&QuotaBackends> {
        self.backends.as_ref()
    }

    pub(crate) fn records(&self) -> &Records {
        &self.records
    }

    /// Reconcile one student by id.
    #[instrument(skip(self, deadline))]
    pub async fn reconcile_student(&self, student_id: &str, deadline: Instant) -> StudentQuotaSummary {
        let summary = StudentQuotaSummary::new(student_id, "", self.catalog.baseline());

        let lookup = timeout_at(deadline, self.records.students.get_student(student_id)).await;
        let student = match lookup {
            Ok(Ok(Some(student))) => student,
            Ok(Ok(None)) => {
                warn!(student_id, "Student not found");
                return summary.fail(format!("student {student_id} not found"));
            }
            Ok(Err(e)) => {
                warn!(student_id, error = %e, "Failed to resolve student");
                return summary.fail(format!("failed to get student {student_id}: {e}"));
            }
            Err(_) => return summary.fail("deadline exceeded while resolving student"),
        };

        self.reconcile_resolved(&student, deadline).await
    }

    /// Reconcile a student whose record is already loaded.
    #[instrument(skip(self, student, deadline), fields(student_id = %student.student_id))]
    pub async fn reconcile_resolved(&self, student: &Student, deadline: Instant) -> StudentQuotaSummary {
        let mut summary =
            StudentQuotaSummary::new(&student.student_id, &student.name, self.catalog.baseline());

        let aggregation = match aggregate_active_courses(
            self.records.enrollments.as_ref(),
            self.records.courses.as_ref(),
            &student.student_id,
            deadline,
        )
        .await
        {
            Ok(aggregation) => aggregation,
            Err(e) => {
                warn!(error = %e, "Aggregation failed");
                return summary.fail(e.to_string());
            }
        };

        let effective = compute_effective(summary.baseline_quota, &aggregation.active_courses);
        summary.active_courses = aggregation.active_courses;
        summary.skipped_courses = aggregation.skipped;
        summary.effective_quota = Some(effective);

        let Some(project_id) = student.project_ref() else {
            return summary.pending("student has no remote project yet");
        };
        let Some(backends) = &self.backends else {
            return summary.pending("no quota backends configured");
        };

        match backends
            .apply(project_id, &QuotaUpdate::from(effective), deadline)
            .await
        {
            Ok(_) => {
                info!(
                    project_id,
                    instances = effective.instances,
                    cores = effective.cores,
                    ram_mb = effective.ram_mb,
                    volumes = effective.volumes,
                    gigabytes = effective.gigabytes,
                    snapshots = effective.snapshots,
                    ports = effective.ports,
                    floating_ips = effective.floating_ips,
                    "Applied effective quota"
                );
                summary.succeed(effective)
            }
            Err(failure) => {
                warn!(project_id, error = %failure, "Quota apply failed");
                summary.fail(describe_failure(&failure))
            }
        }
    }
}

fn describe_failure(failure: &ApplyFailure) -> String {
    if failure.applied.is_empty() {
        return failure.to_string();
    }
    let applied: Vec<&str> = failure.applied.iter().map(|k| k.as_str()).collect();
    format!("{failure} (already applied: {})", applied.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use eduq_model::{Course, Enrollment, EnrollmentStatus, QuotaProfile};
    use rstest::rstest;

    use crate::backend::BackendKind;
    use crate::memory::InMemoryRecords;
    use crate::mock::MockQuotaBackend;
    use crate::summary::ReconcileStatus;

    fn student(id: &str, project: Option<&str>) -> Student {
        Student {
            student_id: id.to_string(),
            name: format!("Student {id}"),
            email: format!("{id}@example.edu"),
            department: "CS".to_string(),
            keystone_user_id: None,
            keystone_project_id: project.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    fn course(id: &str, profile: QuotaProfile) -> Course {
        let now = Utc::now();
        Course {
            course_id: id.to_string(),
            title: id.to_string(),
            department: "CS".to_string(),
            semester: "2025-1".to_string(),
            start_at: now,
            end_at: now,
            quota_profile: profile,
            defaults: None,
            created_at: now,
        }
    }

    fn enroll(records: &InMemoryRecords, student: &str, course: &str) {
        let now = Utc::now();
        records.add_enrollment(Enrollment {
            student_id: student.to_string(),
            course_id: course.to_string(),
            status: EnrollmentStatus::Active,
            start_at: now,
            end_at: now,
        });
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn setup(mock: MockQuotaBackend) -> (Arc<InMemoryRecords>, Arc<MockQuotaBackend>, Reconciler) {
        let records = Arc::new(InMemoryRecords::new());
        let mock = Arc::new(mock);
        let reconciler = Reconciler::new(
            Records::from_store(records.clone()),
            Arc::new(ProfileCatalog::builtin()),
        )
        .with_backends(mock.clone().backends());
        (records, mock, reconciler)
    }

    #[tokio::test]
    async fn test_no_enrollments_reconciles_to_baseline() {
        let (records, mock, reconciler) = setup(MockQuotaBackend::new());
        records.add_student(student("s1", Some("p-1")));

        let summary = reconciler.reconcile_student("s1", deadline()).await;

        assert_eq!(summary.status, ReconcileStatus::Success);
        assert_eq!(summary.effective_quota, Some(QuotaProfile::basic()));
        assert_eq!(summary.applied_quota, Some(QuotaProfile::basic()));
        assert_eq!(mock.limits("p-1"), QuotaProfile::basic());
    }

    #[tokio::test]
    async fn test_active_course_adds_to_baseline() {
        let (records, mock, reconciler) = setup(MockQuotaBackend::new());
        records.add_student(student("s1", Some("p-1")));
        records.add_course(course(
            "c1",
            QuotaProfile {
                cores: 4,
                ram_mb: 4096,
                ..QuotaProfile::ZERO
            },
        ));
        enroll(&records, "s1", "c1");

        let summary = reconciler.reconcile_student("s1", deadline()).await;

        assert!(summary.is_success());
        assert_eq!(summary.student_name, "Student s1");
        assert_eq!(summary.active_courses.len(), 1);
        let applied = mock.limits("p-1");
        assert_eq!(applied.cores, 12);
        assert_eq!(applied.ram_mb, 20480);
        assert_eq!(applied.instances, 10);
    }

    #[tokio::test]
    async fn test_unknown_student_fails_without_backend_calls() {
        let (_records, mock, reconciler) = setup(MockQuotaBackend::new());

        let summary = reconciler.reconcile_student("missing", deadline()).await;

        assert_eq!(summary.status, ReconcileStatus::Failed);
        assert_eq!(summary.message.as_deref(), Some("student missing not found"));
        assert!(mock.apply_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_project_is_pending() {
        let (records, mock, reconciler) = setup(MockQuotaBackend::new());
        records.add_student(student("s1", None));

        let summary = reconciler.reconcile_student("s1", deadline()).await;

        assert_eq!(summary.status, ReconcileStatus::Pending);
        assert_eq!(summary.effective_quota, Some(QuotaProfile::basic()));
        assert_eq!(summary.applied_quota, None);
        assert!(summary.message.is_some());
        assert!(mock.apply_calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_backends_is_pending() {
        let records = Arc::new(InMemoryRecords::new());
        records.add_student(student("s1", Some("p-1")));
        let reconciler = Reconciler::new(
            Records::from_store(records.clone()),
            Arc::new(ProfileCatalog::builtin()),
        );

        let summary = reconciler.reconcile_student("s1", deadline()).await;

        assert_eq!(summary.status, ReconcileStatus::Pending);
        assert_eq!(
            summary.message.as_deref(),
            Some("no quota backends configured")
        );
    }

    #[rstest]
    #[case::compute(BackendKind::Compute, "compute", None, &[BackendKind::Compute])]
    #[case::block_storage(
        BackendKind::BlockStorage,
        "block-storage",
        Some("already applied: compute"),
        &[BackendKind::Compute, BackendKind::BlockStorage]
    )]
    #[case::network(
        BackendKind::Network,
        "network",
        Some("already applied: compute, block-storage"),
        &BackendKind::APPLY_ORDER
    )]
    #[tokio::test]
    async fn test_backend_failure_stops_pipeline(
        #[case] failing: BackendKind,
        #[case] prefix: &str,
        #[case] already_applied: Option<&str>,
        #[case] calls: &[BackendKind],
    ) {
        let (records, mock, reconciler) = setup(MockQuotaBackend::new().failing_on(failing));
        records.add_student(student("s1", Some("p-1")));

        let summary = reconciler.reconcile_student("s1", deadline()).await;

        assert_eq!(summary.status, ReconcileStatus::Failed);
        assert_eq!(summary.applied_quota, None);
        let message = summary.message.unwrap();
        assert!(message.starts_with(prefix), "{message}");
        match already_applied {
            Some(applied) => assert!(message.contains(applied), "{message}"),
            None => assert!(!message.contains("already applied"), "{message}"),
        }
        assert_eq!(mock.apply_calls(), calls.to_vec());
    }

    #[tokio::test]
    async fn test_deadline_inside_compute_apply_fails_attempt() {
        let (records, mock, reconciler) =
            setup(MockQuotaBackend::new().with_latency(Duration::from_millis(500)));
        records.add_student(student("s1", Some("p-1")));

        let summary = reconciler
            .reconcile_student("s1", Instant::now() + Duration::from_millis(50))
            .await;

        assert_eq!(summary.status, ReconcileStatus::Failed);
        assert_eq!(summary.effective_quota, Some(QuotaProfile::basic()));
        assert_eq!(summary.applied_quota, None);
        let message = summary.message.unwrap();
        assert!(message.starts_with("compute"), "{message}");
        assert!(message.contains("deadline exceeded"), "{message}");
        assert!(mock.apply_calls().is_empty());
        assert_eq!(mock.limits("p-1"), QuotaProfile::ZERO);
    }

    #[tokio::test]
    async fn test_enrollment_failure_fails_attempt() {
        let (records, mock, reconciler) = setup(MockQuotaBackend::new());
        records.add_student(student("s1", Some("p-1")));
        records.fail_enrollments("s1");

        let summary = reconciler.reconcile_student("s1", deadline()).await;

        assert_eq!(summary.status, ReconcileStatus::Failed);
        assert!(summary
            .message
            .unwrap()
            .starts_with("failed to get enrollments"));
        assert!(mock.apply_calls().is_empty());
    }

    #[tokio::test]
    async fn test_course_failure_does_not_hide_other_courses() {
        let (records, mock, reconciler) = setup(MockQuotaBackend::new());
        records.add_student(student("s1", Some("p-1")));
        records.add_course(course(
            "c1",
            QuotaProfile {
                cores: 2,
                ..QuotaProfile::ZERO
            },
        ));
        records.add_course(course(
            "c2",
            QuotaProfile {
                cores: 3,
                ..QuotaProfile::ZERO
            },
        ));
        records.fail_course("c1");
        enroll(&records, "s1", "c1");
        enroll(&records, "s1", "c2");

        let summary = reconciler.reconcile_student("s1", deadline()).await;

        assert!(summary.is_success());
        assert_eq!(summary.skipped_courses.len(), 1);
        assert_eq!(mock.limits("p-1").cores, 11);
    }

    #[tokio::test]
    async fn test_deadline_fails_attempt() {
        let records = Arc::new(InMemoryRecords::new().with_latency(Duration::from_millis(200)));
        records.add_student(student("s1", Some("p-1")));
        let reconciler = Reconciler::new(
            Records::from_store(records.clone()),
            Arc::new(ProfileCatalog::builtin()),
        )
        .with_backends(Arc::new(MockQuotaBackend::new()).backends());

        let summary = reconciler
            .reconcile_student("s1", Instant::now() + Duration::from_millis(10))
            .await;

        assert_eq!(summary.status, ReconcileStatus::Failed);
        assert!(summary.message.unwrap().contains("deadline exceeded"));
    }
}
