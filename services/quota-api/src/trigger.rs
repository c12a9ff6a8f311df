//! Fire-and-forget reconciliation triggers.
//!
//! Enrollment changes enqueue a single-student job on a bounded queue. One
//! background worker drains it, running each job under its own deadline, so
//! triggers for the same student never overlap. When the queue is full the
//! trigger is dropped; the next trigger or a bulk run repairs the state.

use std::time::Duration;

use eduq_reconcile::{ReconcileStatus, Reconciler, MAX_DEADLINE};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// One queued single-student reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileJob {
    pub student_id: String,
    /// The course whose enrollment changed, for logging.
    pub course_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("reconcile queue is full")]
    QueueFull,

    #[error("reconcile worker has stopped")]
    WorkerStopped,
}

/// Enqueues reconciliation jobs without waiting for them.
#[derive(Clone)]
pub struct ReconcileTrigger {
    tx: mpsc::Sender<ReconcileJob>,
}

impl ReconcileTrigger {
    /// Enqueue a job for `student_id`. Never blocks; failures are logged.
    pub fn trigger(&self, student_id: &str, course_id: Option<&str>) {
        let job = ReconcileJob {
            student_id: student_id.to_string(),
            course_id: course_id.map(str::to_string),
        };

        match self.try_enqueue(job) {
            Ok(()) => debug!(student_id, ?course_id, "Queued reconciliation"),
            Err(e) => warn!(student_id, ?course_id, error = %e, "Dropped reconciliation trigger"),
        }
    }

    /// Jobs waiting for the worker.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Whether a worker still drains the queue.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Enqueue a job, reporting why it could not be queued.
    pub fn try_enqueue(&self, job: ReconcileJob) -> Result<(), TriggerError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TriggerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TriggerError::WorkerStopped,
        })
    }
}

/// Background worker draining the trigger queue.
pub struct TriggerWorker {
    rx: mpsc::Receiver<ReconcileJob>,
    reconciler: Reconciler,
    timeout: Duration,
}

/// Create a trigger handle and the worker that serves it.
///
/// `timeout` is capped at [`MAX_DEADLINE`].
pub fn reconcile_queue(
    reconciler: Reconciler,
    capacity: usize,
    timeout: Duration,
) -> (ReconcileTrigger, TriggerWorker) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ReconcileTrigger { tx },
        TriggerWorker {
            rx,
            reconciler,
            timeout: timeout.min(MAX_DEADLINE),
        },
    )
}

impl TriggerWorker {
    /// Run until shutdown is signaled or every trigger handle is dropped.
    ///
    /// A job already in progress when shutdown arrives runs to completion.
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            timeout_secs = self.timeout.as_secs(),
            "Starting reconcile trigger worker"
        );

        loop {
            tokio::select! {
                job = self.rx.recv() => {
                    match job {
                        Some(job) => self.process(job).await,
                        None => {
                            info!("Trigger queue closed");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconcile trigger worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn process(&self, job: ReconcileJob) {
        let deadline = Instant::now() + self.timeout;
        let summary = self
            .reconciler
            .reconcile_student(&job.student_id, deadline)
            .await;

        match summary.status {
            ReconcileStatus::Success => info!(
                student_id = %job.student_id,
                course_id = ?job.course_id,
                active_courses = summary.active_courses.len(),
                "Triggered reconciliation succeeded"
            ),
            ReconcileStatus::Pending => info!(
                student_id = %job.student_id,
                course_id = ?job.course_id,
                message = ?summary.message,
                "Triggered reconciliation pending"
            ),
            ReconcileStatus::Failed => warn!(
                student_id = %job.student_id,
                course_id = ?job.course_id,
                message = ?summary.message,
                "Triggered reconciliation failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use eduq_model::{ProfileCatalog, QuotaProfile, Student};
    use eduq_reconcile::{InMemoryRecords, MockQuotaBackend, Records};

    fn reconciler(records: Arc<InMemoryRecords>, mock: Arc<MockQuotaBackend>) -> Reconciler {
        Reconciler::new(
            Records::from_store(records),
            Arc::new(ProfileCatalog::builtin()),
        )
        .with_backends(mock.backends())
    }

    fn student(id: &str) -> Student {
        Student {
            student_id: id.to_string(),
            name: id.to_string(),
            email: format!("{id}@example.edu"),
            department: "CS".to_string(),
            keystone_user_id: None,
            keystone_project_id: Some(format!("p-{id}")),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_enqueued_job_is_executed() {
        let records = Arc::new(InMemoryRecords::new());
        records.add_student(student("s1"));
        let mock = Arc::new(MockQuotaBackend::new());

        let (trigger, worker) = reconcile_queue(
            reconciler(records, mock.clone()),
            8,
            Duration::from_secs(5),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(shutdown_rx));

        trigger.trigger("s1", Some("c1"));

        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while mock.limits("p-s1") != QuotaProfile::basic() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "trigger was not processed");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (trigger, _worker) = reconcile_queue(
            reconciler(
                Arc::new(InMemoryRecords::new()),
                Arc::new(MockQuotaBackend::new()),
            ),
            1,
            Duration::from_secs(5),
        );

        let job = |id: &str| ReconcileJob {
            student_id: id.to_string(),
            course_id: None,
        };
        trigger.try_enqueue(job("s1")).unwrap();
        assert_eq!(trigger.queued(), 1);
        assert_eq!(trigger.capacity(), 1);
        assert!(matches!(
            trigger.try_enqueue(job("s2")),
            Err(TriggerError::QueueFull)
        ));

        // The fire-and-forget path only logs.
        trigger.trigger("s3", None);
    }

    #[tokio::test]
    async fn test_stopped_worker_is_reported() {
        let (trigger, worker) = reconcile_queue(
            reconciler(
                Arc::new(InMemoryRecords::new()),
                Arc::new(MockQuotaBackend::new()),
            ),
            4,
            Duration::from_secs(5),
        );
        assert!(trigger.is_running());
        drop(worker);
        assert!(!trigger.is_running());

        let err = trigger
            .try_enqueue(ReconcileJob {
                student_id: "s1".to_string(),
                course_id: None,
            })
            .unwrap_err();
        assert!(matches!(err, TriggerError::WorkerStopped));
    }
}
