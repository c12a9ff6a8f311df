//! Student quota reconciliation.
//!
//! Drives each student's remote quota toward the entitlement implied by their
//! enrollments. Key concepts:
//!
//! - **Desired state**: the `basic` baseline plus the profile of every course
//!   the student is actively enrolled in.
//! - **Current state**: the limits held by the compute, block-storage and
//!   network backends for the student's project.
//! - **Convergence**: writing the desired limits to all three backends.
//!
//! # Invariants
//!
//! - The effective entitlement never depends on enrollment order
//! - Backends are written in a fixed order and the first failure stops the rest
//! - A student without a remote project is pending, never failed
//! - Every step respects one caller-supplied deadline

pub mod aggregator;
pub mod backend;
pub mod bulk;
pub mod calculator;
pub mod error;
pub mod memory;
pub mod mock;
pub mod orchestrator;
pub mod sources;
pub mod summary;

use std::time::Duration;

pub use aggregator::{aggregate_active_courses, Aggregation, AggregationError, SkippedCourse};
pub use backend::{
    ApplyCause, ApplyFailure, BackendKind, BlockStorageQuota, BlockStorageQuotas,
    BlockStorageUpdate, ComputeQuota, ComputeQuotas, ComputeUpdate, NetworkQuota, NetworkQuotas,
    NetworkUpdate, QuotaBackends, QuotaDiff, QuotaSnapshot, QuotaUpdate, QuotaUsage,
    SnapshotError,
};
pub use bulk::BulkReconciliationResult;
pub use calculator::compute_effective;
pub use error::{BackendError, ReconcileError, StoreError};
pub use memory::InMemoryRecords;
pub use mock::MockQuotaBackend;
pub use orchestrator::Reconciler;
pub use sources::{CourseCatalog, EnrollmentSource, Records, StudentDirectory};
pub use summary::{ReconcileStatus, StudentQuotaSummary};

/// Default deadline for one event-triggered student reconciliation.
pub const DEFAULT_TRIGGER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for a bulk run.
pub const DEFAULT_BULK_TIMEOUT: Duration = Duration::from_secs(5 * 60); // 5 minutes

/// Upper bound on any configured or requested deadline.
pub const MAX_DEADLINE: Duration = Duration::from_secs(24 * 60 * 60);
