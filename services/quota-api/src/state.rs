//! Application state shared across request handlers.

use std::sync::Arc;
use std::time::Duration;

use eduq_model::ProfileCatalog;
use eduq_reconcile::{QuotaBackends, Reconciler};

use crate::db::Database;
use crate::trigger::ReconcileTrigger;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: Database,
    reconciler: Reconciler,
    trigger: ReconcileTrigger,
    bulk_timeout: Duration,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        db: Database,
        reconciler: Reconciler,
        trigger: ReconcileTrigger,
        bulk_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                db,
                reconciler,
                trigger,
                bulk_timeout,
            }),
        }
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.inner.reconciler
    }

    pub fn trigger(&self) -> &ReconcileTrigger {
        &self.inner.trigger
    }

    /// Profile catalog loaded at startup.
    pub fn catalog(&self) -> &ProfileCatalog {
        self.inner.reconciler.catalog()
    }

    /// Quota backends, if any are configured.
    pub fn backends(&self) -> Option<&QuotaBackends> {
        self.inner.reconciler.backends()
    }

    /// Default deadline for a bulk run.
    pub fn bulk_timeout(&self) -> Duration {
        self.inner.bulk_timeout
    }
}
