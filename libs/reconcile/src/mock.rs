//! In-memory quota backend for tests and cloud-less development.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use eduq_model::QuotaProfile;
use tracing::info;

use crate::backend::{
    BackendKind, BlockStorageQuota, BlockStorageQuotas, BlockStorageUpdate, ComputeQuota,
    ComputeQuotas, ComputeUpdate, NetworkQuota, NetworkQuotas, NetworkUpdate, QuotaBackends,
    QuotaUsage,
};
use crate::error::BackendError;

/// Mock implementing all three backend capabilities over one shared map.
///
/// Limits start at zero for unknown projects and usage is always zero.
#[derive(Default)]
pub struct MockQuotaBackend {
    state: Mutex<MockState>,
    failing: HashSet<BackendKind>,
    latency: Option<Duration>,
}

#[derive(Default)]
struct MockState {
    limits: HashMap<String, QuotaProfile>,
    apply_calls: Vec<BackendKind>,
}

impl MockQuotaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `kind` fail.
    pub fn failing_on(mut self, kind: BackendKind) -> Self {
        self.failing.insert(kind);
        self
    }

    /// Delay every apply call by `latency` before it takes effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Wrap this mock as all three backends.
    pub fn backends(self: Arc<Self>) -> QuotaBackends {
        QuotaBackends::new(self.clone(), self.clone(), self)
    }

    /// Current limits of a project.
    pub fn limits(&self, project_id: &str) -> QuotaProfile {
        self.lock()
            .limits
            .get(project_id)
            .copied()
            .unwrap_or_default()
    }

    /// Backends that received an apply call, in call order.
    pub fn apply_calls(&self) -> Vec<BackendKind> {
        self.lock().apply_calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means a test panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, kind: BackendKind) -> Result<(), BackendError> {
        if self.failing.contains(&kind) {
            return Err(BackendError::Unavailable {
                backend: kind,
                message: "mock backend configured to fail".to_string(),
            });
        }
        Ok(())
    }

    async fn record_apply<F>(
        &self,
        kind: BackendKind,
        project_id: &str,
        f: F,
    ) -> Result<(), BackendError>
    where
        F: FnOnce(&mut QuotaProfile),
    {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.lock();
        state.apply_calls.push(kind);
        self.check(kind)?;
        f(state.limits.entry(project_id.to_string()).or_default());
        info!(backend = %kind, project_id, "[MOCK] Applied quota");
        Ok(())
    }
}

fn usage(limit: u64) -> QuotaUsage {
    QuotaUsage::new(i64::try_from(limit).unwrap_or(i64::MAX), 0)
}

#[async_trait]
impl ComputeQuotas for MockQuotaBackend {
    async fn current(&self, project_id: &str) -> Result<ComputeQuota, BackendError> {
        self.check(BackendKind::Compute)?;
        let l = self.limits(project_id);
        Ok(ComputeQuota {
            instances: usage(l.instances),
            cores: usage(l.cores),
            ram_mb: usage(l.ram_mb),
        })
    }

    async fn apply(&self, project_id: &str, update: &ComputeUpdate) -> Result<(), BackendError> {
        self.record_apply(BackendKind::Compute, project_id, |l| {
            if let Some(v) = update.instances {
                l.instances = v;
            }
            if let Some(v) = update.cores {
                l.cores = v;
            }
            if let Some(v) = update.ram_mb {
                l.ram_mb = v;
            }
        })
        .await
    }
}

#[async_trait]
impl BlockStorageQuotas for MockQuotaBackend {
    async fn current(&self, project_id: &str) -> Result<BlockStorageQuota, BackendError> {
        self.check(BackendKind::BlockStorage)?;
        let l = self.limits(project_id);
        Ok(BlockStorageQuota {
            volumes: usage(l.volumes),
            snapshots: usage(l.snapshots),
            gigabytes: usage(l.gigabytes),
        })
    }

    async fn apply(
        &self,
        project_id: &str,
        update: &BlockStorageUpdate,
    ) -> Result<(), BackendError> {
        self.record_apply(BackendKind::BlockStorage, project_id, |l| {
            if let Some(v) = update.volumes {
                l.volumes = v;
            }
            if let Some(v) = update.snapshots {
                l.snapshots = v;
            }
            if let Some(v) = update.gigabytes {
                l.gigabytes = v;
            }
        })
        .await
    }
}

#[async_trait]
impl NetworkQuotas for MockQuotaBackend {
    async fn current(&self, project_id: &str) -> Result<NetworkQuota, BackendError> {
        self.check(BackendKind::Network)?;
        let l = self.limits(project_id);
        Ok(NetworkQuota {
            ports: usage(l.ports),
            floating_ips: usage(l.floating_ips),
        })
    }

    async fn apply(&self, project_id: &str, update: &NetworkUpdate) -> Result<(), BackendError> {
        self.record_apply(BackendKind::Network, project_id, |l| {
            if let Some(v) = update.ports {
                l.ports = v;
            }
            if let Some(v) = update.floating_ips {
                l.floating_ips = v;
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_roundtrip() {
        let mock = MockQuotaBackend::new();
        ComputeQuotas::apply(
            &mock,
            "p-1",
            &ComputeUpdate {
                cores: Some(12),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let current = ComputeQuotas::current(&mock, "p-1").await.unwrap();
        assert_eq!(current.cores, QuotaUsage::new(12, 0));
        assert_eq!(current.instances, QuotaUsage::new(0, 0));
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let mock = MockQuotaBackend::new().failing_on(BackendKind::Network);
        let err = NetworkQuotas::apply(&mock, "p-1", &NetworkUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.backend(), BackendKind::Network);
        assert_eq!(mock.apply_calls(), vec![BackendKind::Network]);
    }

    #[tokio::test]
    async fn test_mock_latency_delays_apply() {
        let mock = MockQuotaBackend::new().with_latency(Duration::from_millis(50));
        let started = tokio::time::Instant::now();
        BlockStorageQuotas::apply(&mock, "p-1", &BlockStorageUpdate::default())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(mock.apply_calls(), vec![BackendKind::BlockStorage]);
    }
}
