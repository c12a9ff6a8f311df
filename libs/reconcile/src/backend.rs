//! Quota backend capabilities.
//!
//! Three remote subsystems each own a disjoint subset of the entitlement:
//!
//! - **Compute**: instances, cores, RAM
//! - **Block storage**: volumes, snapshots, gigabytes
//! - **Network**: ports, floating IPs
//!
//! Every call is scoped to one project and is idempotent. Updates are partial:
//! a `None` field is left untouched on the remote system, and an update with
//! no fields set issues no call at all.
//!
//! Applying a full entitlement is a sequential pipeline in [`BackendKind::APPLY_ORDER`]
//! that stops at the first failure. Backends applied before the failure keep
//! their new limits; the next reconciliation converges the rest.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use eduq_model::QuotaProfile;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::error::BackendError;

/// One of the three remote quota subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Compute,
    BlockStorage,
    Network,
}

impl BackendKind {
    /// The fixed order in which a full entitlement is applied.
    pub const APPLY_ORDER: [Self; 3] = [Self::Compute, Self::BlockStorage, Self::Network];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::BlockStorage => "block-storage",
            Self::Network => "network",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A limit and how much of it is consumed.
///
/// Remote systems report `-1` for unlimited, hence signed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub limit: i64,
    pub in_use: i64,
}

impl QuotaUsage {
    pub fn new(limit: i64, in_use: i64) -> Self {
        Self { limit, in_use }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeQuota {
    pub instances: QuotaUsage,
    pub cores: QuotaUsage,
    #[serde(rename = "ramMB")]
    pub ram_mb: QuotaUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStorageQuota {
    pub volumes: QuotaUsage,
    pub snapshots: QuotaUsage,
    pub gigabytes: QuotaUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkQuota {
    pub ports: QuotaUsage,
    #[serde(rename = "floatingIPs")]
    pub floating_ips: QuotaUsage,
}

/// Partial compute limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeUpdate {
    pub instances: Option<u64>,
    pub cores: Option<u64>,
    #[serde(rename = "ramMB")]
    pub ram_mb: Option<u64>,
}

impl ComputeUpdate {
    pub fn is_empty(&self) -> bool {
        self.instances.is_none() && self.cores.is_none() && self.ram_mb.is_none()
    }
}

/// Partial block-storage limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStorageUpdate {
    pub volumes: Option<u64>,
    pub snapshots: Option<u64>,
    pub gigabytes: Option<u64>,
}

impl BlockStorageUpdate {
    pub fn is_empty(&self) -> bool {
        self.volumes.is_none() && self.snapshots.is_none() && self.gigabytes.is_none()
    }
}

/// Partial network limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkUpdate {
    pub ports: Option<u64>,
    #[serde(rename = "floatingIPs")]
    pub floating_ips: Option<u64>,
}

impl NetworkUpdate {
    pub fn is_empty(&self) -> bool {
        self.ports.is_none() && self.floating_ips.is_none()
    }
}

/// Limits for all three backends; any part may be empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUpdate {
    #[serde(default)]
    pub compute: ComputeUpdate,
    #[serde(default)]
    pub block_storage: BlockStorageUpdate,
    #[serde(default)]
    pub network: NetworkUpdate,
}

impl From<QuotaProfile> for QuotaUpdate {
    fn from(p: QuotaProfile) -> Self {
        Self {
            compute: ComputeUpdate {
                instances: Some(p.instances),
                cores: Some(p.cores),
                ram_mb: Some(p.ram_mb),
            },
            block_storage: BlockStorageUpdate {
                volumes: Some(p.volumes),
                snapshots: Some(p.snapshots),
                gigabytes: Some(p.gigabytes),
            },
            network: NetworkUpdate {
                ports: Some(p.ports),
                floating_ips: Some(p.floating_ips),
            },
        }
    }
}

#[async_trait]
pub trait ComputeQuotas: Send + Sync {
    async fn current(&self, project_id: &str) -> Result<ComputeQuota, BackendError>;
    async fn apply(&self, project_id: &str, update: &ComputeUpdate) -> Result<(), BackendError>;
}

#[async_trait]
pub trait BlockStorageQuotas: Send + Sync {
    async fn current(&self, project_id: &str) -> Result<BlockStorageQuota, BackendError>;
    async fn apply(&self, project_id: &str, update: &BlockStorageUpdate)
        -> Result<(), BackendError>;
}

#[async_trait]
pub trait NetworkQuotas: Send + Sync {
    async fn current(&self, project_id: &str) -> Result<NetworkQuota, BackendError>;
    async fn apply(&self, project_id: &str, update: &NetworkUpdate) -> Result<(), BackendError>;
}

/// Current limits and usage across all three backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub compute: ComputeQuota,
    pub block_storage: BlockStorageQuota,
    pub network: NetworkQuota,
}

impl QuotaSnapshot {
    /// Planned limit minus current limit, per field.
    pub fn diff(&self, plan: &QuotaProfile) -> QuotaDiff {
        let d = |planned: u64, current: QuotaUsage| {
            i64::try_from(planned)
                .unwrap_or(i64::MAX)
                .saturating_sub(current.limit)
        };
        QuotaDiff {
            instances: d(plan.instances, self.compute.instances),
            cores: d(plan.cores, self.compute.cores),
            ram_mb: d(plan.ram_mb, self.compute.ram_mb),
            volumes: d(plan.volumes, self.block_storage.volumes),
            snapshots: d(plan.snapshots, self.block_storage.snapshots),
            gigabytes: d(plan.gigabytes, self.block_storage.gigabytes),
            ports: d(plan.ports, self.network.ports),
            floating_ips: d(plan.floating_ips, self.network.floating_ips),
        }
    }
}

/// Signed per-field difference between a plan and current limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuotaDiff {
    pub instances: i64,
    pub cores: i64,
    #[serde(rename = "ramMB")]
    pub ram_mb: i64,
    pub volumes: i64,
    pub snapshots: i64,
    pub gigabytes: i64,
    pub ports: i64,
    #[serde(rename = "floatingIPs")]
    pub floating_ips: i64,
}

/// Why one step of the apply pipeline failed.
#[derive(Debug, Error)]
pub enum ApplyCause {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// The apply pipeline stopped at `backend`.
///
/// `applied` lists the backends that already took the new limits.
#[derive(Debug, Error)]
#[error("{backend} quota apply failed: {cause}")]
pub struct ApplyFailure {
    pub backend: BackendKind,
    pub applied: Vec<BackendKind>,
    #[source]
    pub cause: ApplyCause,
}

/// Reading one or more backends failed.
#[derive(Debug, Error)]
#[error("quota read failed for {}", .errors.iter().map(|e| e.backend().as_str()).collect::<Vec<_>>().join(", "))]
pub struct SnapshotError {
    pub errors: Vec<BackendError>,
}

/// The three backend adapters, configured together.
#[derive(Clone)]
pub struct QuotaBackends {
    pub compute: Arc<dyn ComputeQuotas>,
    pub block_storage: Arc<dyn BlockStorageQuotas>,
    pub network: Arc<dyn NetworkQuotas>,
}

impl QuotaBackends {
    pub fn new(
        compute: Arc<dyn ComputeQuotas>,
        block_storage: Arc<dyn BlockStorageQuotas>,
        network: Arc<dyn NetworkQuotas>,
    ) -> Self {
        Self {
            compute,
            block_storage,
            network,
        }
    }

    /// Read all three backends concurrently.
    pub async fn snapshot(&self, project_id: &str) -> Result<QuotaSnapshot, SnapshotError> {
        let (compute, block_storage, network) = tokio::join!(
            self.compute.current(project_id),
            self.block_storage.current(project_id),
            self.network.current(project_id),
        );

        match (compute, block_storage, network) {
            (Ok(compute), Ok(block_storage), Ok(network)) => Ok(QuotaSnapshot {
                compute,
                block_storage,
                network,
            }),
            (compute, block_storage, network) => {
                let errors = [compute.err(), block_storage.err(), network.err()]
                    .into_iter()
                    .flatten()
                    .collect();
                Err(SnapshotError { errors })
            }
        }
    }

    /// Apply `update` backend by backend in [`BackendKind::APPLY_ORDER`].
    ///
    /// Stops at the first failure. Returns the backends that were written.
    pub async fn apply(
        &self,
        project_id: &str,
        update: &QuotaUpdate,
        deadline: Instant,
    ) -> Result<Vec<BackendKind>, ApplyFailure> {
        let mut applied = Vec::with_capacity(BackendKind::APPLY_ORDER.len());

        for kind in BackendKind::APPLY_ORDER {
            let step = match kind {
                BackendKind::Compute if !update.compute.is_empty() => {
                    timeout_at(deadline, self.compute.apply(project_id, &update.compute)).await
                }
                BackendKind::BlockStorage if !update.block_storage.is_empty() => {
                    timeout_at(
                        deadline,
                        self.block_storage.apply(project_id, &update.block_storage),
                    )
                    .await
                }
                BackendKind::Network if !update.network.is_empty() => {
                    timeout_at(deadline, self.network.apply(project_id, &update.network)).await
                }
                _ => {
                    debug!(backend = %kind, project_id, "Nothing to apply");
                    continue;
                }
            };

            let cause = match step {
                Ok(Ok(())) => {
                    applied.push(kind);
                    continue;
                }
                Ok(Err(e)) => ApplyCause::Backend(e),
                Err(_elapsed) => ApplyCause::DeadlineExceeded,
            };

            return Err(ApplyFailure {
                backend: kind,
                applied,
                cause,
            });
        }

        Ok(applied)
    }
}
