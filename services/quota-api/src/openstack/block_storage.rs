//! Cinder v3 block-storage quota sets.

use std::sync::Arc;

use async_trait::async_trait;
use eduq_reconcile::{
    BackendError, BackendKind, BlockStorageQuota, BlockStorageQuotas, BlockStorageUpdate,
    QuotaUsage,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{KeystoneAuth, ServiceClient};

#[derive(Debug, Deserialize)]
struct UsageResponse {
    quota_set: UsageSet,
}

#[derive(Debug, Deserialize)]
struct UsageSet {
    volumes: Usage,
    snapshots: Usage,
    gigabytes: Usage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    limit: i64,
    #[serde(default)]
    in_use: i64,
}

impl From<Usage> for QuotaUsage {
    fn from(u: Usage) -> Self {
        QuotaUsage::new(u.limit, u.in_use)
    }
}

#[derive(Debug, Serialize)]
struct UpdateRequest {
    quota_set: UpdateSet,
}

#[derive(Debug, Serialize)]
struct UpdateSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    volumes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshots: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gigabytes: Option<u64>,
}

/// Block-storage quotas backed by Cinder `os-quota-sets`.
pub struct CinderQuotas {
    client: ServiceClient,
}

impl CinderQuotas {
    pub fn new(auth: Arc<KeystoneAuth>) -> Self {
        Self {
            client: ServiceClient::new(auth, BackendKind::BlockStorage),
        }
    }
}

#[async_trait]
impl BlockStorageQuotas for CinderQuotas {
    async fn current(&self, project_id: &str) -> Result<BlockStorageQuota, BackendError> {
        let resp: UsageResponse = self
            .client
            .get(&format!("os-quota-sets/{project_id}?usage=true"))
            .await?;

        Ok(BlockStorageQuota {
            volumes: resp.quota_set.volumes.into(),
            snapshots: resp.quota_set.snapshots.into(),
            gigabytes: resp.quota_set.gigabytes.into(),
        })
    }

    async fn apply(
        &self,
        project_id: &str,
        update: &BlockStorageUpdate,
    ) -> Result<(), BackendError> {
        if update.is_empty() {
            return Ok(());
        }

        let body = UpdateRequest {
            quota_set: UpdateSet {
                volumes: update.volumes,
                snapshots: update.snapshots,
                gigabytes: update.gigabytes,
            },
        };
        self.client
            .put(&format!("os-quota-sets/{project_id}"), &body)
            .await?;

        info!(
            project_id,
            volumes = ?update.volumes,
            snapshots = ?update.snapshots,
            gigabytes = ?update.gigabytes,
            "Applied Cinder quota"
        );
        Ok(())
    }
}
