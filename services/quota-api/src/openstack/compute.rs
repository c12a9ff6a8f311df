//! Nova compute quota sets.

use std::sync::Arc;

use async_trait::async_trait;
use eduq_reconcile::{
    BackendError, BackendKind, ComputeQuota, ComputeQuotas, ComputeUpdate, QuotaUsage,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{KeystoneAuth, ServiceClient};

#[derive(Debug, Deserialize)]
struct DetailResponse {
    quota_set: DetailSet,
}

#[derive(Debug, Deserialize)]
struct DetailSet {
    cores: Detail,
    ram: Detail,
    instances: Detail,
}

#[derive(Debug, Deserialize)]
struct Detail {
    limit: i64,
    #[serde(default)]
    in_use: i64,
}

impl From<Detail> for QuotaUsage {
    fn from(d: Detail) -> Self {
        QuotaUsage::new(d.limit, d.in_use)
    }
}

#[derive(Debug, Serialize)]
struct UpdateRequest {
    quota_set: UpdateSet,
}

#[derive(Debug, Serialize)]
struct UpdateSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    cores: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ram: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instances: Option<u64>,
}

/// Compute quotas backed by Nova `os-quota-sets`.
pub struct NovaQuotas {
    client: ServiceClient,
}

impl NovaQuotas {
    pub fn new(auth: Arc<KeystoneAuth>) -> Self {
        Self {
            client: ServiceClient::new(auth, BackendKind::Compute),
        }
    }
}

#[async_trait]
impl ComputeQuotas for NovaQuotas {
    async fn current(&self, project_id: &str) -> Result<ComputeQuota, BackendError> {
        let resp: DetailResponse = self
            .client
            .get(&format!("os-quota-sets/{project_id}/detail"))
            .await?;

        Ok(ComputeQuota {
            instances: resp.quota_set.instances.into(),
            cores: resp.quota_set.cores.into(),
            ram_mb: resp.quota_set.ram.into(),
        })
    }

    async fn apply(&self, project_id: &str, update: &ComputeUpdate) -> Result<(), BackendError> {
        if update.is_empty() {
            return Ok(());
        }

        let body = UpdateRequest {
            quota_set: UpdateSet {
                cores: update.cores,
                ram: update.ram_mb,
                instances: update.instances,
            },
        };
        self.client
            .put(&format!("os-quota-sets/{project_id}"), &body)
            .await?;

        info!(
            project_id,
            cores = ?update.cores,
            ram_mb = ?update.ram_mb,
            instances = ?update.instances,
            "Applied Nova quota"
        );
        Ok(())
    }
}
