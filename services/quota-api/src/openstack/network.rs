//! Neutron network quotas.
//!
//! Neutron reports consumption as `used` rather than `in_use`.

use std::sync::Arc;

use async_trait::async_trait;
use eduq_reconcile::{
    BackendError, BackendKind, NetworkQuota, NetworkQuotas, NetworkUpdate, QuotaUsage,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{KeystoneAuth, ServiceClient};

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    quota: DetailsSet,
}

#[derive(Debug, Deserialize)]
struct DetailsSet {
    port: Detail,
    floatingip: Detail,
}

#[derive(Debug, Deserialize)]
struct Detail {
    limit: i64,
    #[serde(default)]
    used: i64,
}

impl From<Detail> for QuotaUsage {
    fn from(d: Detail) -> Self {
        QuotaUsage::new(d.limit, d.used)
    }
}

#[derive(Debug, Serialize)]
struct UpdateRequest {
    quota: UpdateSet,
}

#[derive(Debug, Serialize)]
struct UpdateSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    floatingip: Option<u64>,
}

/// Network quotas backed by the Neutron quotas extension.
pub struct NeutronQuotas {
    client: ServiceClient,
}

impl NeutronQuotas {
    pub fn new(auth: Arc<KeystoneAuth>) -> Self {
        Self {
            client: ServiceClient::new(auth, BackendKind::Network),
        }
    }
}

#[async_trait]
impl NetworkQuotas for NeutronQuotas {
    async fn current(&self, project_id: &str) -> Result<NetworkQuota, BackendError> {
        let resp: DetailsResponse = self
            .client
            .get(&format!("v2.0/quotas/{project_id}/details"))
            .await?;

        Ok(NetworkQuota {
            ports: resp.quota.port.into(),
            floating_ips: resp.quota.floatingip.into(),
        })
    }

    async fn apply(&self, project_id: &str, update: &NetworkUpdate) -> Result<(), BackendError> {
        if update.is_empty() {
            return Ok(());
        }

        let body = UpdateRequest {
            quota: UpdateSet {
                port: update.ports,
                floatingip: update.floating_ips,
            },
        };
        self.client
            .put(&format!("v2.0/quotas/{project_id}"), &body)
            .await?;

        info!(
            project_id,
            ports = ?update.ports,
            floating_ips = ?update.floating_ips,
            "Applied Neutron quota"
        );
        Ok(())
    }
}
