//! OpenStack quota adapters.
//!
//! Keystone v3 password authentication with a cached token and service
//! catalog, plus Nova, Cinder and Neutron quota-set clients implementing the
//! three quota backend capabilities.

mod auth;
mod block_storage;
mod compute;
mod network;

pub use auth::KeystoneAuth;
pub use block_storage::CinderQuotas;
pub use compute::NovaQuotas;
pub use network::NeutronQuotas;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use eduq_reconcile::{BackendError, BackendKind, QuotaBackends};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// Per-request timeout for OpenStack API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenStack connection settings.
#[derive(Clone)]
pub struct OpenStackConfig {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub user_domain_id: String,
    pub project_name: String,
    pub region_name: String,
}

impl std::fmt::Debug for OpenStackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenStackConfig")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("user_domain_id", &self.user_domain_id)
            .field("project_name", &self.project_name)
            .field("region_name", &self.region_name)
            .finish()
    }
}

impl OpenStackConfig {
    /// Load settings from `OS_*` environment variables.
    ///
    /// Returns `Ok(None)` when `OS_AUTH_URL` is unset.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_vars<F>(get: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| get(name).filter(|v| !v.trim().is_empty());

        let Some(auth_url) = get("OS_AUTH_URL") else {
            return Ok(None);
        };

        let mut missing = Vec::new();
        let mut require = |name: &'static str| {
            get(name).unwrap_or_else(|| {
                missing.push(name);
                String::new()
            })
        };

        let config = Self {
            auth_url,
            username: require("OS_USERNAME"),
            password: require("OS_PASSWORD"),
            user_domain_id: require("OS_USER_DOMAIN_ID"),
            project_name: require("OS_PROJECT_NAME"),
            region_name: require("OS_REGION_NAME"),
        };

        if !missing.is_empty() {
            anyhow::bail!(
                "OS_AUTH_URL is set but these OpenStack settings are missing: {}",
                missing.join(", ")
            );
        }

        Ok(Some(config))
    }
}

/// Build the three quota backends against one Keystone session.
///
/// Authentication happens lazily on the first call.
pub fn quota_backends(config: &OpenStackConfig) -> Result<QuotaBackends> {
    let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let auth = Arc::new(KeystoneAuth::new(http, config.clone()));

    Ok(QuotaBackends::new(
        Arc::new(NovaQuotas::new(auth.clone())),
        Arc::new(CinderQuotas::new(auth.clone())),
        Arc::new(NeutronQuotas::new(auth)),
    ))
}

/// Authenticated JSON calls against one service's catalog endpoint.
#[derive(Clone)]
struct ServiceClient {
    auth: Arc<KeystoneAuth>,
    kind: BackendKind,
}

impl ServiceClient {
    fn new(auth: Arc<KeystoneAuth>, kind: BackendKind) -> Self {
        Self { auth, kind }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let (token, endpoint) = self.auth.endpoint(self.kind).await?;
        let url = join_url(&endpoint, path);
        debug!(backend = %self.kind, url = %url, "GET");

        let response = self
            .auth
            .http()
            .get(&url)
            .header("X-Auth-Token", token)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let response = self.check(response).await?;
        response.json().await.map_err(|e| BackendError::Decode {
            backend: self.kind,
            message: e.to_string(),
        })
    }

    async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<(), BackendError> {
        let (token, endpoint) = self.auth.endpoint(self.kind).await?;
        let url = join_url(&endpoint, path);
        debug!(backend = %self.kind, url = %url, "PUT");

        let response = self
            .auth
            .http()
            .put(&url)
            .header("X-Auth-Token", token)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        self.check(response).await?;
        Ok(())
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            // Token revoked or expired early; re-authenticate on the next call.
            self.auth.invalidate().await;
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            backend: self.kind,
            status: status.as_u16(),
            body,
        })
    }

    fn transport(&self, err: reqwest::Error) -> BackendError {
        BackendError::Transport {
            backend: self.kind,
            source: Box::new(err),
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
