//! Keystone v3 password authentication.
//!
//! One project-scoped token is shared by all three quota clients. The token
//! and its service catalog are cached until shortly before `expires_at`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use eduq_reconcile::{BackendError, BackendKind};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::OpenStackConfig;

/// Refresh this long before the token's own expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Keystone session shared by the quota clients.
pub struct KeystoneAuth {
    http: reqwest::Client,
    config: OpenStackConfig,
    session: Mutex<Option<Session>>,
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    expires_at: DateTime<Utc>,
    catalog: Vec<CatalogService>,
}

impl Session {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    expires_at: DateTime<Utc>,
    #[serde(default)]
    catalog: Vec<CatalogService>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogService {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

/// Catalog service types that serve a backend, in preference order.
fn service_types(kind: BackendKind) -> &'static [&'static str] {
    match kind {
        BackendKind::Compute => &["compute"],
        BackendKind::BlockStorage => &["block-storage", "volumev3"],
        BackendKind::Network => &["network"],
    }
}

impl KeystoneAuth {
    pub fn new(http: reqwest::Client, config: OpenStackConfig) -> Self {
        Self {
            http,
            config,
            session: Mutex::new(None),
        }
    }

    pub(super) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// A valid token and the public endpoint serving `kind`.
    pub async fn endpoint(&self, kind: BackendKind) -> Result<(String, String), BackendError> {
        let mut guard = self.session.lock().await;

        let session = match guard.take() {
            Some(session) if session.is_fresh(Utc::now()) => session,
            _ => self.authenticate(kind).await?,
        };
        let session = &*guard.insert(session);

        let url = self.find_endpoint(session, kind).ok_or_else(|| BackendError::Auth {
            backend: kind,
            message: format!(
                "no public {} endpoint in region {} in the service catalog",
                service_types(kind).join("/"),
                self.config.region_name
            ),
        })?;

        Ok((session.token.clone(), url))
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        self.session.lock().await.take();
    }

    fn find_endpoint(&self, session: &Session, kind: BackendKind) -> Option<String> {
        let region = self.config.region_name.as_str();

        service_types(kind).iter().find_map(|wanted| {
            session
                .catalog
                .iter()
                .filter(|service| service.service_type == *wanted)
                .flat_map(|service| service.endpoints.iter())
                .find(|ep| {
                    ep.interface == "public"
                        && (ep.region.as_deref() == Some(region)
                            || ep.region_id.as_deref() == Some(region))
                })
                .map(|ep| ep.url.clone())
        })
    }

    fn tokens_url(&self) -> String {
        let base = self.config.auth_url.trim_end_matches('/');
        if base.ends_with("/v3") {
            format!("{base}/auth/tokens")
        } else {
            format!("{base}/v3/auth/tokens")
        }
    }

    async fn authenticate(&self, kind: BackendKind) -> Result<Session, BackendError> {
        let auth_error = |message: String| BackendError::Auth {
            backend: kind,
            message,
        };

        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.config.username,
                            "domain": { "id": self.config.user_domain_id },
                            "password": self.config.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": self.config.project_name,
                        "domain": { "id": self.config.user_domain_id },
                    }
                }
            }
        });

        let url = self.tokens_url();
        debug!(url = %url, "Requesting Keystone token");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transport {
                backend: kind,
                source: Box::new(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(auth_error(format!("keystone returned {status}: {text}")));
        }

        let token = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| auth_error("keystone response has no X-Subject-Token".to_string()))?;

        let body: TokenResponse = response.json().await.map_err(|e| BackendError::Decode {
            backend: kind,
            message: e.to_string(),
        })?;

        info!(
            expires_at = %body.token.expires_at,
            services = body.token.catalog.len(),
            "Authenticated with Keystone"
        );

        Ok(Session {
            token,
            expires_at: body.token.expires_at,
            catalog: body.token.catalog,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(auth_url: &str) -> OpenStackConfig {
        OpenStackConfig {
            auth_url: auth_url.to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            user_domain_id: "default".to_string(),
            project_name: "admin".to_string(),
            region_name: "RegionOne".to_string(),
        }
    }

    fn endpoint(interface: &str, region: &str, url: &str) -> CatalogEndpoint {
        CatalogEndpoint {
            interface: interface.to_string(),
            region: Some(region.to_string()),
            region_id: None,
            url: url.to_string(),
        }
    }

    #[test]
    fn test_tokens_url() {
        let http = reqwest::Client::new();
        assert_eq!(
            KeystoneAuth::new(http.clone(), config("http://ks:5000/v3/")).tokens_url(),
            "http://ks:5000/v3/auth/tokens"
        );
        assert_eq!(
            KeystoneAuth::new(http, config("http://ks:5000")).tokens_url(),
            "http://ks:5000/v3/auth/tokens"
        );
    }

    #[test]
    fn test_catalog_prefers_public_endpoint_in_region() {
        let auth = KeystoneAuth::new(reqwest::Client::new(), config("http://ks:5000/v3"));
        let session = Session {
            token: "t".to_string(),
            expires_at: Utc::now(),
            catalog: vec![
                CatalogService {
                    service_type: "volumev3".to_string(),
                    endpoints: vec![
                        endpoint("internal", "RegionOne", "http://internal"),
                        endpoint("public", "RegionTwo", "http://other-region"),
                        endpoint("public", "RegionOne", "http://cinder"),
                    ],
                },
                CatalogService {
                    service_type: "compute".to_string(),
                    endpoints: vec![endpoint("admin", "RegionOne", "http://nova-admin")],
                },
            ],
        };

        assert_eq!(
            auth.find_endpoint(&session, BackendKind::BlockStorage),
            Some("http://cinder".to_string())
        );
        assert_eq!(auth.find_endpoint(&session, BackendKind::Compute), None);
    }

    #[test]
    fn test_session_freshness_margin() {
        let now = Utc::now();
        let session = |secs| Session {
            token: String::new(),
            expires_at: now + ChronoDuration::seconds(secs),
            catalog: Vec::new(),
        };
        assert!(session(3600).is_fresh(now));
        assert!(!session(30).is_fresh(now));
    }
}
