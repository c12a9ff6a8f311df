//! Liveness and readiness endpoints.
//!
//! Readiness depends on the database and on the trigger worker. Quota backends
//! and the profile catalog are reported for operators but never fail it:
//! without backends every reconciliation ends pending.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

const SERVICE_NAME: &str = "quota-api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Ok,
    Disabled,
    Unavailable,
}

#[derive(Debug, Serialize)]
pub struct Check {
    pub status: CheckState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Check {
    fn ok() -> Self {
        Self {
            status: CheckState::Ok,
            message: None,
            details: None,
        }
    }

    fn with_state(status: CheckState, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            details: None,
        }
    }

    fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether this check blocks traffic.
    fn is_blocking(&self) -> bool {
        self.status == CheckState::Unavailable
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    /// "ok" or "degraded".
    pub status: &'static str,
    pub service: &'static str,
    pub checked_at: DateTime<Utc>,
    pub components: Components,
}

#[derive(Debug, Serialize)]
pub struct Components {
    pub database: Check,
    pub trigger_queue: Check,
    pub quota_backends: Check,
    pub profiles: Check,
}

impl Components {
    fn ready(&self) -> bool {
        !self.database.is_blocking() && !self.trigger_queue.is_blocking()
    }
}

/// Create health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/livez", get(|| async { StatusCode::OK }))
}

/// GET /healthz
async fn healthz() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /readyz
async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    let database = match state.db().health_check().await {
        Ok(()) => Check::ok(),
        Err(e) => Check::with_state(CheckState::Unavailable, e.to_string()),
    };

    let trigger = state.trigger();
    let trigger_queue = if trigger.is_running() {
        Check::ok()
    } else {
        Check::with_state(CheckState::Unavailable, "reconcile worker has stopped")
    }
    .details(serde_json::json!({
        "queued": trigger.queued(),
        "capacity": trigger.capacity(),
    }));

    let quota_backends = match state.backends() {
        Some(_) => Check::ok(),
        None => Check::with_state(CheckState::Disabled, "no quota backends configured"),
    };

    let profiles = Check::ok().details(serde_json::json!({
        "names": state.catalog().names().collect::<Vec<_>>(),
    }));

    let components = Components {
        database,
        trigger_queue,
        quota_backends,
        profiles,
    };
    let ready = components.ready();

    let report = ReadinessReport {
        status: if ready { "ok" } else { "degraded" },
        service: SERVICE_NAME,
        checked_at: Utc::now(),
        components,
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(database: Check, trigger_queue: Check) -> Components {
        Components {
            database,
            trigger_queue,
            quota_backends: Check::with_state(CheckState::Disabled, "off"),
            profiles: Check::ok(),
        }
    }

    #[test]
    fn test_disabled_backends_do_not_block_readiness() {
        assert!(components(Check::ok(), Check::ok()).ready());
    }

    #[test]
    fn test_database_or_worker_outage_blocks_readiness() {
        let down = || Check::with_state(CheckState::Unavailable, "down");
        assert!(!components(down(), Check::ok()).ready());
        assert!(!components(Check::ok(), down()).ready());
    }

    #[test]
    fn test_check_serializes_lowercase_state() {
        let json = serde_json::to_value(Check::with_state(CheckState::Disabled, "off")).unwrap();
        assert_eq!(json["status"], "disabled");
        assert_eq!(json["message"], "off");
        assert!(json.get("details").is_none());
    }
}
