//! OpenStack quota adapters against a mock Keystone and service catalog.

use eduq_quota_api::openstack::{quota_backends, OpenStackConfig};
use eduq_reconcile::{
    BackendError, BackendKind, BlockStorageQuotas, BlockStorageUpdate, ComputeQuotas,
    ComputeUpdate, NetworkQuotas, NetworkUpdate, QuotaBackends, QuotaUsage,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "gAAAAAB-test-token";
const PROJECT: &str = "proj-20231234";

fn config(server: &MockServer) -> OpenStackConfig {
    OpenStackConfig {
        auth_url: format!("{}/identity/v3", server.uri()),
        username: "quota-admin".to_string(),
        password: "secret".to_string(),
        user_domain_id: "default".to_string(),
        project_name: "admin".to_string(),
        region_name: "RegionOne".to_string(),
    }
}

fn catalog_entry(service_type: &str, url: String) -> serde_json::Value {
    json!({
        "type": service_type,
        "endpoints": [
            { "interface": "internal", "region": "RegionOne", "url": "http://unreachable.invalid" },
            { "interface": "public", "region": "RegionOne", "url": url }
        ]
    })
}

async fn mount_keystone(server: &MockServer) {
    let base = server.uri();
    Mock::given(method("POST"))
        .and(path("/identity/v3/auth/tokens"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", TOKEN)
                .set_body_json(json!({
                    "token": {
                        "expires_at": "2099-01-01T00:00:00Z",
                        "catalog": [
                            catalog_entry("compute", format!("{base}/compute/v2.1")),
                            catalog_entry("volumev3", format!("{base}/volume/v3/admin")),
                            catalog_entry("network", format!("{base}/network")),
                        ]
                    }
                })),
        )
        .mount(server)
        .await;
}

async fn backends(server: &MockServer) -> QuotaBackends {
    mount_keystone(server).await;
    quota_backends(&config(server)).unwrap()
}

#[tokio::test]
async fn test_nova_detail_is_read_with_token() {
    let server = MockServer::start().await;
    let backends = backends(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/compute/v2.1/os-quota-sets/{PROJECT}/detail")))
        .and(header("X-Auth-Token", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quota_set": {
                "id": PROJECT,
                "cores": { "limit": 8, "in_use": 2, "reserved": 0 },
                "ram": { "limit": 8192, "in_use": 2048, "reserved": 0 },
                "instances": { "limit": 4, "in_use": 1, "reserved": 0 }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let quota = backends.compute.current(PROJECT).await.unwrap();
    assert_eq!(quota.cores, QuotaUsage::new(8, 2));
    assert_eq!(quota.ram_mb, QuotaUsage::new(8192, 2048));
    assert_eq!(quota.instances, QuotaUsage::new(4, 1));
}

#[tokio::test]
async fn test_nova_update_sends_only_set_fields() {
    let server = MockServer::start().await;
    let backends = backends(&server).await;

    Mock::given(method("PUT"))
        .and(path(format!("/compute/v2.1/os-quota-sets/{PROJECT}")))
        .and(header("X-Auth-Token", TOKEN))
        .and(body_json(json!({ "quota_set": { "cores": 12, "ram": 12288 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "quota_set": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let update = ComputeUpdate {
        cores: Some(12),
        ram_mb: Some(12288),
        instances: None,
    };
    backends.compute.apply(PROJECT, &update).await.unwrap();
}

#[tokio::test]
async fn test_cinder_usage_query() {
    let server = MockServer::start().await;
    let backends = backends(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/volume/v3/admin/os-quota-sets/{PROJECT}")))
        .and(query_param("usage", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quota_set": {
                "volumes": { "limit": 5, "in_use": 1, "reserved": 0, "allocated": 0 },
                "snapshots": { "limit": 5, "in_use": 0, "reserved": 0, "allocated": 0 },
                "gigabytes": { "limit": 100, "in_use": 20, "reserved": 0, "allocated": 0 }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let quota = backends.block_storage.current(PROJECT).await.unwrap();
    assert_eq!(quota.volumes, QuotaUsage::new(5, 1));
    assert_eq!(quota.gigabytes, QuotaUsage::new(100, 20));
}

#[tokio::test]
async fn test_neutron_used_maps_to_in_use() {
    let server = MockServer::start().await;
    let backends = backends(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/network/v2.0/quotas/{PROJECT}/details")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quota": {
                "port": { "limit": 10, "used": 3, "reserved": 0 },
                "floatingip": { "limit": 2, "used": 1, "reserved": 0 },
                "network": { "limit": 10, "used": 1, "reserved": 0 }
            }
        })))
        .mount(&server)
        .await;

    let quota = backends.network.current(PROJECT).await.unwrap();
    assert_eq!(quota.ports, QuotaUsage::new(10, 3));
    assert_eq!(quota.floating_ips, QuotaUsage::new(2, 1));
}

#[tokio::test]
async fn test_error_status_is_reported_with_backend() {
    let server = MockServer::start().await;
    let backends = backends(&server).await;

    Mock::given(method("PUT"))
        .and(path(format!("/network/v2.0/quotas/{PROJECT}")))
        .respond_with(ResponseTemplate::new(409).set_body_string("Quota exceeds usage"))
        .mount(&server)
        .await;

    let update = NetworkUpdate {
        ports: Some(1),
        floating_ips: None,
    };
    let err = backends.network.apply(PROJECT, &update).await.unwrap_err();

    assert_eq!(err.backend(), BackendKind::Network);
    match err {
        BackendError::Status { status, body, .. } => {
            assert_eq!(status, 409);
            assert!(body.contains("exceeds"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_update_sends_nothing() {
    let server = MockServer::start().await;
    let backends = backends(&server).await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    backends
        .block_storage
        .apply(PROJECT, &BlockStorageUpdate::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_token_is_reused_across_services() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/v3/auth/tokens"))
        .and(body_json(json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": "quota-admin",
                            "domain": { "id": "default" },
                            "password": "secret"
                        }
                    }
                },
                "scope": {
                    "project": { "name": "admin", "domain": { "id": "default" } }
                }
            }
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", TOKEN)
                .set_body_json(json!({
                    "token": {
                        "expires_at": "2099-01-01T00:00:00Z",
                        "catalog": [
                            catalog_entry("compute", format!("{}/compute/v2.1", server.uri())),
                            catalog_entry("network", format!("{}/network", server.uri())),
                        ]
                    }
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(header("X-Auth-Token", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let backends = quota_backends(&config(&server)).unwrap();
    let compute = ComputeUpdate {
        instances: Some(2),
        ..ComputeUpdate::default()
    };
    let network = NetworkUpdate {
        floating_ips: Some(1),
        ..NetworkUpdate::default()
    };
    backends.compute.apply(PROJECT, &compute).await.unwrap();
    backends.network.apply(PROJECT, &network).await.unwrap();
}

#[tokio::test]
async fn test_missing_catalog_entry_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/identity/v3/auth/tokens"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", TOKEN)
                .set_body_json(json!({
                    "token": { "expires_at": "2099-01-01T00:00:00Z", "catalog": [] }
                })),
        )
        .mount(&server)
        .await;

    let backends = quota_backends(&config(&server)).unwrap();
    let err = backends.block_storage.current(PROJECT).await.unwrap_err();

    assert!(matches!(
        err,
        BackendError::Auth {
            backend: BackendKind::BlockStorage,
            ..
        }
    ));
}
