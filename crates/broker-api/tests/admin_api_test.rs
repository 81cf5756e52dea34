//! Integration tests for the admin endpoints

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use broker_api::{models::*, AdminServer, AdminServerConfig};
use broker_proto::AccountConfig;
use broker_registry::{AdmissionConfig, AdmissionController, UserRegistry};
use broker_store::{
    AccountRecords, AccountStore, DiskAccountStore, DiskStore, DiskStoreOptions,
    MemoryAccountStore, StoreError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // For `oneshot` method

const SECRET: &str = "operator-secret";

fn create_test_server(store: Arc<dyn AccountStore>, config: AdminServerConfig) -> AdminServer {
    let controller = Arc::new(AdmissionController::new(
        Arc::new(UserRegistry::new()),
        store,
        AdmissionConfig::default(),
    ));
    AdminServer::new(
        AdminServerConfig {
            admin_secret: SECRET.to_string(),
            ..config
        },
        controller,
    )
}

fn memory_server() -> (AdminServer, Arc<MemoryAccountStore>) {
    let store = Arc::new(MemoryAccountStore::new());
    let server = create_test_server(store.clone(), AdminServerConfig::default());
    (server, store)
}

fn adduser_request(body: &str, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/adduser")
        .method("POST")
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("Auth", secret);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn info_request(accept: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/info").header("Auth", SECRET);
    if let Some(accept) = accept {
        builder = builder.header(header::ACCEPT, accept);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_bytes(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn account_json(id: &str, subdomains: &[&str]) -> String {
    json!({ "accountId": id, "subdomains": subdomains }).to_string()
}

#[tokio::test]
async fn test_provision_success() {
    let (server, store) = memory_server();

    let (status, body) = body_bytes(
        server.build_router(),
        adduser_request(&account_json("a1", &["a1.example"]), Some(SECRET)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let response: ProvisionResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(response.code, "ok");
    assert_eq!(response.account_id, "a1");
    assert_eq!(response.subdomains, vec!["a1.example".to_string()]);

    assert_eq!(
        store.get("a1"),
        Some(AccountConfig::new("a1", vec!["a1.example".to_string()]))
    );
}

#[tokio::test]
async fn test_provision_requires_secret() {
    let (server, store) = memory_server();

    for secret in [None, Some("wrong"), Some("")] {
        let (status, body) = body_bytes(
            server.build_router(),
            adduser_request(&account_json("a1", &["a1.example"]), secret),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(error.code.is_some());
    }

    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_provision_conflicts() {
    let (server, store) = memory_server();

    let (status, _) = body_bytes(
        server.build_router(),
        adduser_request(&account_json("a1", &["a1.example"]), Some(SECRET)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = body_bytes(
        server.build_router(),
        adduser_request(&account_json("a2", &["a1.example"]), Some(SECRET)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code.as_deref(), Some("SUBDOMAIN_TAKEN"));

    let (status, body) = body_bytes(
        server.build_router(),
        adduser_request(&account_json("a1", &["other.example"]), Some(SECRET)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code.as_deref(), Some("ACCOUNT_EXISTS"));

    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn test_provision_bad_bodies() {
    let (server, store) = memory_server();

    for body in [
        "not json",
        r#"{"subdomains": ["a.example"]}"#,
        r#"{"accountId": ""}"#,
        r#"{"accountId": "a/b"}"#,
        r#"{"accountId": "a1", "subdomains": ["x.example", "x.example"]}"#,
    ] {
        let (status, _) =
            body_bytes(server.build_router(), adduser_request(body, Some(SECRET))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
    }

    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_provision_overlong_id_is_400_on_disk_store() {
    let dir = tempfile::tempdir().unwrap();
    let disk = DiskStore::open(DiskStoreOptions::new(dir.path())).unwrap();
    let server = create_test_server(
        Arc::new(DiskAccountStore::new(disk)),
        AdminServerConfig::default(),
    );

    let id = "a".repeat(300);
    let (status, body) = body_bytes(
        server.build_router(),
        adduser_request(&account_json(&id, &[]), Some(SECRET)),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code.as_deref(), Some("INVALID_ACCOUNT"));
}

#[tokio::test]
async fn test_provision_store_failure_is_500() {
    let (server, store) = memory_server();
    store.set_fail_writes(true);

    let (status, body) = body_bytes(
        server.build_router(),
        adduser_request(&account_json("a1", &["a1.example"]), Some(SECRET)),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.code.as_deref(), Some("STORAGE_ERROR"));

    // Nothing became visible
    let (status, body) = body_bytes(server.build_router(), info_request(None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

struct SlowStore;

impl AccountStore for SlowStore {
    fn save(&self, _config: &AccountConfig) -> Result<(), StoreError> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(())
    }

    fn load_all(&self) -> AccountRecords<'_> {
        Box::new(std::iter::empty())
    }
}

#[tokio::test]
async fn test_provision_store_timeout_is_500() {
    let server = create_test_server(
        Arc::new(SlowStore),
        AdminServerConfig {
            store_timeout: Duration::from_millis(20),
            ..AdminServerConfig::default()
        },
    );

    let (status, _) = body_bytes(
        server.build_router(),
        adduser_request(&account_json("a1", &[]), Some(SECRET)),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_info_lists_accounts_one_per_line() {
    let (server, _store) = memory_server();
    for (id, sub) in [("b", "b.example"), ("a", "a.example")] {
        let (status, _) = body_bytes(
            server.build_router(),
            adduser_request(&account_json(id, &[sub]), Some(SECRET)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = body_bytes(server.build_router(), info_request(None)).await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["accountId"], "a");
    assert_eq!(first["subdomains"], json!(["a.example"]));
    assert_eq!(first["bytesTransferredPeriod"], 0);
}

#[tokio::test]
async fn test_info_html_uses_breaks() {
    let (server, _store) = memory_server();
    let (status, _) = body_bytes(
        server.build_router(),
        adduser_request(&account_json("a1", &["a1.example"]), Some(SECRET)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let response = server
        .build_router()
        .oneshot(info_request(Some("text/html,application/xhtml+xml")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/html"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("<br>"));
    assert!(text.contains("a1.example"));
}

#[tokio::test]
async fn test_info_requires_secret() {
    let (server, _store) = memory_server();
    let request = Request::builder().uri("/info").body(Body::empty()).unwrap();

    let (status, _) = body_bytes(server.build_router(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_public() {
    let (server, _store) = memory_server();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = body_bytes(server.build_router(), request).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.accounts, 0);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (server, _store) = memory_server();
    let request = Request::builder()
        .uri("/api/openapi.json")
        .body(Body::empty())
        .unwrap();

    let (status, body) = body_bytes(server.build_router(), request).await;
    assert_eq!(status, StatusCode::OK);
    let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(doc["paths"]["/adduser"].is_object());
}

#[tokio::test]
async fn test_static_files_are_served() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "hello broker").unwrap();

    let server = create_test_server(
        Arc::new(MemoryAccountStore::new()),
        AdminServerConfig {
            static_dir: Some(dir.path().to_path_buf()),
            ..AdminServerConfig::default()
        },
    );

    let request = Request::builder()
        .uri("/static/hello.txt")
        .body(Body::empty())
        .unwrap();
    let (status, body) = body_bytes(server.build_router(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"hello broker");
}

#[tokio::test]
async fn test_provisioned_account_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let open_store = || -> Arc<dyn AccountStore> {
        let disk = DiskStore::open(DiskStoreOptions::new(dir.path())).unwrap();
        Arc::new(DiskAccountStore::new(disk))
    };

    let server = create_test_server(open_store(), AdminServerConfig::default());
    let (status, _) = body_bytes(
        server.build_router(),
        adduser_request(&account_json("a1", &["a1.example"]), Some(SECRET)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    drop(server);

    let registry = UserRegistry::new();
    let report = broker_registry::load_registry(&registry, open_store().as_ref());
    assert_eq!(report.loaded, 1);
    assert!(registry.lookup_by_subdomain("a1.example").is_some());
}
