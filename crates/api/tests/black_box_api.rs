use std::sync::Arc;

use prismo_api::app::{build_app_with_services, services::build_in_memory_services};
use prismo_infra::config::{AppConfig, AuthConfig};
use reqwest::StatusCode;
use serde_json::{Value, json};

const USER: &str = "prismo";
const PASSWORD: &str = "s3cret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = AppConfig::from_lookup(|_| None).expect("default config");
        let services = Arc::new(build_in_memory_services(&config));
        let metrics = prismo_observability::metrics::install().expect("metrics recorder");
        // Same router as prod, bound to an ephemeral port.
        let app = build_app_with_services(
            services,
            AuthConfig {
                username: USER.to_string(),
                password: PASSWORD.to_string(),
            },
            metrics,
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/prismo/v1{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .basic_auth(USER, Some(PASSWORD))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .basic_auth(USER, Some(PASSWORD))
            .send()
            .await
            .unwrap()
    }

    async fn create_account(&self, document_number: &str) -> i64 {
        let res = self
            .post("/accounts", json!({ "document_number": document_number }))
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        body["account_id"].as_i64().unwrap()
    }

    async fn create_operation_type(&self, description: &str) -> i64 {
        let res = self
            .post("/operation-types", json!({ "description": description }))
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        body["operationtype_id"].as_i64().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn ping_needs_no_auth_and_carries_default_headers() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .get(format!("{}/ping", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-frame-options"], "SAMEORIGIN");
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn metrics_are_public_and_count_locks_and_commits() {
    let srv = TestServer::spawn().await;
    srv.create_account("31415926535").await;

    let res = srv
        .client
        .get(format!("{}/metrics", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = res.text().await.unwrap();
    assert!(body.contains(r#"prismo_lock_acquired_total{class="DEFAULT"}"#));
    assert!(body.contains("prismo_tx_commits_total"));
}

#[tokio::test]
async fn caller_request_id_is_echoed() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .get(format!("{}/ping", srv.base_url))
        .header("X-Request-ID", "req-123")
        .send()
        .await
        .unwrap();

    assert_eq!(res.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn protected_endpoints_require_basic_auth() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .get(srv.url("/operation-types"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = srv
        .client
        .get(srv.url("/operation-types"))
        .basic_auth(USER, Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Wrong username/password");
}

#[tokio::test]
async fn account_lifecycle() {
    let srv = TestServer::spawn().await;

    let id = srv.create_account("12345678900").await;

    let res = srv.get(&format!("/accounts/{id}")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "account_id": id, "document_number": "12345678900" }));

    let dup = srv
        .post("/accounts", json!({ "document_number": "12345678900" }))
        .await;
    assert_eq!(dup.status(), StatusCode::CONFLICT);

    assert_eq!(srv.get("/accounts/999").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(srv.get("/accounts/abc").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(srv.get("/accounts/0").await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_bodies_are_bad_requests() {
    let srv = TestServer::spawn().await;

    let res = srv.post("/accounts", json!({ "document_number": "" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv.post("/accounts", json!({ "document": 1 })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .post("/accounts", json!({ "document_number": "1234567890123456" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn books_and_lists_transactions() {
    let srv = TestServer::spawn().await;
    let account_id = srv.create_account("111").await;
    let operation_type_id = srv.create_operation_type("COMPRA A VISTA").await;

    let res = srv
        .post(
            "/transactions",
            json!({
                "account_id": account_id,
                "operationtype_id": operation_type_id,
                "amount": 123.45,
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let booked: Value = res.json().await.unwrap();
    assert_eq!(booked["amount"], json!(123.45));
    assert_eq!(booked["account_id"], json!(account_id));

    let res = srv.get(&format!("/accounts/{account_id}/transactions")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(listed["items"][0]["transaction_id"], booked["transaction_id"]);

    let res = srv.get("/operation-types").await;
    let types: Value = res.json().await.unwrap();
    assert_eq!(types["items"][0]["description"], "COMPRA A VISTA");
}

#[tokio::test]
async fn transaction_validation() {
    let srv = TestServer::spawn().await;
    let account_id = srv.create_account("222").await;
    let operation_type_id = srv.create_operation_type("SAQUE").await;

    let cases = [
        json!({ "account_id": account_id, "operationtype_id": operation_type_id, "amount": 0 }),
        json!({ "account_id": account_id, "operationtype_id": operation_type_id, "amount": -5.0 }),
        json!({ "account_id": account_id, "operationtype_id": operation_type_id, "amount": 1.234 }),
        json!({ "account_id": 0, "operationtype_id": operation_type_id, "amount": 1.0 }),
        json!({ "account_id": 9999, "operationtype_id": operation_type_id, "amount": 1.0 }),
        json!({ "account_id": account_id, "operationtype_id": 9999, "amount": 1.0 }),
    ];
    for body in cases {
        let res = srv.post("/transactions", body.clone()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }

    let res = srv.get(&format!("/accounts/{account_id}/transactions")).await;
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed["items"], json!([]));
}

#[tokio::test]
async fn concurrent_account_creation_yields_one_account() {
    let srv = Arc::new(TestServer::spawn().await);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let srv = srv.clone();
        handles.push(tokio::spawn(async move {
            srv.post("/accounts", json!({ "document_number": "777" }))
                .await
                .status()
        }));
    }

    let mut created = 0;
    for h in handles {
        let status = h.await.unwrap();
        match status {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT | StatusCode::LOCKED => {}
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 1);
}
