use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde_json::{Value, json};

use opsradar_api::app::{AppServices, build_app};
use opsradar_core::{BusinessId, StoreId, WarehouseId};
use opsradar_infra::{EngineConfig, InMemoryOpsStore, RecomputeCoordinator, ScanRunner, ScanRunnerHandle};
use opsradar_risk::StoreVisit;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(services: AppServices) -> Self {
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn services(store: &Arc<InMemoryOpsStore>) -> AppServices {
    AppServices::from_store(store.clone(), EngineConfig::default())
}

fn neglected_store(business_id: BusinessId) -> StoreVisit {
    StoreVisit {
        store_id: StoreId::new(),
        business_id,
        name: Some("Harbour Deli".to_string()),
        status: "active".to_string(),
        last_visit_at: None,
        created_at: Utc::now() - ChronoDuration::days(45),
    }
}

#[tokio::test]
async fn health_is_ok() {
    let server = TestServer::spawn(services(&InMemoryOpsStore::arc())).await;

    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn full_scan_returns_stats() {
    let store = InMemoryOpsStore::arc();
    store.seed_store(neglected_store(BusinessId::new()));
    let server = TestServer::spawn(services(&store)).await;
    let client = reqwest::Client::new();

    let res = client.post(server.url("/v1/scans")).json(&json!({})).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["store_churn"]["analyzed"], json!(1));
    assert_eq!(body["store_churn"]["new_risks"], json!(1));
    assert_eq!(body["store_churn"]["actions_queued"], json!(1));
    assert_eq!(body["snapshot"], json!("inserted"));
    assert!(body["failures"].as_array().unwrap().is_empty());

    assert_eq!(store.insights().len(), 1);
    assert_eq!(store.snapshots().len(), 1);

    // second run refreshes the same open insight
    let body: Value = client
        .post(server.url("/v1/scans"))
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["store_churn"]["updated_risks"], json!(1));
    assert_eq!(body["snapshot"], json!("updated"));
    assert_eq!(store.insights().len(), 1);
}

#[tokio::test]
async fn warehouse_scan_skips_snapshot() {
    let store = InMemoryOpsStore::arc();
    let business = BusinessId::new();
    store.seed_store(neglected_store(business));
    let server = TestServer::spawn(services(&store)).await;

    let res = reqwest::Client::new()
        .post(server.url("/v1/scans"))
        .json(&json!({
            "business_id": business.to_string(),
            "warehouse_id": WarehouseId::new().to_string(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["scope"]["business_id"], json!(business.to_string()));
    assert_eq!(body["store_churn"]["new_risks"], json!(1));
    assert_eq!(body["snapshot"], Value::Null);
    assert!(store.snapshots().is_empty());
}

#[tokio::test]
async fn invalid_horizon_is_rejected_without_writes() {
    let store = InMemoryOpsStore::arc();
    store.seed_store(neglected_store(BusinessId::new()));
    let server = TestServer::spawn(services(&store)).await;

    let res = reqwest::Client::new()
        .post(server.url("/v1/scans"))
        .json(&json!({ "horizon_days": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("validation_error"));
    assert!(store.insights().is_empty());
    assert!(store.snapshots().is_empty());
}

#[tokio::test]
async fn trigger_without_runner_conflicts() {
    let server = TestServer::spawn(services(&InMemoryOpsStore::arc())).await;

    let res = reqwest::Client::new()
        .post(server.url("/v1/scans/trigger"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], json!("runner_disabled"));
}

#[tokio::test]
async fn trigger_wakes_the_runner() {
    let store = InMemoryOpsStore::arc();
    let coordinator = Arc::new(RecomputeCoordinator::new(store.clone(), EngineConfig::default()));
    let runner: ScanRunnerHandle = ScanRunner::default().spawn("api-test-runner", coordinator);

    // wait for the startup run so the trigger below is the only pending one
    for _ in 0..200 {
        if store.snapshots().len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(runner.attempts(), 1);

    let server = TestServer::spawn(services(&store).with_trigger(runner.trigger_handle())).await;
    let res = reqwest::Client::new()
        .post(server.url("/v1/scans/trigger"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["queued"], json!(true));

    let mut woke = false;
    for _ in 0..200 {
        if runner.attempts() >= 2 {
            woke = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(woke);

    runner.shutdown().await;
}
