use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};

use jobwire_api::app::{self, BrokerServices};
use jobwire_broker::{ConnectionManager, InMemoryBroker, InMemoryConnector};
use jobwire_infra::{ManagementSettings, StatsAggregator};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(app: axum::Router) -> Self {
        // Same router as prod, bound to an ephemeral port.
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

async fn ready_services(broker: &InMemoryBroker) -> Arc<BrokerServices> {
    let services = BrokerServices::connect(InMemoryConnector::new(broker.clone()), "amqp://test")
        .await
        .expect("in-memory broker always connects");
    Arc::new(services)
}

fn uninitialized_services() -> Arc<BrokerServices> {
    let connection = ConnectionManager::new(InMemoryConnector::new(InMemoryBroker::new()));
    Arc::new(BrokerServices::new(Arc::new(connection)))
}

/// Stats aggregator pointed at a port nobody listens on.
fn offline_stats(queues: &[&str]) -> Arc<StatsAggregator> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let settings = ManagementSettings {
        base_url,
        timeout: Duration::from_millis(300),
        ..Default::default()
    };
    Arc::new(StatsAggregator::new(settings, queues.iter().copied()).unwrap())
}

fn published_bodies(broker: &InMemoryBroker) -> Vec<(String, Value)> {
    broker
        .published()
        .into_iter()
        .map(|(_, m)| {
            assert!(m.persistent, "job messages must be persistent");
            (m.routing_key, serde_json::from_slice(&m.body).unwrap())
        })
        .collect()
}

// -------------------------
// Producer API
// -------------------------

#[tokio::test]
async fn post_jobs_publishes_and_returns_202() {
    let broker = InMemoryBroker::new();
    let server = TestServer::spawn(app::build_producer_app(ready_services(&broker).await)).await;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/jobs"))
        .json(&json!({ "jobId": "j1", "userId": "u1", "data": { "task": "resize" } }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "status": "queued", "jobId": "j1" }));

    assert_eq!(
        published_bodies(&broker),
        vec![(
            "job.create".to_string(),
            json!({ "jobId": "j1", "userId": "u1", "data": { "task": "resize" } })
        )]
    );
}

#[tokio::test]
async fn post_jobs_without_user_id_is_rejected() {
    let broker = InMemoryBroker::new();
    let server = TestServer::spawn(app::build_producer_app(ready_services(&broker).await)).await;

    let res = reqwest::Client::new()
        .post(server.url("/jobs"))
        .json(&json!({ "jobId": "j1", "data": {} }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "userId is required" }));
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn malformed_json_is_a_400() {
    let broker = InMemoryBroker::new();
    let server = TestServer::spawn(app::build_producer_app(ready_services(&broker).await)).await;

    let res = reqwest::Client::new()
        .post(server.url("/jobs"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_json");
    assert!(body["message"].is_string());
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn health_reflects_connection_state() {
    let broker = InMemoryBroker::new();
    let ready = TestServer::spawn(app::build_producer_app(ready_services(&broker).await)).await;
    let not_ready = TestServer::spawn(app::build_producer_app(uninitialized_services())).await;
    let client = reqwest::Client::new();

    let res = client.get(ready.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(not_ready.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "status": "unavailable", "broker": "uninitialized" }));
}

#[tokio::test]
async fn health_is_503_once_the_channel_closes() {
    let broker = InMemoryBroker::new();
    let server = TestServer::spawn(app::build_producer_app(ready_services(&broker).await)).await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    broker.close();

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "status": "unavailable", "broker": "closed" }));
}

#[tokio::test]
async fn publishing_before_initialize_is_a_503() {
    let server = TestServer::spawn(app::build_producer_app(uninitialized_services())).await;

    let res = reqwest::Client::new()
        .post(server.url("/jobs"))
        .json(&json!({ "userId": "u1" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_initialized");
}

#[tokio::test]
async fn broker_failure_is_a_502() {
    let broker = InMemoryBroker::new();
    let server = TestServer::spawn(app::build_producer_app(ready_services(&broker).await)).await;
    broker.close();

    let res = reqwest::Client::new()
        .post(server.url("/jobs"))
        .json(&json!({ "userId": "u1" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "publish_error");
}

// -------------------------
// Monitor
// -------------------------

#[tokio::test]
async fn monitor_publish_generates_job_id_and_defaults_data() {
    let broker = InMemoryBroker::new();
    let server = TestServer::spawn(app::build_monitor_app(
        ready_services(&broker).await,
        offline_stats(&[]),
    ))
    .await;

    let res = reqwest::Client::new()
        .post(server.url("/api/publish"))
        .json(&json!({ "userId": "u1" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "queued");
    let job_id = body["jobId"].as_str().unwrap().to_string();
    assert!(!job_id.is_empty());

    let published = published_bodies(&broker);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "job.create");
    assert_eq!(
        published[0].1,
        json!({ "jobId": job_id, "userId": "u1", "data": {} })
    );
}

#[tokio::test]
async fn monitor_publish_without_user_id_publishes_nothing() {
    let broker = InMemoryBroker::new();
    let server = TestServer::spawn(app::build_monitor_app(
        ready_services(&broker).await,
        offline_stats(&[]),
    ))
    .await;
    let client = reqwest::Client::new();

    for body in [json!({ "jobId": "j1" }), json!({ "userId": "" })] {
        let res = client
            .post(server.url("/api/publish"))
            .json(&body)
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, json!({ "error": "userId is required" }));
    }
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn monitor_stats_degrade_to_zeroes_when_management_is_down() {
    let broker = InMemoryBroker::new();
    let server = TestServer::spawn(app::build_monitor_app(
        ready_services(&broker).await,
        offline_stats(&["job.queue", "job.retry.queue", "job.dlq"]),
    ))
    .await;

    let res = reqwest::get(server.url("/api/stats")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["queues"],
        json!([
            { "name": "job.queue", "messages_ready": 0, "messages_unacknowledged": 0, "messages": 0, "consumers": 0 },
            { "name": "job.retry.queue", "messages_ready": 0, "messages_unacknowledged": 0, "messages": 0, "consumers": 0 },
            { "name": "job.dlq", "messages_ready": 0, "messages_unacknowledged": 0, "messages": 0, "consumers": 0 },
        ])
    );
    assert_eq!(body["channels"], json!([]));
    assert!(body["polledAt"].is_string());
}
