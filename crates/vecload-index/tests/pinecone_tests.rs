use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vecload_core::config::IndexSettings;
use vecload_core::traits::VectorIndexClient;
use vecload_core::types::{IndexHandle, Metric, ProvisionAction, Topology, VectorItem};
use vecload_core::ServiceError;
use vecload_index::PineconeClient;

fn client(server: &MockServer) -> PineconeClient {
    PineconeClient::new("test-key", &server.uri(), "2024-07", Duration::from_secs(5))
        .expect("client")
        .with_polling(Duration::from_secs(2), Duration::from_millis(10))
}

fn index_model(name: &str, host: &str, ready: bool) -> serde_json::Value {
    json!({
        "name": name,
        "dimension": 384,
        "metric": "cosine",
        "host": host,
        "spec": {"serverless": {"cloud": "aws", "region": "us-east-1"}},
        "status": {"ready": ready, "state": if ready { "Ready" } else { "Initializing" }}
    })
}

#[tokio::test]
async fn list_sends_auth_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .and(header("Api-Key", "test-key"))
        .and(header("X-Pinecone-API-Version", "2024-07"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "indexes": [index_model("a", "a.svc", true), index_model("b", "b.svc", true)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let names = client(&server).list_indexes().await.expect("list");
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn describe_maps_model_and_missing_index() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/banners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(index_model("banners", "banners.svc", true)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let pc = client(&server);
    let desc = pc.describe_index("banners").await.expect("describe").expect("present");
    assert_eq!(desc.dimension, 384);
    assert_eq!(desc.metric, Metric::Cosine);
    assert_eq!(desc.topology, Some(Topology::default()));
    assert_eq!(desc.host.as_deref(), Some("banners.svc"));
    assert!(desc.ready);

    assert!(pc.describe_index("ghost").await.expect("describe").is_none());
}

#[tokio::test]
async fn create_posts_descriptor_and_waits_for_readiness() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(body_json(json!({
            "name": "banners",
            "dimension": 384,
            "metric": "cosine",
            "spec": {"serverless": {"cloud": "aws", "region": "us-east-1"}}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(index_model("banners", "banners.svc", false)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/banners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(index_model("banners", "banners.svc", false)))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/banners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(index_model("banners", "banners.svc", true)))
        .mount(&server)
        .await;

    let descriptor = IndexSettings { name: "banners".into(), ..IndexSettings::default() }.descriptor();
    let desc = client(&server).create_index(&descriptor).await.expect("create");
    assert!(desc.ready);
    assert_eq!(desc.host.as_deref(), Some("banners.svc"));
}

#[tokio::test]
async fn readiness_wait_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(index_model("slow", "slow.svc", false)))
        .mount(&server)
        .await;

    let pc = PineconeClient::new("test-key", &server.uri(), "2024-07", Duration::from_secs(5))
        .expect("client")
        .with_polling(Duration::from_millis(50), Duration::from_millis(10));
    let err = pc.wait_until_ready("slow").await.expect_err("never ready");
    assert!(err.to_string().contains("not ready"), "{err}");
}

#[tokio::test]
async fn delete_waits_until_index_is_gone() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/indexes/banners"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/banners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(index_model("banners", "banners.svc", true)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/banners"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    client(&server).delete_index("banners").await.expect("delete");
}

#[tokio::test]
async fn server_errors_surface_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = client(&server).list_indexes().await.expect_err("unauthorized");
    let msg = err.to_string();
    assert!(msg.contains("401"), "{msg}");
    assert!(msg.contains("invalid api key"), "{msg}");
}

#[tokio::test]
async fn upsert_posts_vectors_to_data_plane_host() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(header("Api-Key", "test-key"))
        .and(body_json(json!({
            "vectors": [
                {"id": "e1", "values": [0.5, 0.25], "metadata": {"content": "{\"id\":\"e1\"}"}}
            ],
            "namespace": "banners-dev"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"upsertedCount": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let handle = IndexHandle {
        name: "banners".into(),
        dimension: 2,
        host: Some(server.uri()),
        action: ProvisionAction::Created,
    };
    let mut metadata = serde_json::Map::new();
    metadata.insert("content".into(), json!("{\"id\":\"e1\"}"));
    let items = vec![VectorItem { id: "e1".into(), values: vec![0.5, 0.25], metadata }];

    let written = client(&server)
        .with_namespace(Some("banners-dev".into()))
        .upsert(&handle, &items)
        .await
        .expect("upsert");
    assert_eq!(written, 1);
}

#[tokio::test]
async fn upsert_without_host_is_rejected() {
    let server = MockServer::start().await;
    let handle = IndexHandle { name: "banners".into(), dimension: 2, host: None, action: ProvisionAction::Reused };
    let err = client(&server).upsert(&handle, &[]).await.expect_err("no host");
    assert!(err.to_string().contains("no data-plane host"));
}

#[tokio::test]
async fn upsert_errors_carry_status_for_retry_decisions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(400).set_body_string("metadata size is 41000 bytes, exceeds the limit"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let handle = IndexHandle { name: "banners".into(), dimension: 2, host: Some(server.uri()), action: ProvisionAction::Reused };
    let items = vec![VectorItem { id: "e1".into(), values: vec![0.5, 0.25], metadata: serde_json::Map::new() }];
    let pc = client(&server);

    let rejected = pc.upsert(&handle, &items).await.expect_err("400");
    let rejected = rejected.downcast_ref::<ServiceError>().expect("typed error");
    assert_eq!(rejected.status, Some(400));
    assert!(!rejected.is_retryable());

    let unavailable = pc.upsert(&handle, &items).await.expect_err("503");
    let unavailable = unavailable.downcast_ref::<ServiceError>().expect("typed error");
    assert_eq!(unavailable.status, Some(503));
    assert!(unavailable.is_retryable());
}
