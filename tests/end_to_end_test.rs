//! End-to-end tests that drive the HTTP surface of a fully wired
//! service: stub sources, in-memory storage, and a mock PDF host.

use async_trait::async_trait;
use scholar_harvester::config::{Config, StorageConfig};
use scholar_harvester::paper::RawPaper;
use scholar_harvester::pipeline::{DisabledRefiner, SearchPipeline};
use scholar_harvester::server::{app, AppState, LoggingPublisher};
use scholar_harvester::sources::{SearchQuery, SourceAdapter, SourceError, SourceRegistry};
use scholar_harvester::storage::MemoryStorage;
use std::net::SocketAddr;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct StubSource {
    name: &'static str,
    papers: Vec<RawPaper>,
    fail: bool,
}

#[async_trait]
impl SourceAdapter for StubSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "stub"
    }

    async fn search(&self, _query: &SearchQuery) -> Result<Vec<RawPaper>, SourceError> {
        if self.fail {
            return Err(SourceError::ServiceUnavailable("down".to_string()));
        }
        Ok(self.papers.clone())
    }
}

fn paper(title: &str, doi: &str, source: &str, pdf_url: Option<String>) -> RawPaper {
    RawPaper {
        title: title.to_string(),
        source: source.to_string(),
        doi: Some(doi.to_string()),
        abstract_text: Some(format!("About {}", title)),
        authors: vec!["Ada Lovelace".to_string()],
        publication_date: Some("2023-05-10".to_string()),
        pdf_url,
        ..Default::default()
    }
}

async fn pdf_host() -> MockServer {
    let server = MockServer::start().await;
    let mut body = b"%PDF-1.4\n".to_vec();
    body.resize(2048, b' ');
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;
    server
}

/// Bind an ephemeral port, serve the app, return the bound address
async fn start_service(searchers: Vec<Arc<dyn SourceAdapter>>) -> SocketAddr {
    let mut config = Config::default();
    config.search.max_rounds = 1;

    let store = Arc::new(MemoryStorage::new(&StorageConfig::default()));
    let registry = SourceRegistry::new(searchers, Vec::new(), None);
    let pipeline =
        SearchPipeline::new(config.clone(), registry, Box::new(DisabledRefiner), store).unwrap();
    let state = Arc::new(AppState::new(
        Arc::new(config),
        Arc::new(pipeline),
        Arc::new(LoggingPublisher),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_search_endpoint_delivers_full_envelope() {
    let pdf_server = pdf_host().await;
    let pdf = format!("{}/paper.pdf", pdf_server.uri());
    let addr = start_service(vec![Arc::new(StubSource {
        name: "alpha",
        papers: vec![paper("Graphene Advances", "10.1/graphene", "alpha", Some(pdf))],
        fail: false,
    })])
    .await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/api/v1/search", addr))
        .json(&serde_json::json!({
            "projectId": "p-1",
            "correlationId": "c-9",
            "queryTerms": ["graphene"],
            "batchSize": 1
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(body["projectId"], "p-1");
    assert_eq!(body["correlationId"], "c-9");
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["batchSize"], 1);
    assert_eq!(body["searchStrategy"], "multi_source");
    assert_eq!(body["searchRounds"], 1);
    assert_eq!(body["aiEnhanced"], false);
    assert_eq!(body["totalSourcesUsed"], 1);
    assert_eq!(body["queryTerms"], serde_json::json!(["graphene"]));
    assert_eq!(body["deduplicationStats"]["uniquePapers"], 1);
    assert_eq!(body["sourceStats"]["alpha"]["count"], 1);

    let papers = body["papers"].as_array().unwrap();
    assert_eq!(papers.len(), 1);
    assert_eq!(papers[0]["title"], "Graphene Advances");
    assert_eq!(papers[0]["doi"], "10.1/graphene");
    let stored = papers[0]["pdfContentUrl"].as_str().unwrap();
    assert!(stored.starts_with("memory://"), "unexpected url: {}", stored);
}

#[tokio::test]
async fn test_search_endpoint_rejects_invalid_request() {
    let addr = start_service(vec![Arc::new(StubSource {
        name: "alpha",
        papers: Vec::new(),
        fail: false,
    })])
    .await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/api/v1/search", addr))
        .json(&serde_json::json!({ "queryTerms": [] }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("queryTerms"), "unexpected: {}", message);
}

#[tokio::test]
async fn test_failing_sources_produce_empty_not_error() {
    let addr = start_service(vec![Arc::new(StubSource {
        name: "alpha",
        papers: Vec::new(),
        fail: true,
    })])
    .await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/api/v1/search", addr))
        .json(&serde_json::json!({ "queryTerms": ["anything"] }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "EMPTY");
    assert_eq!(body["batchSize"], 0);
    assert!(body["papers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_stats_endpoint_tracks_last_run() {
    let pdf_server = pdf_host().await;
    let pdf = format!("{}/paper.pdf", pdf_server.uri());
    let addr = start_service(vec![Arc::new(StubSource {
        name: "alpha",
        papers: vec![paper("Solo Paper", "10.1/solo", "alpha", Some(pdf))],
        fail: false,
    })])
    .await;
    let client = reqwest::Client::new();

    // Before any search the summary is absent
    let stats: serde_json::Value = client
        .get(format!("http://{}/api/v1/stats", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["service"], "scholar-harvester");
    assert_eq!(stats["activeSources"], serde_json::json!(["alpha"]));
    assert!(stats["lastRun"].is_null());

    client
        .post(format!("http://{}/api/v1/search", addr))
        .json(&serde_json::json!({ "queryTerms": ["solo"], "batchSize": 1 }))
        .send()
        .await
        .unwrap();

    let stats: serde_json::Value = client
        .get(format!("http://{}/api/v1/stats", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["lastRun"]["status"], "COMPLETED");
    assert_eq!(stats["lastRun"]["papersDelivered"], 1);
    assert_eq!(stats["lastRun"]["sourceStats"]["alpha"]["count"], 1);
}

#[tokio::test]
async fn test_healthz_reports_source_state_from_last_run() {
    let addr = start_service(vec![Arc::new(StubSource {
        name: "alpha",
        papers: Vec::new(),
        fail: true,
    })])
    .await;
    let client = reqwest::Client::new();

    // Unexercised sources report healthy
    let response = client
        .get(format!("http://{}/healthz", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["sources"]["alpha"], true);

    client
        .post(format!("http://{}/api/v1/search", addr))
        .json(&serde_json::json!({ "queryTerms": ["x"] }))
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = client
        .get(format!("http://{}/healthz", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["sources"]["alpha"], false);
}

#[tokio::test]
async fn test_healthz_degraded_without_sources() {
    let addr = start_service(Vec::new()).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{}/healthz", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
}
