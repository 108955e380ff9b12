//! Integration tests for the collector
//!
//! These tests use wiremock to serve paginated ranking endpoints and run
//! the collection and sweep flows end-to-end over real HTTP.

use serde_json::json;
use smart_sweep::collector::{
    build_http_client, run_sweep, CollectionError, CollectorOptions, HttpPageFetcher,
    PageFetcher, PaginatedCollector, PartitionOutcome, RetryPolicy,
};
use smart_sweep::config::{parse_config, HttpConfig, LayoutConfig};
use smart_sweep::model::{AddressRecord, Record, RequestDescriptor};
use smart_sweep::storage::{RunStatus, SqliteStorage, Storage};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds a ranking page body in the provider's envelope
fn create_test_page(total: u64, wallets: &[(&str, f64)]) -> serde_json::Value {
    let result: Vec<_> = wallets
        .iter()
        .map(|(address, score)| json!({ "address": address, "score": score, "tags": "smart_money" }))
        .collect();
    json!({ "code": 0, "data": { "total": total, "result": result } })
}

fn create_test_layout() -> LayoutConfig {
    LayoutConfig {
        rank: Some("score".to_string()),
        tags: Some("tags".to_string()),
        ..LayoutConfig::default()
    }
}

fn create_test_collector(max_retries: u32) -> PaginatedCollector<AddressRecord> {
    let client = build_http_client(&HttpConfig::default()).expect("Failed to build client");
    let fetcher: Arc<dyn PageFetcher<AddressRecord>> =
        Arc::new(HttpPageFetcher::new(client, create_test_layout()));
    let options = CollectorOptions {
        max_concurrency: 3,
        retry: RetryPolicy::new(max_retries, Duration::from_millis(5)),
        ..CollectorOptions::default()
    };
    PaginatedCollector::new(fetcher, options)
}

fn create_test_descriptor(server: &MockServer, page_size: u32) -> RequestDescriptor {
    let endpoint = Url::parse(&format!("{}/api/rank", server.uri())).expect("Failed to parse URL");
    RequestDescriptor::new(endpoint, "501", page_size)
}

async fn mount_page(server: &MockServer, page: u32, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/rank"))
        .and(query_param("pageNo", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_collect_all_pages_over_http() {
    let mock_server = MockServer::start().await;

    mount_page(&mock_server, 1, create_test_page(5, &[("0xa", 0.2), ("0xb", 0.9)])).await;
    mount_page(&mock_server, 2, create_test_page(5, &[("0xc", 0.5), ("0xa", 0.7)])).await;
    mount_page(&mock_server, 3, create_test_page(5, &[("0xd", 0.1)])).await;

    let collection = create_test_collector(1)
        .collect(&create_test_descriptor(&mock_server, 2))
        .await
        .expect("Collection failed");

    assert_eq!(collection.summary.total, 5);
    assert_eq!(collection.summary.total_pages, 3);
    assert_eq!(collection.summary.pages_fetched, 3);
    assert_eq!(collection.summary.records_received, 5);
    assert!(collection.summary.is_complete());

    let order: Vec<&str> = collection.result.iter().map(|r| r.identity()).collect();
    assert_eq!(order, vec!["0xb", "0xc", "0xa", "0xd"]);

    // First-seen copy of 0xa wins even though a later page ranks it higher
    let first = collection.result.get("0xa").expect("0xa missing");
    assert_eq!(first.rank, 0.2);
    assert_eq!(first.tags, vec!["smart_money".to_string()]);
}

#[tokio::test]
async fn test_requests_carry_paging_parameters() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/rank"))
        .and(query_param("pageNo", "1"))
        .and(query_param("pageSize", "20"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(create_test_page(1, &[("0xa", 0.5)])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let collection = create_test_collector(0)
        .collect(&create_test_descriptor(&mock_server, 20))
        .await
        .expect("Collection failed");
    assert_eq!(collection.result.len(), 1);

    let requests = mock_server.received_requests().await.expect("Recording disabled");
    let query = requests[0].url.query().unwrap_or_default().to_string();
    assert!(query.contains("t="), "missing freshness token in {}", query);
}

#[tokio::test]
async fn test_collect_json_inside_challenge_page() {
    let mock_server = MockServer::start().await;

    let document = create_test_page(2, &[("0xa", 0.3), ("0xb", 0.6)]);
    let html = format!(
        "<html><head><title>Just a moment</title></head><body><pre>{}</pre></body></html>",
        document
    );
    Mock::given(method("GET"))
        .and(path("/api/rank"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(html),
        )
        .mount(&mock_server)
        .await;

    let collection = create_test_collector(0)
        .collect(&create_test_descriptor(&mock_server, 50))
        .await
        .expect("Collection failed");

    let order: Vec<&str> = collection.result.iter().map(|r| r.identity()).collect();
    assert_eq!(order, vec!["0xb", "0xa"]);
}

#[tokio::test]
async fn test_unsolved_challenge_fails_discovery() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/rank"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>Checking your browser...</body></html>"),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    let result = create_test_collector(1)
        .collect(&create_test_descriptor(&mock_server, 50))
        .await;

    match result {
        Err(CollectionError::DiscoveryFailed { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected discovery failure, got {:?}", other.map(|c| c.summary)),
    }
}

#[tokio::test]
async fn test_server_error_loses_only_that_page() {
    let mock_server = MockServer::start().await;

    mount_page(&mock_server, 1, create_test_page(6, &[("0xa", 0.1), ("0xb", 0.2)])).await;
    Mock::given(method("GET"))
        .and(path("/api/rank"))
        .and(query_param("pageNo", "2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;
    mount_page(&mock_server, 3, create_test_page(6, &[("0xe", 0.5), ("0xf", 0.6)])).await;

    let collection = create_test_collector(2)
        .collect(&create_test_descriptor(&mock_server, 2))
        .await
        .expect("Collection failed");

    assert!(!collection.summary.is_complete());
    assert_eq!(collection.summary.pages_fetched, 2);
    assert_eq!(collection.summary.lost_pages.len(), 1);

    let lost = &collection.summary.lost_pages[0];
    assert_eq!(lost.page, 2);
    assert_eq!(lost.attempts, 3);
    assert!(lost.reason.contains("503"), "unexpected reason: {}", lost.reason);

    let order: Vec<&str> = collection.result.iter().map(|r| r.identity()).collect();
    assert_eq!(order, vec!["0xf", "0xe", "0xb", "0xa"]);
}

#[tokio::test]
async fn test_sweep_reports_only_new_records_on_second_run() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("sweep.db");

    mount_page(&mock_server, 1, create_test_page(3, &[("0xa", 0.4), ("0xb", 0.8)])).await;
    mount_page(&mock_server, 2, create_test_page(3, &[("0xc", 0.6)])).await;

    let toml = format!(
        r#"
[collector]
max-concurrency = 2
max-retries = 1
retry-delay-ms = 5

[output]
database-path = "{db}"
report-path = "{report}"

[[source]]
name = "ranking"
endpoint = "{uri}/api/rank"
partitions = ["501"]
partition-param = "chain"
page-size = 2

[source.layout]
rank = "score"
"#,
        db = db_path.display(),
        report = temp_dir.path().join("report.md").display(),
        uri = mock_server.uri(),
    );
    let config = parse_config(&toml).expect("Failed to parse config");

    let mut storage = SqliteStorage::new(&db_path).expect("Failed to open storage");
    let cancel = CancellationToken::new();

    let first = run_sweep(&config, "hash", &mut storage, &cancel)
        .await
        .expect("First sweep failed");
    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(first.new_records(), 3);
    assert!(first.is_complete());

    let second = run_sweep(&config, "hash", &mut storage, &cancel)
        .await
        .expect("Second sweep failed");
    assert_eq!(second.new_records(), 0);
    match &second.partitions[0].outcome {
        PartitionOutcome::Collected {
            summary,
            new_records,
        } => {
            assert_eq!(summary.unique_records, 3);
            assert_eq!(*new_records, Some(0));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    assert_eq!(storage.count_runs().unwrap(), 2);
    assert_eq!(storage.count_results(Some("ranking:501")).unwrap(), 3);

    let top = storage.top_results("ranking:501", 1).unwrap();
    assert_eq!(top[0].identity, "0xb");

    let requests = mock_server.received_requests().await.expect("Recording disabled");
    assert!(requests
        .iter()
        .all(|r| r.url.query().unwrap_or_default().contains("chain=501")));
}

#[tokio::test]
async fn test_rejected_parameters_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/rank"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = create_test_collector(3)
        .collect(&create_test_descriptor(&mock_server, 50))
        .await;

    assert!(matches!(result, Err(CollectionError::InvalidArgument(_))));
}
