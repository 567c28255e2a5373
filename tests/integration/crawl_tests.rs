//! Integration tests for the crawler
//!
//! These tests use wiremock to serve small OParl systems and run the full
//! crawl cycle end-to-end: probe, walkers, queue, workers and report.

use flate2::write::GzEncoder;
use flate2::Compression;
use oparl_validator::cache::Cache;
use oparl_validator::config::{Config, CrawlerConfig};
use oparl_validator::crawler::{build_http_client, DocumentFetcher, FetchError};
use oparl_validator::output::Progress;
use oparl_validator::{CrawlEngine, CrawlPhase, ValidatorError};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with fast backoff and no config file
fn create_test_config(recursive: bool) -> Config {
    let mut config = Config::default();
    config.crawler = CrawlerConfig {
        workers: 2,
        recursive,
        request_timeout_secs: 5,
        backoff_unit_ms: 5,
        backoff_max_ms: 20,
        ..CrawlerConfig::default()
    };
    config
}

fn engine(config: Config) -> CrawlEngine {
    CrawlEngine::new(config)
        .expect("bundled schemas load")
        .with_progress(Progress::silent())
}

fn gzip(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).unwrap();
    encoder.finish().unwrap()
}

/// A well-behaved OParl response: JSON, gzip-compressed
fn json_response(body: &Value) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "application/json")
        .insert_header("Content-Encoding", "gzip")
        .set_body_bytes(gzip(body.to_string().as_bytes()))
}

fn paper(base: &str, name: &str, related: &[&str]) -> Value {
    json!({
        "id": format!("{}/paper/{}", base, name),
        "type": "https://schema.oparl.org/1.0/Paper",
        "name": format!("Drucksache {}", name),
        "reference": format!("{}/2024", name),
        "date": "2024-03-01",
        "relatedPaper": related
            .iter()
            .map(|r| format!("{}/paper/{}", base, r))
            .collect::<Vec<_>>()
    })
}

fn empty_list() -> Value {
    json!({"data": [], "links": {}})
}

async fn mount_head(server: &MockServer, at: &str) {
    Mock::given(method("HEAD"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn mount_paper(server: &MockServer, name: &str, related: &[&str], expected_fetches: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/paper/{}", name)))
        .respond_with(json_response(&paper(&server.uri(), name, related)))
        .expect(expected_fetches)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_diamond_fetches_shared_target_once() {
    let server = MockServer::start().await;
    mount_head(&server, "/paper/a").await;
    mount_paper(&server, "a", &["b", "c"], 1).await;
    mount_paper(&server, "b", &["d"], 1).await;
    mount_paper(&server, "c", &["d"], 1).await;
    mount_paper(&server, "d", &[], 1).await;

    let engine = engine(create_test_config(true));
    let report = engine
        .run(&format!("{}/paper/a", server.uri()))
        .await
        .unwrap();

    assert_eq!(engine.phase(), CrawlPhase::Compiled);
    assert_eq!(report.counts.total, 4);
    assert_eq!(report.counts.failed, 0);
    assert_eq!(report.network.encodings, vec!["gzip".to_string()]);
    assert_eq!(report.network.tls, Some(false));
    assert!(report.network.average_latency_ms.is_some());
}

#[tokio::test]
async fn test_quota_admits_one_of_three_links() {
    let server = MockServer::start().await;
    mount_head(&server, "/paper/a").await;
    mount_paper(&server, "a", &["b", "c", "d"], 1).await;
    mount_paper(&server, "b", &[], 1).await;
    mount_paper(&server, "c", &[], 0).await;
    mount_paper(&server, "d", &[], 0).await;

    let mut config = create_test_config(true);
    config.crawler.max_documents = Some(1);
    let report = engine(config)
        .run(&format!("{}/paper/a", server.uri()))
        .await
        .unwrap();

    // The seed is exempt from the quota
    assert_eq!(report.counts.total, 2);
}

#[tokio::test]
async fn test_backpressure_loses_nothing() {
    let server = MockServer::start().await;
    let related: Vec<String> = (1..=20).map(|i| i.to_string()).collect();
    let related: Vec<&str> = related.iter().map(String::as_str).collect();

    mount_head(&server, "/paper/root").await;
    mount_paper(&server, "root", &related, 1).await;
    for name in &related {
        mount_paper(&server, name, &[], 1).await;
    }

    let mut config = create_test_config(true);
    config.crawler.queue_size = 1;
    config.crawler.workers = 1;
    let report = engine(config)
        .run(&format!("{}/paper/root", server.uri()))
        .await
        .unwrap();

    assert_eq!(report.counts.total, 21);
    assert_eq!(report.counts.valid, 21);
}

#[tokio::test]
async fn test_non_recursive_validates_seed_only() {
    let server = MockServer::start().await;
    mount_head(&server, "/paper/a").await;
    mount_paper(&server, "a", &["b"], 1).await;
    mount_paper(&server, "b", &[], 0).await;

    let report = engine(create_test_config(false))
        .run(&format!("{}/paper/a", server.uri()))
        .await
        .unwrap();

    assert_eq!(report.counts.total, 1);
}

/// Serves a system with two bodies; the second body's paper list is slow
///
/// Each body has two papers; the slow body's papers carry a custom
/// `x-slow` property so they can be told apart in the report.
async fn mount_system(server: &MockServer, structural_list_fetches: u64) {
    let base = server.uri();

    mount_head(server, "/").await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(json_response(&json!({
            "id": format!("{}/", base),
            "type": "https://schema.oparl.org/1.0/System",
            "oparlVersion": "https://schema.oparl.org/1.0/",
            "name": "Test system",
            "contactEmail": "ris@example.org",
            "website": "https://www.example.org/",
            "body": format!("{}/bodies", base)
        })))
        .expect(1)
        .mount(server)
        .await;

    let body = |n: u32| {
        json!({
            "id": format!("{}/body/{}", base, n),
            "type": "https://schema.oparl.org/1.0/Body",
            "name": format!("Body {}", n),
            "organization": format!("{}/b{}/organizations", base, n),
            "person": format!("{}/b{}/people", base, n),
            "meeting": format!("{}/b{}/meetings", base, n),
            "paper": format!("{}/b{}/papers", base, n),
            "legislativeTerm": []
        })
    };

    // Two pages of bodies
    Mock::given(method("GET"))
        .and(path("/bodies"))
        .respond_with(json_response(&json!({
            "data": [body(1)],
            "links": {"next": format!("{}/bodies/page2", base)}
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bodies/page2"))
        .respond_with(json_response(&json!({"data": [body(2)], "links": {}})))
        .expect(1)
        .mount(server)
        .await;

    for n in 1..=2 {
        for list in ["organizations", "people", "meetings"] {
            Mock::given(method("GET"))
                .and(path(format!("/b{}/{}", n, list)))
                .respond_with(json_response(&empty_list()))
                .expect(structural_list_fetches)
                .mount(server)
                .await;
        }
    }

    let fast_papers = json!({
        "data": [paper(&base, "1-1", &[]), paper(&base, "1-2", &[])],
        "links": {}
    });
    Mock::given(method("GET"))
        .and(path("/b1/papers"))
        .respond_with(json_response(&fast_papers))
        .expect(1)
        .mount(server)
        .await;

    let mut slow = vec![paper(&base, "2-1", &[]), paper(&base, "2-2", &[])];
    for item in &mut slow {
        item["x-slow"] = Value::Bool(true);
    }
    Mock::given(method("GET"))
        .and(path("/b2/papers"))
        .respond_with(
            json_response(&json!({"data": slow, "links": {}})).set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fan_out_waits_for_slow_walker() {
    let server = MockServer::start().await;
    mount_system(&server, 1).await;

    let report = engine(create_test_config(true))
        .run(&format!("{}/", server.uri()))
        .await
        .unwrap();

    // System, two bodies, four papers
    assert_eq!(report.counts.total, 7);
    assert_eq!(report.counts.failed, 0);

    let slow = report
        .messages_for("Paper")
        .iter()
        .find(|m| m.text == "Property 'x-slow' is not part of the schema")
        .expect("slow papers were validated");
    assert_eq!(slow.count, 2);
    assert_eq!(slow.affected_ids.len(), 2);
}

#[tokio::test]
async fn test_type_whitelist_skips_other_lists() {
    let server = MockServer::start().await;
    mount_system(&server, 0).await;

    let mut config = create_test_config(true);
    config.crawler.types = vec!["Paper".to_string()];
    let report = engine(config)
        .run(&format!("{}/", server.uri()))
        .await
        .unwrap();

    assert_eq!(report.counts.total, 7);
}

#[tokio::test]
async fn test_two_urls_serving_one_id_count_once() {
    let server = MockServer::start().await;
    mount_head(&server, "/paper/a").await;
    mount_paper(&server, "a", &["b", "legacy-b"], 1).await;
    mount_paper(&server, "b", &[], 1).await;
    Mock::given(method("GET"))
        .and(path("/paper/legacy-b"))
        .respond_with(json_response(&paper(&server.uri(), "b", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let report = engine(create_test_config(true))
        .run(&format!("{}/paper/a", server.uri()))
        .await
        .unwrap();

    assert_eq!(report.counts.total, 2);
    assert_eq!(report.counts.valid, 2);
    let mismatch = report
        .messages_for("Paper")
        .iter()
        .find(|m| m.text == "Document id differs from the URL it was retrieved from")
        .expect("id mismatch warning");
    assert_eq!(mismatch.count, 1);
    assert_eq!(mismatch.affected_ids, vec![format!("{}/paper/b", server.uri())]);
    // Every paper finding occurs once per affected document
    assert!(report
        .messages_for("Paper")
        .iter()
        .all(|m| m.count as usize == m.affected_ids.len()));
}

#[tokio::test]
async fn test_unreachable_seed_aborts() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let engine = engine(create_test_config(true));
    let result = engine.run(&format!("{}/", server.uri())).await;

    assert!(matches!(result, Err(ValidatorError::EndpointUnreachable { .. })));
    assert_eq!(engine.phase(), CrawlPhase::Compiled);
}

#[tokio::test]
async fn test_broken_link_is_fatal_but_crawl_continues() {
    let server = MockServer::start().await;
    mount_head(&server, "/paper/a").await;
    mount_paper(&server, "a", &["gone", "b"], 1).await;
    mount_paper(&server, "b", &[], 1).await;
    Mock::given(method("GET"))
        .and(path("/paper/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let report = engine(create_test_config(true))
        .run(&format!("{}/paper/a", server.uri()))
        .await
        .unwrap();

    assert_eq!(report.counts.total, 3);
    assert_eq!(report.counts.fatal, 1);
    assert_eq!(report.counts.valid, 2);
    let message = report
        .messages_for("Paper")
        .iter()
        .find(|m| m.text == "Document could not be retrieved: HTTP status 404")
        .expect("fatal message");
    assert_eq!(
        message.affected_ids,
        vec![format!("{}/paper/gone", server.uri())]
    );
}

#[tokio::test]
async fn test_uncompressed_response_is_an_error() {
    let server = MockServer::start().await;
    mount_head(&server, "/paper/a").await;
    Mock::given(method("GET"))
        .and(path("/paper/a"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(paper(&server.uri(), "a", &[])),
        )
        .mount(&server)
        .await;

    let report = engine(create_test_config(false))
        .run(&format!("{}/paper/a", server.uri()))
        .await
        .unwrap();

    assert_eq!(report.counts.failed, 1);
    assert!(report
        .messages_for("Paper")
        .iter()
        .any(|m| m.text == "Response is not compressed although 'gzip, deflate' was accepted"));
}

#[tokio::test]
async fn test_uncompressed_list_page_is_an_error() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_head(&server, "/").await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(json_response(&json!({
            "id": format!("{}/", base),
            "type": "https://schema.oparl.org/1.0/System",
            "oparlVersion": "https://schema.oparl.org/1.0/",
            "name": "Test system",
            "body": format!("{}/bodies", base)
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bodies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_list()))
        .expect(1)
        .mount(&server)
        .await;

    let report = engine(create_test_config(true))
        .run(&format!("{}/", base))
        .await
        .unwrap();

    let message = report
        .messages_for("List")
        .iter()
        .find(|m| m.text == "Response is not compressed although 'gzip, deflate' was accepted")
        .expect("list page compression error");
    assert_eq!(message.affected_ids, vec![format!("{}/bodies", base)]);
    // System and the list page
    assert_eq!(report.counts.total, 2);
    assert_eq!(report.counts.failed, 1);
}

#[tokio::test]
async fn test_cache_serves_second_fetch() {
    let server = MockServer::start().await;
    mount_paper(&server, "a", &[], 1).await;

    let client = build_http_client(&CrawlerConfig::default()).unwrap();
    let cache = Arc::new(Cache::in_memory("test"));
    let fetcher = DocumentFetcher::new(client, Arc::clone(&cache), Duration::from_secs(5));
    let url = format!("{}/paper/a", server.uri());

    let first = fetcher.fetch(&url).await.unwrap();
    let second = fetcher.fetch(&url).await.unwrap();

    assert_eq!(first.body, second.body);
    assert!(!first.http.from_cache);
    assert_eq!(first.http.content_encoding.as_deref(), Some("gzip"));
    assert!(second.http.from_cache);
    assert_eq!(second.http.status, 304);
    assert_eq!(cache.stats().hits, 1);
}

#[tokio::test]
async fn test_fetch_reports_status_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = build_http_client(&CrawlerConfig::default()).unwrap();
    let fetcher = DocumentFetcher::new(client, Arc::new(Cache::in_memory("test")), Duration::from_secs(5));
    let result = fetcher.fetch(&format!("{}/missing", server.uri())).await;

    assert!(matches!(result, Err(FetchError::Status { status: 500, .. })));
}
