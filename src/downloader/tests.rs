//! Pipeline tests: worker pool, idempotency, retry cleanup, extraction,
//! and token rotation against mocked remote endpoints.

use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{Config, CredentialsConfig, ExtractConfig, RetryConfig};
use crate::types::Event;

use super::BulkDownloader;

fn token_body(token: &str, expires_in: u64) -> serde_json::Value {
    json!({
        "access_token": token,
        "token_type": "Bearer",
        "scope": "default",
        "expires_in": expires_in,
    })
}

async fn mount_token(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(token, 3600)))
        .mount(server)
        .await;
}

fn product_path(id: &str) -> String {
    format!("/data/collections/TEST/products/{id}")
}

fn test_config(server: &MockServer, output_dir: &Path) -> Config {
    let mut config = Config::default();
    config.credentials = CredentialsConfig {
        client_id: "test-id".to_string(),
        client_secret: "test-secret".to_string(),
    };
    config.endpoints.token_url = format!("{}/token", server.uri());
    config.endpoints.download_base = format!("{}/data", server.uri());
    config.collection = "TEST".to_string();
    config.output_dir = output_dir.to_path_buf();
    config.retry = RetryConfig {
        max_attempts: Some(3),
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

#[tokio::test]
async fn downloads_each_product_exactly_once_across_workers() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    for id in ["P1", "P2", "P3"] {
        Mock::given(method("GET"))
            .and(path(product_path(id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("data-{id}")))
            .expect(1)
            .mount(&server)
            .await;
    }

    let output = TempDir::new().unwrap();
    let mut config = test_config(&server, output.path());
    config.workers = 2;

    let downloader = BulkDownloader::new(config).unwrap();
    let summary = downloader
        .run_with_products(["P1", "P2", "P3"].map(String::from))
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 3);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 0);
    for id in ["P1", "P2", "P3"] {
        let archive = output.path().join(format!("{id}.zip"));
        assert_eq!(
            std::fs::read_to_string(&archive).unwrap(),
            format!("data-{id}")
        );
    }
}

#[tokio::test]
async fn single_worker_produces_the_same_files() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    for id in ["P1", "P2", "P3"] {
        Mock::given(method("GET"))
            .and(path(product_path(id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("data-{id}")))
            .expect(1)
            .mount(&server)
            .await;
    }

    let output = TempDir::new().unwrap();
    let config = test_config(&server, output.path());
    assert_eq!(config.workers, 1);

    let downloader = BulkDownloader::new(config).unwrap();
    let summary = downloader
        .run_with_products(["P1", "P2", "P3"].map(String::from))
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 3);
    for id in ["P1", "P2", "P3"] {
        assert!(output.path().join(format!("{id}.zip")).exists());
    }
}

#[tokio::test]
async fn blank_lines_in_input_file_are_ignored() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    for id in ["P1", "P2", "P3"] {
        Mock::given(method("GET"))
            .and(path(product_path(id)))
            .respond_with(ResponseTemplate::new(200).set_body_string("bytes"))
            .expect(1)
            .mount(&server)
            .await;
    }

    let output = TempDir::new().unwrap();
    let list_path = output.path().join("products.txt");
    std::fs::write(&list_path, "P1\nP2\n\nP3").unwrap();

    let mut config = test_config(&server, output.path());
    config.workers = 2;

    let downloader = BulkDownloader::new(config).unwrap();
    let summary = downloader.run(&list_path).await.unwrap();

    assert_eq!(summary.downloaded, 3);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn second_run_skips_without_touching_the_network() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    for id in ["P1", "P2"] {
        // Exactly one download per product across BOTH runs.
        Mock::given(method("GET"))
            .and(path(product_path(id)))
            .respond_with(ResponseTemplate::new(200).set_body_string("bytes"))
            .expect(1)
            .mount(&server)
            .await;
    }

    let output = TempDir::new().unwrap();
    let config = test_config(&server, output.path());
    let downloader = BulkDownloader::new(config).unwrap();

    let first = downloader
        .run_with_products(["P1", "P2"].map(String::from))
        .await
        .unwrap();
    assert_eq!(first.downloaded, 2);

    let second = downloader
        .run_with_products(["P1", "P2"].map(String::from))
        .await
        .unwrap();
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped, 2);
}

#[tokio::test]
async fn force_overwrite_replaces_existing_archive() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path(product_path("P1")))
        .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
        .expect(1)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    std::fs::write(output.path().join("P1.zip"), "stale").unwrap();

    let mut config = test_config(&server, output.path());
    config.force = true;

    let downloader = BulkDownloader::new(config).unwrap();
    let summary = downloader
        .run_with_products(["P1".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 1);
    assert_eq!(
        std::fs::read_to_string(output.path().join("P1.zip")).unwrap(),
        "fresh"
    );
}

#[tokio::test]
async fn existing_archive_prevents_any_network_call() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    Mock::given(method("GET"))
        .and(path(product_path("P1")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    std::fs::write(output.path().join("P1.zip"), "already here").unwrap();

    let config = test_config(&server, output.path());
    let downloader = BulkDownloader::new(config).unwrap();
    let summary = downloader
        .run_with_products(["P1".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(
        std::fs::read_to_string(output.path().join("P1.zip")).unwrap(),
        "already here"
    );
}

#[tokio::test]
async fn retry_recovers_after_server_error() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    // First attempt fails, second succeeds.
    Mock::given(method("GET"))
        .and(path(product_path("P1")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(product_path("P1")))
        .respond_with(ResponseTemplate::new(200).set_body_string("complete-content"))
        .expect(1)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let config = test_config(&server, output.path());

    let downloader = BulkDownloader::new(config).unwrap();
    let summary = downloader
        .run_with_products(["P1".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 1);
    assert_eq!(
        std::fs::read_to_string(output.path().join("P1.zip")).unwrap(),
        "complete-content"
    );
}

#[tokio::test]
async fn exhausted_retries_leave_no_partial_file() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    // A body is sent with the error status; no byte of it may survive.
    Mock::given(method("GET"))
        .and(path(product_path("P1")))
        .respond_with(ResponseTemplate::new(500).set_body_string("partial junk"))
        .expect(3)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let config = test_config(&server, output.path());

    let downloader = BulkDownloader::new(config).unwrap();
    let summary = downloader
        .run_with_products(["P1".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.downloaded, 0);
    assert!(
        !output.path().join("P1.zip").exists(),
        "no partial file may remain after the retry loop exits"
    );
}

#[tokio::test]
async fn worker_uses_rotated_token_on_later_attempts() {
    let server = MockServer::start().await;
    // Initial exchange hands out a short-lived token, the renewal a fresh one.
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t1", 1)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t2", 3600)))
        .mount(&server)
        .await;

    // The product endpoint rejects the stale token and accepts the renewed one.
    Mock::given(method("GET"))
        .and(path(product_path("P1")))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(product_path("P1")))
        .and(header("authorization", "Bearer t2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("bytes"))
        .expect(1)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let mut config = test_config(&server, output.path());
    // Renew immediately when the 1s validity window ends.
    config.refresh_margin = Duration::from_secs(0);
    // Keep retrying at a steady cadence until the rotation lands.
    config.retry = RetryConfig {
        max_attempts: Some(60),
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(100),
        backoff_multiplier: 1.0,
        jitter: false,
    };

    let downloader = BulkDownloader::new(config).unwrap();
    let summary = downloader
        .run_with_products(["P1".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 1, "rotated token should unblock the worker");
}

fn zip_bytes(members: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, contents) in members {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn extraction_writes_member_and_removes_archive() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    let archive = zip_bytes(&[("a.txt", "meta"), ("b.nat", "payload"), ("c.nat", "other")]);
    Mock::given(method("GET"))
        .and(path(product_path("P1")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .expect(1)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let extract_root = TempDir::new().unwrap();
    let mut config = test_config(&server, output.path());
    config.extract = Some(ExtractConfig {
        dir: extract_root.path().to_path_buf(),
        member_suffix: ".nat".to_string(),
    });

    let downloader = BulkDownloader::new(config).unwrap();
    let mut events = downloader.subscribe();
    let summary = downloader
        .run_with_products(["P1".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.downloaded, 1);
    let extracted = extract_root.path().join("P1").join("b.nat");
    assert_eq!(std::fs::read_to_string(&extracted).unwrap(), "payload");
    assert!(
        !extract_root.path().join("P1").join("c.nat").exists(),
        "only the first matching member is extracted"
    );
    assert!(
        !output.path().join("P1.zip").exists(),
        "archive is removed after successful extraction"
    );

    let mut saw_extracted = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::ProductExtracted { .. }) {
            saw_extracted = true;
        }
    }
    assert!(saw_extracted);
}

#[tokio::test]
async fn extraction_failure_is_terminal_and_not_retried() {
    let server = MockServer::start().await;
    mount_token(&server, "tok").await;
    // Downloads fine, but the body is not a readable archive.
    Mock::given(method("GET"))
        .and(path(product_path("P1")))
        .respond_with(ResponseTemplate::new(200).set_body_string("not a zip"))
        .expect(1)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let extract_root = TempDir::new().unwrap();
    let mut config = test_config(&server, output.path());
    config.extract = Some(ExtractConfig {
        dir: extract_root.path().to_path_buf(),
        member_suffix: ".nat".to_string(),
    });

    let downloader = BulkDownloader::new(config).unwrap();
    let summary = downloader
        .run_with_products(["P1".to_string()])
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.downloaded, 0);
    assert!(
        output.path().join("P1.zip").exists(),
        "archive stays on disk when extraction fails"
    );
}

#[tokio::test]
async fn startup_auth_failure_aborts_before_any_download() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(product_path("P1")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let config = test_config(&server, output.path());

    let downloader = BulkDownloader::new(config).unwrap();
    let err = downloader
        .run_with_products(["P1".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, crate::error::Error::Auth(_)));
    assert!(!output.path().join("P1.zip").exists());
}
