//! End-to-end pipeline runs against mock servers and a temporary dataset

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use certkeeper::{CheckStatus, Error, Pipeline, RejectReason, RunMode};
use common::*;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_second_confirmed_dead_check_removes_entry() {
    let server = MockServer::start().await;
    mount_status(&server, "/cert/cloud", 200).await;
    mount_status(&server, "/cert/serverless", 404).await;
    mount_status(&server, "/cert/web", 200).await;

    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let paths = config.paths.clone();
    write_dataset(&paths, &dataset_csv(&server.uri()));
    let pipeline = Pipeline::new(config).unwrap();
    let dead_url = format!("{}/cert/serverless", server.uri());

    let first = pipeline.run(RunMode::Maintain).await.unwrap();
    assert!(first.removed.is_empty());
    assert_eq!(first.dead, 1);
    assert_eq!(first.flagged.len(), 1);
    assert_eq!(first.flagged[0].consecutive_dead_count, 1);
    assert_eq!(dead_count(&paths, &dead_url), Some(1));
    assert_eq!(csv_names(&paths).len(), 3);

    let second = pipeline.run(RunMode::Maintain).await.unwrap();
    assert_eq!(second.removed.len(), 1);
    assert_eq!(second.removed[0].entry.name, "Serverless Fundamentals");
    assert_eq!(second.removed[0].http_code, Some(404));
    assert!(second.dataset_changed);
    assert_eq!(
        csv_names(&paths),
        vec!["Cloud Basics", "Responsive Web Design"]
    );

    // The removed id stays retired
    let state = read_state(&paths);
    assert_eq!(state["next_id"], 4);
    let ids: Vec<u64> = state["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 3]);

    let projection: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&paths.json).unwrap()).unwrap();
    assert_eq!(projection["metadata"]["total_certifications"], 2);

    let summary = std::fs::read_to_string(&paths.summary).unwrap();
    assert!(summary.contains("## Removed (1)"));
    assert_eq!(read_report(&paths), second);
}

#[tokio::test]
async fn test_dead_valid_alternation_never_removes() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let paths = config.paths.clone();
    write_dataset(&paths, &dataset_csv(&server.uri()));
    let pipeline = Pipeline::new(config).unwrap();

    for round in 0..4 {
        server.reset().await;
        mount_status(&server, "/cert/cloud", if round % 2 == 0 { 404 } else { 200 }).await;
        mount_status(&server, "/cert/serverless", 200).await;
        mount_status(&server, "/cert/web", 200).await;

        let report = pipeline.run(RunMode::Maintain).await.unwrap();
        assert!(report.removed.is_empty(), "round {round}");
    }
    assert_eq!(csv_names(&paths).len(), 3);
    assert_eq!(
        dead_count(&paths, &format!("{}/cert/cloud", server.uri())),
        Some(0)
    );
}

#[tokio::test]
async fn test_ambiguous_results_are_retained_and_reset_counter() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let paths = config.paths.clone();
    write_dataset(&paths, &dataset_csv(&server.uri()));
    let pipeline = Pipeline::new(config).unwrap();
    let url = format!("{}/cert/web", server.uri());

    for status in [404, 503, 404, 403, 404] {
        server.reset().await;
        mount_status(&server, "/cert/cloud", 200).await;
        mount_status(&server, "/cert/serverless", 200).await;
        mount_status(&server, "/cert/web", status).await;

        let report = pipeline.run(RunMode::Maintain).await.unwrap();
        assert!(report.removed.is_empty(), "status {status}");
    }
    assert_eq!(dead_count(&paths, &url), Some(1));
    let report = read_report(&paths);
    assert_eq!(report.flagged[0].status, CheckStatus::Dead);
}

#[tokio::test]
async fn test_unchanged_run_keeps_csv_byte_identical() {
    let server = MockServer::start().await;
    mount_all_valid(&server).await;

    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let paths = config.paths.clone();
    let csv = dataset_csv(&server.uri());
    write_dataset(&paths, &csv);

    let report = Pipeline::new(config)
        .unwrap()
        .run(RunMode::Maintain)
        .await
        .unwrap();

    assert_eq!(report.valid, 3);
    assert!(!report.dataset_changed);
    assert_eq!(std::fs::read(&paths.csv).unwrap(), csv.as_bytes());
    assert!(paths.state.exists());
    assert!(paths.json.exists());
    assert!(paths.report.exists());
}

#[tokio::test]
async fn test_validate_mode_never_removes() {
    let server = MockServer::start().await;
    mount_status(&server, "/cert/cloud", 410).await;
    mount_status(&server, "/cert/serverless", 200).await;
    mount_status(&server, "/cert/web", 200).await;

    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let paths = config.paths.clone();
    write_dataset(&paths, &dataset_csv(&server.uri()));
    let pipeline = Pipeline::new(config).unwrap();
    let url = format!("{}/cert/cloud", server.uri());

    for _ in 0..3 {
        let report = pipeline.run(RunMode::Validate).await.unwrap();
        assert!(report.removed.is_empty());
    }
    assert_eq!(dead_count(&paths, &url), Some(3));
    assert_eq!(csv_names(&paths).len(), 3);

    let report = pipeline.run(RunMode::Maintain).await.unwrap();
    assert_eq!(report.removed.len(), 1);
    assert_eq!(csv_names(&paths).len(), 2);
}

#[tokio::test]
async fn test_discovery_merges_new_and_rejects_duplicates() {
    let server = MockServer::start().await;
    mount_html(
        &server,
        "/catalog",
        r#"<html><body>
            <a href="/course/cloud-basics-v2">Cloud Basics</a>
            <a href="/course/k8s">Kubernetes Primer</a>
            <a href="/course/gone">Terraform Foundations</a>
            <a href="/cert/cloud?utm_source=catalog">Cloud Basics Again</a>
        </body></html>"#,
    )
    .await;
    mount_status(&server, "/course/k8s", 200).await;
    mount_status(&server, "/course/gone", 404).await;

    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    let mut source = listing_source("acme", format!("{}/catalog", server.uri()));
    source.link_selector = None;
    config.discovery.sources = vec![source];
    let paths = config.paths.clone();
    write_dataset(&paths, &dataset_csv(&server.uri()));

    let report = Pipeline::new(config)
        .unwrap()
        .run(RunMode::Discover)
        .await
        .unwrap();

    assert_eq!(report.total, 0, "discover mode does not validate");
    assert_eq!(report.added.len(), 1);
    assert_eq!(report.added[0].entry.name, "Kubernetes Primer");
    assert_eq!(report.added[0].entry.id.get(), 4);
    assert_eq!(report.added[0].source_id, "acme");

    let reasons: Vec<(&str, &RejectReason)> = report
        .rejected
        .iter()
        .map(|r| (r.candidate.name.as_str(), &r.reason))
        .collect();
    assert_eq!(reasons.len(), 3);
    assert!(matches!(
        reasons[0],
        ("Cloud Basics", RejectReason::DuplicateName { .. })
    ));
    assert!(matches!(
        reasons[1],
        ("Cloud Basics Again", RejectReason::DuplicateUrl { .. })
    ));
    assert!(matches!(
        reasons[2],
        (
            "Terraform Foundations",
            RejectReason::Unreachable {
                status: CheckStatus::Dead,
                http_code: Some(404),
                ..
            }
        )
    ));

    // Appended to the end of its category group, ahead of Web Development
    assert_eq!(
        csv_names(&paths),
        vec![
            "Cloud Basics",
            "Serverless Fundamentals",
            "Kubernetes Primer",
            "Responsive Web Design"
        ]
    );
    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].candidates, 4);
}

#[tokio::test]
async fn test_unavailable_source_is_not_fatal() {
    let server = MockServer::start().await;
    mount_all_valid(&server).await;
    mount_status(&server, "/catalog", 503).await;

    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.discovery.sources = vec![listing_source("acme", format!("{}/catalog", server.uri()))];
    let paths = config.paths.clone();
    write_dataset(&paths, &dataset_csv(&server.uri()));

    let report = Pipeline::new(config)
        .unwrap()
        .run(RunMode::Maintain)
        .await
        .unwrap();

    assert_eq!(report.valid, 3);
    assert_eq!(
        report.sources[0].outcome,
        certkeeper::SourceOutcome::Unavailable
    );
    assert!(report.added.is_empty());
}

#[tokio::test]
async fn test_deadline_aborts_without_writing() {
    let server = MockServer::start().await;
    Mock::given(path("/cert/cloud"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    mount_status(&server, "/cert/serverless", 200).await;
    mount_status(&server, "/cert/web", 200).await;

    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.run_deadline = Duration::from_millis(500);
    let paths = config.paths.clone();
    let csv = dataset_csv(&server.uri());
    write_dataset(&paths, &csv);

    let err = Pipeline::new(config)
        .unwrap()
        .run(RunMode::Maintain)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DeadlineExceeded { .. }));
    assert_eq!(std::fs::read(&paths.csv).unwrap(), csv.as_bytes());
    assert!(!paths.state.exists());
    assert!(!paths.json.exists());
    assert!(!paths.report.exists());
}

#[tokio::test]
async fn test_malformed_dataset_is_fatal_and_untouched() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let paths = config.paths.clone();
    let csv = "Category,Name,URL\r\nCloud Computing,X,https://x.org\r\n";
    write_dataset(&paths, csv);

    let err = Pipeline::new(config)
        .unwrap()
        .run(RunMode::Maintain)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DataIntegrity(_)));
    assert_eq!(std::fs::read_to_string(&paths.csv).unwrap(), csv);
    assert!(!paths.report.exists());
}

#[tokio::test]
async fn test_validation_and_discovery_run_concurrently() {
    let server = MockServer::start().await;
    for route in ["/cert/cloud", "/cert/serverless", "/cert/web"] {
        Mock::given(path(route))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(1)))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<a href="/course/k8s">Kubernetes Primer</a>"#)
                .set_delay(Duration::from_secs(1)),
        )
        .mount(&server)
        .await;
    mount_status(&server, "/course/k8s", 200).await;

    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    // Long enough for one slow round trip, too short for two in a row
    config.run_deadline = Duration::from_millis(1800);
    config.discovery.sources = vec![listing_source("acme", format!("{}/catalog", server.uri()))];
    write_dataset(&config.paths, &dataset_csv(&server.uri()));

    let started = Instant::now();
    let report = Pipeline::new(config)
        .unwrap()
        .run(RunMode::Maintain)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(1800));
    assert_eq!(report.valid, 3);
    assert_eq!(report.added.len(), 1);
    assert_eq!(report.added[0].entry.name, "Kubernetes Primer");
}

#[tokio::test]
async fn test_moved_page_is_repaired_instead_of_removed() {
    let server = MockServer::start().await;
    mount_status(&server, "/cert/cloud", 200).await;
    mount_status(&server, "/cert/serverless", 404).await;
    mount_status(&server, "/cert/serverless-v2", 200).await;
    mount_status(&server, "/cert/web", 200).await;

    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    let old_url = format!("{}/cert/serverless", server.uri());
    let new_url = format!("{}/cert/serverless-v2", server.uri());
    config.removal.known_replacements = BTreeMap::from([(old_url.clone(), new_url.clone())]);
    let paths = config.paths.clone();
    write_dataset(&paths, &dataset_csv(&server.uri()));
    let pipeline = Pipeline::new(config).unwrap();

    // Below the removal threshold nothing is looked up
    let first = pipeline.run(RunMode::Maintain).await.unwrap();
    assert!(first.repaired.is_empty());
    assert_eq!(dead_count(&paths, &old_url), Some(1));

    let second = pipeline.run(RunMode::Maintain).await.unwrap();
    assert!(second.removed.is_empty());
    assert_eq!(second.repaired.len(), 1);
    assert_eq!(second.repaired[0].entry_id.get(), 2);
    assert_eq!(second.repaired[0].old_url, old_url);
    assert_eq!(second.repaired[0].new_url, new_url);
    assert!(second.dataset_changed);
    assert!(second.flagged.is_empty());

    assert_eq!(csv_names(&paths).len(), 3);
    let csv = std::fs::read_to_string(&paths.csv).unwrap();
    assert!(csv.contains(&new_url));
    assert_eq!(dead_count(&paths, &new_url), Some(0));
    assert_eq!(dead_count(&paths, &old_url), None);

    let third = pipeline.run(RunMode::Maintain).await.unwrap();
    assert!(third.repaired.is_empty());
    assert!(!third.dataset_changed);
    assert_eq!(third.valid, 3);
}
