//! Store and merge scenarios without network access

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use certkeeper::config::PathsConfig;
use certkeeper::error::CheckErrorKind;
use certkeeper::taxonomy::Taxonomy;
use certkeeper::{
    CheckStatus, DatasetStore, DiscoveryCandidate, EntryId, MergePolicy, RejectReason,
    ValidationOutcome, merge,
};
use chrono::Utc;
use pretty_assertions::assert_eq;
use tempfile::{TempDir, tempdir};

const HEADER: &str =
    "Category,Certification_Name,Provider,URL,Description,Duration,Level,Prerequisites,Expiration\r\n";

fn store_with(dir: &TempDir, rows: &str, state: Option<&str>) -> DatasetStore {
    let paths = PathsConfig::under(dir.path());
    std::fs::write(&paths.csv, format!("{HEADER}{rows}")).unwrap();
    if let Some(state) = state {
        std::fs::create_dir_all(paths.state.parent().unwrap()).unwrap();
        std::fs::write(&paths.state, state).unwrap();
    }
    DatasetStore::new(paths, Taxonomy::default())
}

fn outcome(id: u64, url: &str, status: CheckStatus, http_code: Option<u16>) -> ValidationOutcome {
    ValidationOutcome {
        entry_id: EntryId(id),
        url: url.to_string(),
        status,
        http_code,
        error: None,
        attempt_count: 1,
        timestamp: Utc::now(),
    }
}

fn candidate(name: &str, provider: &str, url: &str) -> DiscoveryCandidate {
    DiscoveryCandidate {
        name: name.to_string(),
        provider: provider.to_string(),
        url: url.to_string(),
        description: String::new(),
        category: Some("Cloud Computing".to_string()),
        source_id: "manual".to_string(),
        confidence: 0.8,
    }
}

#[test]
fn test_entry_already_dead_once_is_removed_on_second_404() {
    let dir = tempdir().unwrap();
    let store = store_with(
        &dir,
        "Cloud Computing,Cert A,X Org,https://x.org/a,,,,,\r\n\
         Cloud Computing,Cert B,X Org,https://x.org/b,,,,,\r\n",
        Some(
            r#"{"next_id": 3, "entries": [
                {"id": 1, "url": "https://x.org/a", "consecutive_dead_count": 1},
                {"id": 2, "url": "https://x.org/b"}
            ]}"#,
        ),
    );
    let dataset = store.load().unwrap();
    assert_eq!(dataset.entries[0].consecutive_dead_count, 1);

    let outcomes = vec![
        outcome(1, "https://x.org/a", CheckStatus::Dead, Some(404)),
        outcome(2, "https://x.org/b", CheckStatus::Valid, Some(200)),
    ];
    let result = merge(dataset, &outcomes, &[], &MergePolicy::default());

    assert_eq!(result.removed.len(), 1);
    assert_eq!(result.removed[0].entry.id, EntryId(1));
    assert_eq!(result.removed[0].entry.consecutive_dead_count, 2);
    assert_eq!(result.removed[0].http_code, Some(404));

    store.replace(&result.dataset, Utc::now()).unwrap();
    let reloaded = store.load().unwrap();
    let ids: Vec<u64> = reloaded.entries.iter().map(|e| e.id.get()).collect();
    assert_eq!(ids, vec![2]);
    assert_eq!(reloaded.next_id, 3);
}

#[test]
fn test_same_name_and_provider_is_rejected_and_dataset_unchanged() {
    let dir = tempdir().unwrap();
    let store = store_with(
        &dir,
        "Cloud Computing,Google Cloud Digital Leader,Google Cloud,https://cloud.google.com/learn/digital-leader,,,,,\r\n",
        None,
    );
    let dataset = store.load().unwrap();

    let candidates = vec![candidate(
        "Google Cloud  Digital-Leader",
        " google cloud ",
        "https://www.cloudskillsboost.google/paths/9",
    )];
    let result = merge(dataset.clone(), &[], &candidates, &MergePolicy::default());

    assert!(result.added.is_empty());
    assert_eq!(result.dataset, dataset);
    assert!(matches!(
        result.rejected[0].reason,
        RejectReason::DuplicateName { existing_id: EntryId(1) }
    ));
}

#[test]
fn test_same_url_in_different_case_is_rejected() {
    let dir = tempdir().unwrap();
    let store = store_with(
        &dir,
        "Cloud Computing,Cert,Example,https://example.com/cert,,,,,\r\n",
        None,
    );
    let dataset = store.load().unwrap();

    let candidates = vec![candidate("Another Name", "Other", "https://EXAMPLE.com/cert/")];
    let result = merge(dataset, &[], &candidates, &MergePolicy::default());

    assert!(result.added.is_empty());
    assert_eq!(
        result.rejected[0].reason,
        RejectReason::DuplicateUrl {
            existing_id: EntryId(1)
        }
    );
}

#[test]
fn test_candidate_missing_provider_is_rejected() {
    let dir = tempdir().unwrap();
    let store = store_with(&dir, "Cloud Computing,Cert,Example,https://example.com/cert,,,,,\r\n", None);
    let dataset = store.load().unwrap();

    let candidates = vec![candidate("Brand New Cert", "", "https://new.org/cert")];
    let result = merge(dataset, &[], &candidates, &MergePolicy::default());

    assert!(result.added.is_empty());
    assert_eq!(
        result.rejected[0].reason,
        RejectReason::MissingField {
            field: "provider".to_string()
        }
    );

    let json = serde_json::to_value(&result.rejected[0]).unwrap();
    assert_eq!(json["reason"], "missing_field");
    assert_eq!(json["field"], "provider");
    assert_eq!(json["url"], "https://new.org/cert");
}

#[test]
fn test_unreachable_reason_serializes_flat() {
    let reason = RejectReason::Unreachable {
        status: CheckStatus::Ambiguous,
        http_code: Some(503),
        error: Some(CheckErrorKind::ServerError),
    };
    let json = serde_json::to_value(&reason).unwrap();
    assert_eq!(json["reason"], "unreachable");
    assert_eq!(json["status"], "ambiguous");
    assert_eq!(json["error"], "server_error");
}
