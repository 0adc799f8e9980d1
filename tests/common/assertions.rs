//! Assertions over the files a run leaves behind

use certkeeper::RunReport;
use certkeeper::config::PathsConfig;

/// The persisted run report
pub fn read_report(paths: &PathsConfig) -> RunReport {
    let bytes = std::fs::read(&paths.report).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Certification names in CSV order
pub fn csv_names(paths: &PathsConfig) -> Vec<String> {
    let mut reader = csv::Reader::from_path(&paths.csv).unwrap();
    reader
        .records()
        .map(|record| record.unwrap()[1].to_string())
        .collect()
}

/// The persisted maintenance state as raw JSON
pub fn read_state(paths: &PathsConfig) -> serde_json::Value {
    let bytes = std::fs::read(&paths.state).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Consecutive dead count recorded for `url`
pub fn dead_count(paths: &PathsConfig, url: &str) -> Option<u64> {
    read_state(paths)["entries"]
        .as_array()
        .unwrap()
        .iter()
        .find(|record| record["url"] == url)
        .and_then(|record| record["consecutive_dead_count"].as_u64())
}
