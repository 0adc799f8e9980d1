//! Test configuration helpers

use certkeeper::config::{HostLimitConfig, PathsConfig};
use certkeeper::{Config, SourceConfig};
use std::path::Path;
use std::time::Duration;

/// Configuration with every file under `root`, no built-in sources and fast retries
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths = PathsConfig::under(root);
    config.discovery.sources = Vec::new();
    config.validator.request_timeout = Duration::from_secs(5);
    config.retry.max_retries = 1;
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.retry.jitter = false;
    config.host_limit = HostLimitConfig {
        max_concurrent_per_host: 8,
        requests_per_second: 0.0,
        burst: 1,
    };
    config.run_deadline = Duration::from_secs(30);
    config
}

/// Listing source over a mock catalog page, with fixed provider and category
pub fn listing_source(id: &str, url: String) -> SourceConfig {
    SourceConfig {
        id: id.to_string(),
        name: id.to_string(),
        kind: "listing".to_string(),
        url: Some(url),
        queries: Vec::new(),
        provider: Some("Acme".to_string()),
        category: Some("Cloud Computing".to_string()),
        link_selector: Some(r#"a[href*="/course/"]"#.to_string()),
        enabled: true,
    }
}
