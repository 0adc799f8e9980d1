//! Configuration types for certkeeper
//!
//! A [`Config`] value is built once (defaults → optional JSON file → `CERTKEEPER_*`
//! environment → CLI flags) and threaded explicitly through the pipeline. Nothing
//! in the crate reads process-wide configuration state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// URL validator settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Maximum number of URL checks in flight at once (default: 20)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout for a single HTTP request (default: 20 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum redirects followed before a request fails (default: 10)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
        }
    }
}

/// Retry configuration for transient request failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the first attempt (default: 2)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (default: 500 ms)
    #[serde(default = "default_initial_delay", with = "duration_millis_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any single retry delay (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Per-host request limits shared by the validator and the scraper
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostLimitConfig {
    /// Maximum concurrent requests to one host (default: 4)
    #[serde(default = "default_max_concurrent_per_host")]
    pub max_concurrent_per_host: usize,

    /// Sustained requests per second to one host, 0 = unlimited (default: 2.0)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Requests allowed in a burst before the rate applies (default: 2)
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for HostLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_host: default_max_concurrent_per_host(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
        }
    }
}

/// Confirmed-dead removal policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Consecutive `Dead` runs before an entry is removed (default: 2)
    #[serde(default = "default_dead_threshold")]
    pub dead_threshold: u32,

    /// Name token-set Jaccard similarity at or above which a same-provider
    /// candidate counts as a duplicate (default: 0.8)
    #[serde(default = "default_name_similarity")]
    pub name_similarity: f64,

    /// Look for a working replacement URL before removing an entry (default: true)
    #[serde(default = "default_true")]
    pub repair_urls: bool,

    /// Known moves of catalog pages, old URL to new URL
    #[serde(default = "default_known_replacements")]
    pub known_replacements: BTreeMap<String, String>,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            dead_threshold: default_dead_threshold(),
            name_similarity: default_name_similarity(),
            repair_urls: true,
            known_replacements: default_known_replacements(),
        }
    }
}

/// One discovery source
///
/// Sources are pure data; `kind` selects the adapter from the
/// [`AdapterRegistry`](crate::discovery::AdapterRegistry).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Stable identifier recorded as candidate provenance
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Adapter kind ("listing" or "search")
    pub kind: String,

    /// Listing page URL (listing sources)
    #[serde(default)]
    pub url: Option<String>,

    /// Search queries (search sources)
    #[serde(default)]
    pub queries: Vec<String>,

    /// Fixed provider for every candidate (inferred from the URL when absent)
    #[serde(default)]
    pub provider: Option<String>,

    /// Fixed category for every candidate (inferred from keywords when absent)
    #[serde(default)]
    pub category: Option<String>,

    /// CSS selector matching candidate links (default: `a[href]`)
    #[serde(default)]
    pub link_selector: Option<String>,

    /// Whether the source is polled (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Discovery scraper settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Sources polled on every discover/maintain run
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,

    /// Maximum sources scraped concurrently (default: 4)
    #[serde(default = "default_source_concurrency")]
    pub concurrency: usize,

    /// Maximum links taken from one listing page (default: 50)
    #[serde(default = "default_max_links_per_page")]
    pub max_links_per_page: usize,

    /// Maximum results taken from one search results page (default: 10)
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,

    /// Candidates scoring below this confidence are rejected (default: 0.3)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Check candidate URLs before merging them (default: true)
    #[serde(default = "default_true")]
    pub verify_candidates: bool,

    /// HTML search endpoint used by search sources
    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            concurrency: default_source_concurrency(),
            max_links_per_page: default_max_links_per_page(),
            max_search_results: default_max_search_results(),
            min_confidence: default_min_confidence(),
            verify_candidates: true,
            search_endpoint: default_search_endpoint(),
        }
    }
}

/// Locations of every file the pipeline reads or replaces
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Canonical CSV dataset (default: "free_certifications.csv")
    #[serde(default = "default_csv_path")]
    pub csv: PathBuf,

    /// Derived JSON projection (default: "data/certifications.json")
    #[serde(default = "default_json_path")]
    pub json: PathBuf,

    /// Maintenance state sidecar (default: "data/maintenance_state.json")
    #[serde(default = "default_state_path")]
    pub state: PathBuf,

    /// Run report (default: "data/maintenance_report.json")
    #[serde(default = "default_report_path")]
    pub report: PathBuf,

    /// Markdown run summary (default: "data/MAINTENANCE_STATUS.md")
    #[serde(default = "default_summary_path")]
    pub summary: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            csv: default_csv_path(),
            json: default_json_path(),
            state: default_state_path(),
            report: default_report_path(),
            summary: default_summary_path(),
        }
    }
}

impl PathsConfig {
    /// All paths resolved under `root`, keeping the default layout
    pub fn under(root: &Path) -> Self {
        let defaults = Self::default();
        Self {
            csv: root.join(defaults.csv),
            json: root.join(defaults.json),
            state: root.join(defaults.state),
            report: root.join(defaults.report),
            summary: root.join(defaults.summary),
        }
    }
}

/// Main configuration for a pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// URL validator settings
    #[serde(default)]
    pub validator: ValidatorConfig,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-host limits
    #[serde(default)]
    pub host_limit: HostLimitConfig,

    /// Removal and duplicate thresholds
    #[serde(default)]
    pub removal: RemovalConfig,

    /// Discovery sources and heuristics
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Dataset, report and sidecar locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Overall run deadline (default: 15 minutes)
    #[serde(default = "default_run_deadline", with = "duration_serde")]
    pub run_deadline: Duration,

    /// Categories accepted in addition to the built-in taxonomy
    #[serde(default)]
    pub extra_categories: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validator: ValidatorConfig::default(),
            retry: RetryConfig::default(),
            host_limit: HostLimitConfig::default(),
            removal: RemovalConfig::default(),
            discovery: DiscoveryConfig::default(),
            paths: PathsConfig::default(),
            run_deadline: default_run_deadline(),
            extra_categories: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from an optional JSON file; missing fields take defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let config: Config = serde_json::from_str(&raw)?;
                tracing::debug!(path = %path.display(), "Loaded configuration file");
                Ok(config)
            }
            None => Ok(Config::default()),
        }
    }

    /// Apply `CERTKEEPER_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub(crate) fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CERTKEEPER_CONCURRENCY") {
            self.validator.concurrency = parse_var("CERTKEEPER_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("CERTKEEPER_TIMEOUT_SECS") {
            self.validator.request_timeout =
                Duration::from_secs(parse_var("CERTKEEPER_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("CERTKEEPER_RETRIES") {
            self.retry.max_retries = parse_var("CERTKEEPER_RETRIES", &v)?;
        }
        if let Some(v) = lookup("CERTKEEPER_HOST_RPS") {
            self.host_limit.requests_per_second = parse_var("CERTKEEPER_HOST_RPS", &v)?;
        }
        if let Some(v) = lookup("CERTKEEPER_HOST_CONCURRENCY") {
            self.host_limit.max_concurrent_per_host =
                parse_var("CERTKEEPER_HOST_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("CERTKEEPER_DEAD_THRESHOLD") {
            self.removal.dead_threshold = parse_var("CERTKEEPER_DEAD_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("CERTKEEPER_DEADLINE_SECS") {
            self.run_deadline = Duration::from_secs(parse_var("CERTKEEPER_DEADLINE_SECS", &v)?);
        }
        if let Some(v) = lookup("CERTKEEPER_DATA_DIR") {
            self.paths = PathsConfig::under(Path::new(&v));
        }
        Ok(())
    }

    /// Reject settings that would make a run meaningless or unsafe
    pub fn validate(&self) -> Result<()> {
        if self.validator.concurrency == 0 {
            return Err(Error::config(
                "validator.concurrency",
                "concurrency must be at least 1",
            ));
        }
        if self.discovery.concurrency == 0 {
            return Err(Error::config(
                "discovery.concurrency",
                "concurrency must be at least 1",
            ));
        }
        if self.host_limit.max_concurrent_per_host == 0 {
            return Err(Error::config(
                "host_limit.max_concurrent_per_host",
                "per-host concurrency must be at least 1",
            ));
        }
        if self.host_limit.requests_per_second < 0.0 {
            return Err(Error::config(
                "host_limit.requests_per_second",
                "rate must not be negative",
            ));
        }
        if self.removal.dead_threshold == 0 {
            return Err(Error::config(
                "removal.dead_threshold",
                "a threshold of 0 would remove entries that were never checked",
            ));
        }
        if !(0.0..=1.0).contains(&self.removal.name_similarity) {
            return Err(Error::config(
                "removal.name_similarity",
                "similarity must be within 0.0..=1.0",
            ));
        }
        if self.run_deadline.is_zero() {
            return Err(Error::config("run_deadline", "deadline must be positive"));
        }
        let mut seen = std::collections::HashSet::new();
        for source in &self.discovery.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(Error::config(
                    "discovery.sources",
                    format!("duplicate source id {:?}", source.id),
                ));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(key, format!("cannot parse {:?}", value)))
}

fn default_concurrency() -> usize {
    20
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_max_redirects() -> usize {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_per_host() -> usize {
    4
}

fn default_requests_per_second() -> f64 {
    2.0
}

fn default_burst() -> u32 {
    2
}

fn default_dead_threshold() -> u32 {
    2
}

fn default_name_similarity() -> f64 {
    0.8
}

fn default_known_replacements() -> BTreeMap<String, String> {
    [
        (
            "https://www.coursera.org/learn/project-management-basics",
            "https://www.coursera.org/learn/project-management",
        ),
        (
            "https://www.coursera.org/learn/ethics-modern-world",
            "https://www.coursera.org/learn/ethics",
        ),
        (
            "https://www.edx.org/course/introduction-to-computer-science",
            "https://www.edx.org/learn/computer-science",
        ),
    ]
    .into_iter()
    .map(|(old, new)| (old.to_string(), new.to_string()))
    .collect()
}

fn default_source_concurrency() -> usize {
    4
}

fn default_max_links_per_page() -> usize {
    50
}

fn default_max_search_results() -> usize {
    10
}

fn default_min_confidence() -> f64 {
    0.3
}

fn default_search_endpoint() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("free_certifications.csv")
}

fn default_json_path() -> PathBuf {
    PathBuf::from("data/certifications.json")
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/maintenance_state.json")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("data/maintenance_report.json")
}

fn default_summary_path() -> PathBuf {
    PathBuf::from("data/MAINTENANCE_STATUS.md")
}

fn default_run_deadline() -> Duration {
    Duration::from_secs(15 * 60)
}

fn listing(
    id: &str,
    name: &str,
    url: &str,
    category: &str,
    provider: &str,
    selector: &str,
) -> SourceConfig {
    SourceConfig {
        id: id.to_string(),
        name: name.to_string(),
        kind: "listing".to_string(),
        url: Some(url.to_string()),
        queries: Vec::new(),
        provider: Some(provider.to_string()),
        category: Some(category.to_string()),
        link_selector: Some(selector.to_string()),
        enabled: true,
    }
}

/// Built-in discovery sources
pub fn default_sources() -> Vec<SourceConfig> {
    const CLOUD: &str = "Cloud Computing";
    const PROGRAMMING: &str = "Programming & Development";
    const SECURITY: &str = "Cybersecurity & Information Security";
    const MARKETING: &str = "Digital Marketing & Social Media";
    const AI: &str = "AI & Machine Learning Engineering";

    let mut sources = vec![
        listing(
            "google-cloud-skills-boost",
            "Google Cloud Skills Boost",
            "https://www.cloudskillsboost.google/catalog?format[]=courses&free=true",
            CLOUD,
            "Google Cloud",
            r#"a[href*="/course_templates/"]"#,
        ),
        listing(
            "aws-skill-builder",
            "AWS Skill Builder Free",
            "https://explore.skillbuilder.aws/learn/catalog?ctldoc-catalog-0=se-%22Free%22",
            CLOUD,
            "Amazon Web Services",
            r#"a[href*="/learn/course/"]"#,
        ),
        listing(
            "microsoft-learn",
            "Microsoft Learn",
            "https://learn.microsoft.com/en-us/credentials/browse/?credential_types=certification",
            CLOUD,
            "Microsoft",
            r#"a[href*="/credentials/certifications/"]"#,
        ),
        listing(
            "ibm-badges",
            "IBM Skills",
            "https://www.ibm.com/training/badges",
            CLOUD,
            "IBM",
            r#"a[href*="credly.com"], a[href*="youracclaim.com"]"#,
        ),
        listing(
            "oracle-university",
            "Oracle University Free",
            "https://education.oracle.com/learning-explorer",
            CLOUD,
            "Oracle",
            r#"a[href*="oracle.com"]"#,
        ),
        listing(
            "coursera-free",
            "Coursera Free Certificates",
            "https://www.coursera.org/courses?query=free%20certificate&productTypeDescription=Free%20Courses",
            PROGRAMMING,
            "Coursera",
            r#"a[href*="/learn/"]"#,
        ),
        listing(
            "edx-free",
            "edX Free Courses",
            "https://www.edx.org/search?tab=course&price=Free",
            PROGRAMMING,
            "edX",
            r#"a[href*="/course/"], a[href*="/learn/"]"#,
        ),
        listing(
            "freecodecamp",
            "FreeCodeCamp",
            "https://www.freecodecamp.org/learn",
            PROGRAMMING,
            "freeCodeCamp",
            r#"a[href*="/learn/"]"#,
        ),
        listing(
            "cognitive-class",
            "Cognitive Class",
            "https://cognitiveclass.ai/courses",
            AI,
            "IBM",
            r#"a[href*="/courses/"]"#,
        ),
        listing(
            "great-learning",
            "Great Learning Free Courses",
            "https://www.mygreatlearning.com/academy/courses",
            PROGRAMMING,
            "Great Learning",
            r#"a[href*="/academy/"]"#,
        ),
        listing(
            "cisco-netacad",
            "Cisco Networking Academy",
            "https://www.netacad.com/courses/all-courses",
            SECURITY,
            "Cisco",
            r#"a[href*="/courses/"]"#,
        ),
        listing(
            "fortinet-training",
            "Fortinet Training",
            "https://training.fortinet.com/local/psc/",
            SECURITY,
            "Fortinet",
            r#"a[href*="training.fortinet.com"]"#,
        ),
        listing(
            "hubspot-academy",
            "HubSpot Academy",
            "https://academy.hubspot.com/courses",
            MARKETING,
            "HubSpot",
            r#"a[href*="/courses/"]"#,
        ),
        listing(
            "google-digital-garage",
            "Google Digital Garage",
            "https://learndigital.withgoogle.com/digitalgarage/courses",
            MARKETING,
            "Google",
            r#"a[href*="/course/"]"#,
        ),
        listing(
            "salesforce-trailhead",
            "Salesforce Trailhead",
            "https://trailhead.salesforce.com/credentials/certifications",
            CLOUD,
            "Salesforce",
            r#"a[href*="trailhead.salesforce.com"]"#,
        ),
    ];

    sources.push(SourceConfig {
        id: "web-search".to_string(),
        name: "Web search".to_string(),
        kind: "search".to_string(),
        url: None,
        queries: [
            "free IT certification 2024 2025",
            "free cloud certification AWS Azure GCP",
            "free cybersecurity certification",
            "free programming certificate online",
            "free data science certification",
            "free AI machine learning certificate",
            "free professional certification no cost",
            "free certification with badge credential",
            "vendor free certification program",
            "free tech certification exam",
        ]
        .iter()
        .map(|q| q.to_string())
        .collect(),
        provider: None,
        category: None,
        link_selector: None,
        enabled: true,
    });

    sources
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for sub-second retry delays)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
