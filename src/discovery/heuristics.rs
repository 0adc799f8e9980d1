//! Heuristics applied to scraped links: title cleanup, provider and category
//! inference, and the free/paid confidence score

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::merge::collapse_whitespace;
use crate::taxonomy::title_case;

/// Words suggesting the offer is free
pub const FREE_INDICATORS: &[&str] = &[
    "free",
    "no cost",
    "complimentary",
    "$0",
    "at no charge",
    "free certification",
    "free course",
    "free training",
    "free badge",
    "free credential",
    "free exam",
];

/// Words suggesting the offer is paid
pub const PAID_INDICATORS: &[&str] = &[
    "paid",
    "purchase",
    "buy now",
    "enroll for $",
    "pricing",
    "subscription required",
    "premium",
    "pro plan",
];

/// Substrings of a title or URL that mark a certification-like page
pub const CERT_KEYWORDS: &[&str] = &["certif", "course", "training", "learn", "badge", "credential"];

const DEFAULT_CATEGORY: &str = "Programming & Development";

/// Known hosts and the provider they belong to
const PROVIDER_DOMAINS: &[(&str, &str)] = &[
    ("cloud.google.com", "Google Cloud"),
    ("aws.amazon.com", "Amazon Web Services"),
    ("coursera.org", "Coursera"),
    ("edx.org", "edX"),
    ("udemy.com", "Udemy"),
    ("linkedin.com", "LinkedIn Learning"),
    ("microsoft.com", "Microsoft"),
    ("google.com", "Google"),
    ("ibm.com", "IBM"),
    ("oracle.com", "Oracle"),
    ("cisco.com", "Cisco"),
    ("salesforce.com", "Salesforce"),
    ("hubspot.com", "HubSpot"),
    ("freecodecamp.org", "freeCodeCamp"),
    ("codecademy.com", "Codecademy"),
    ("futurelearn.com", "FutureLearn"),
    ("alison.com", "Alison"),
];

/// Keyword patterns in priority order; the first match decides the category
static CATEGORY_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\b(cloud|aws|azure|gcp)\b|google cloud", "Cloud Computing"),
        (r"\bcyber|\bsecurity\b", "Cybersecurity & Information Security"),
        (r"machine learning|\bai\b|\bartificial intelligence\b", "AI & Machine Learning Engineering"),
        (r"\bdata\b|\banalytics\b", "Data Science & Analytics"),
        (r"\b(python|java|javascript|web)\b", DEFAULT_CATEGORY),
    ]
    .into_iter()
    .filter_map(|(pattern, category)| Regex::new(pattern).ok().map(|re| (re, category)))
    .collect()
});

/// Collapse whitespace; reject titles shorter than 5 or longer than 200 characters
pub fn clean_title(raw: &str) -> Option<String> {
    let title = collapse_whitespace(raw);
    let len = title.chars().count();
    (5..=200).contains(&len).then_some(title)
}

/// Provider for a URL: the known-domain table, else the title-cased first host label
pub fn infer_provider(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    for (domain, provider) in PROVIDER_DOMAINS {
        if host == *domain || host.ends_with(&format!(".{domain}")) {
            return provider.to_string();
        }
    }
    let host = host.strip_prefix("www.").unwrap_or(host.as_str());
    match host.split('.').next() {
        Some(label) if !label.is_empty() => title_case(label),
        _ => "Unknown".to_string(),
    }
}

/// Category from title and snippet keywords
pub fn infer_category(title: &str, snippet: &str) -> &'static str {
    let text = format!("{} {}", title, snippet).to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(re, _)| re.is_match(&text))
        .map(|(_, category)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}

/// Whether the title or URL looks like a certification page
pub fn looks_like_certification(title: &str, url: &str) -> bool {
    let title = title.to_lowercase();
    let url = url.to_lowercase();
    CERT_KEYWORDS
        .iter()
        .any(|kw| title.contains(kw) || url.contains(kw))
}

/// Heuristic likelihood that a link is a free certification, in `0.0..=1.0`
///
/// Starts at 0.5; each free indicator adds 0.1, each paid indicator subtracts
/// 0.2, and a certification keyword adds 0.1.
pub fn confidence(title: &str, snippet: &str, url: &str) -> f64 {
    let text = format!("{} {}", title, snippet).to_lowercase();
    let free = FREE_INDICATORS.iter().filter(|i| text.contains(*i)).count();
    let paid = PAID_INDICATORS.iter().filter(|i| text.contains(*i)).count();

    let mut score = 0.5 + 0.1 * free as f64 - 0.2 * paid as f64;
    if looks_like_certification(title, url) {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}
