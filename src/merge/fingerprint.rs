//! URL and name fingerprints used for duplicate detection

use std::collections::BTreeSet;
use url::Url;

/// Query parameters that only carry campaign/click tracking
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "mc_cid", "mc_eid", "ref", "ref_src", "igshid", "_hsenc",
    "_hsmi", "yclid",
];

fn is_tracking_param(segment: &str) -> bool {
    let name = segment.split('=').next().unwrap_or_default().to_ascii_lowercase();
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name.as_str())
}

/// Normalize an absolute http(s) URL into its stored form
///
/// Scheme and host are lowercased, default ports, userinfo, fragment, tracking
/// parameters and trailing slashes are removed, and the remaining query
/// parameters are sorted. Percent-encoding of path and query is preserved, so
/// normalizing a normalized URL returns it unchanged.
///
/// Returns `None` for anything that is not an absolute `http`/`https` URL.
pub fn normalize_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?;

    let mut normalized = format!("{}://{}", parsed.scheme(), host);
    // `port()` is None for the scheme's default port
    if let Some(port) = parsed.port() {
        normalized.push(':');
        normalized.push_str(&port.to_string());
    }
    normalized.push_str(parsed.path().trim_end_matches('/'));

    if let Some(query) = parsed.query() {
        let mut params: Vec<&str> = query
            .split('&')
            .filter(|segment| !segment.is_empty() && !is_tracking_param(segment))
            .collect();
        params.sort_unstable();
        if !params.is_empty() {
            normalized.push('?');
            normalized.push_str(&params.join("&"));
        }
    }

    Some(normalized)
}

/// Prefix scheme-less URLs (`www.example.com/x`) with `https://`
pub fn ensure_scheme(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Duplicate-detection key for a URL
///
/// Same as [`normalize_url`] with the path case-folded as well, so
/// `https://EXAMPLE.com/Cert/` and `https://example.com/cert` collide.
pub fn url_fingerprint(raw: &str) -> Option<String> {
    let normalized = normalize_url(raw)?;
    Some(match normalized.split_once('?') {
        Some((base, query)) => format!("{}?{}", base.to_lowercase(), query),
        None => normalized.to_lowercase(),
    })
}

/// Case, whitespace and punctuation folded token set of a name
pub fn name_tokens(name: &str) -> BTreeSet<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity of two token sets (0.0 when both are empty)
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Provider comparison key: exact up to case and surrounding whitespace
pub fn provider_key(provider: &str) -> String {
    provider.trim().to_lowercase()
}
