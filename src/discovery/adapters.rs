//! Source adapters
//!
//! An adapter turns a [`SourceConfig`] into listing URLs to fetch and turns a
//! fetched [`Page`] into candidates. The set of adapters is closed; sources pick
//! one by kind name through the [`AdapterRegistry`].

use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use url::Url;

use super::heuristics::{clean_title, confidence, infer_category, infer_provider, looks_like_certification};
use crate::config::SourceConfig;
use crate::error::DiscoveryError;
use crate::types::DiscoveryCandidate;

/// A fetched listing page
#[derive(Clone, Debug)]
pub struct Page {
    /// Final URL the body was fetched from
    pub url: Url,
    /// Response body
    pub body: String,
}

/// Caps applied while parsing a page
#[derive(Clone, Copy, Debug)]
pub struct ParseLimits {
    /// Links taken from one listing page
    pub max_links: usize,
    /// Results taken from one search results page
    pub max_results: usize,
}

/// Candidates and per-link problems found on one page
#[derive(Clone, Debug, Default)]
pub struct ParsedPage {
    /// Candidates in document order
    pub candidates: Vec<DiscoveryCandidate>,
    /// Links that could not be turned into candidates
    pub errors: Vec<String>,
}

/// The closed set of source adapters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adapter {
    /// Anchors selected from a catalog page
    Listing,
    /// Results of an HTML web search, one page per query
    Search,
}

impl Adapter {
    /// Kind name used in source configuration
    pub fn kind(&self) -> &'static str {
        match self {
            Adapter::Listing => "listing",
            Adapter::Search => "search",
        }
    }

    /// URLs to fetch for `source`
    pub fn enumerate_listings(
        &self,
        source: &SourceConfig,
        search_endpoint: &str,
    ) -> Result<Vec<Url>, DiscoveryError> {
        let parse_error = |reason: String| DiscoveryError::Parse {
            source_id: source.id.clone(),
            reason,
        };

        match self {
            Adapter::Listing => {
                let raw = source
                    .url
                    .as_deref()
                    .ok_or_else(|| parse_error("listing source has no url".to_string()))?;
                let url = Url::parse(raw).map_err(|e| parse_error(format!("{raw}: {e}")))?;
                Ok(vec![url])
            }
            Adapter::Search => {
                if source.queries.is_empty() {
                    return Err(parse_error("search source has no queries".to_string()));
                }
                let separator = if search_endpoint.contains('?') { '&' } else { '?' };
                source
                    .queries
                    .iter()
                    .map(|query| {
                        let raw = format!(
                            "{search_endpoint}{separator}q={}",
                            urlencoding::encode(query)
                        );
                        Url::parse(&raw).map_err(|e| parse_error(format!("{raw}: {e}")))
                    })
                    .collect()
            }
        }
    }

    /// Extract candidates from a fetched page
    ///
    /// Fails only when the page as a whole cannot be interpreted (e.g. the
    /// configured selector is invalid); individual bad links are collected in
    /// [`ParsedPage::errors`].
    pub fn parse_entry(
        &self,
        source: &SourceConfig,
        page: &Page,
        limits: ParseLimits,
    ) -> Result<ParsedPage, DiscoveryError> {
        match self {
            Adapter::Listing => parse_listing(source, page, limits.max_links),
            Adapter::Search => parse_search(source, page, limits.max_results),
        }
    }
}

/// Adapters by kind name
#[derive(Clone, Debug)]
pub struct AdapterRegistry {
    adapters: HashMap<&'static str, Adapter>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        let adapters = [Adapter::Listing, Adapter::Search]
            .into_iter()
            .map(|a| (a.kind(), a))
            .collect();
        Self { adapters }
    }
}

impl AdapterRegistry {
    /// Adapter registered for `kind`
    pub fn get(&self, kind: &str) -> Option<Adapter> {
        self.adapters.get(kind.trim()).copied()
    }

    /// Resolve the adapter of `source`
    pub fn resolve(&self, source: &SourceConfig) -> Result<Adapter, DiscoveryError> {
        self.get(&source.kind)
            .ok_or_else(|| DiscoveryError::UnknownAdapter {
                source_id: source.id.clone(),
                kind: source.kind.clone(),
            })
    }

    /// Registered kind names, sorted
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

fn selector(source: &SourceConfig, css: &str) -> Result<Selector, DiscoveryError> {
    Selector::parse(css).map_err(|e| DiscoveryError::Parse {
        source_id: source.id.clone(),
        reason: format!("invalid selector {css:?}: {e}"),
    })
}

/// Anchor title: visible text, then `title`, then `aria-label`
fn anchor_title(element: &ElementRef) -> String {
    let text = element.text().collect::<Vec<_>>().join(" ");
    if !text.trim().is_empty() {
        return text;
    }
    element
        .value()
        .attr("title")
        .filter(|t| !t.trim().is_empty())
        .or_else(|| element.value().attr("aria-label"))
        .unwrap_or_default()
        .to_string()
}

fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    base.join(href)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

fn build_candidate(
    source: &SourceConfig,
    url: &Url,
    title: String,
    snippet: String,
) -> DiscoveryCandidate {
    let provider = source
        .provider
        .clone()
        .unwrap_or_else(|| infer_provider(url));
    let category = source
        .category
        .clone()
        .unwrap_or_else(|| infer_category(&title, &snippet).to_string());
    DiscoveryCandidate {
        confidence: confidence(&title, &snippet, url.as_str()),
        name: title,
        provider,
        url: url.to_string(),
        description: snippet,
        category: Some(category),
        source_id: source.id.clone(),
    }
}

fn parse_listing(
    source: &SourceConfig,
    page: &Page,
    max_links: usize,
) -> Result<ParsedPage, DiscoveryError> {
    let css = source.link_selector.as_deref().unwrap_or("a[href]");
    let links = selector(source, css)?;
    let document = Html::parse_document(&page.body);

    let mut parsed = ParsedPage::default();
    for element in document.select(&links).take(max_links) {
        let href = element.value().attr("href").unwrap_or_default();
        let Some(url) = resolve_href(&page.url, href) else {
            parsed.errors.push(format!("unusable link {href:?}"));
            continue;
        };
        let raw_title = anchor_title(&element);
        let Some(title) = clean_title(&raw_title) else {
            parsed
                .errors
                .push(format!("{url}: no usable title in {:?}", raw_title.trim()));
            continue;
        };
        parsed
            .candidates
            .push(build_candidate(source, &url, title, String::new()));
    }
    Ok(parsed)
}

/// Target of a search result link, unwrapping `uddg=` redirects
fn unwrap_redirect(base: &Url, href: &str) -> Option<Url> {
    let resolved = base.join(href.trim()).ok()?;
    let target = resolved
        .query_pairs()
        .find(|(key, _)| key == "uddg")
        .and_then(|(_, value)| Url::parse(&value).ok())
        .unwrap_or(resolved);
    matches!(target.scheme(), "http" | "https").then_some(target)
}

fn parse_search(
    source: &SourceConfig,
    page: &Page,
    max_results: usize,
) -> Result<ParsedPage, DiscoveryError> {
    let results = selector(source, ".result")?;
    let title_link = selector(source, ".result__a")?;
    let snippet_sel = selector(source, ".result__snippet")?;
    let document = Html::parse_document(&page.body);

    let mut parsed = ParsedPage::default();
    for result in document.select(&results).take(max_results) {
        let Some(link) = result.select(&title_link).next() else {
            continue;
        };
        let href = link.value().attr("href").unwrap_or_default();
        let Some(url) = unwrap_redirect(&page.url, href) else {
            parsed.errors.push(format!("unusable result link {href:?}"));
            continue;
        };
        let raw_title = link.text().collect::<Vec<_>>().join(" ");
        let Some(title) = clean_title(&raw_title) else {
            parsed
                .errors
                .push(format!("{url}: no usable title in {:?}", raw_title.trim()));
            continue;
        };
        if !looks_like_certification(&title, url.as_str()) {
            continue;
        }
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(|s| crate::merge::collapse_whitespace(&s.text().collect::<String>()))
            .unwrap_or_default();
        parsed
            .candidates
            .push(build_candidate(source, &url, title, snippet));
    }
    Ok(parsed)
}
