/// Paper sources: one adapter per external catalog, plus the fetch coordinator.
///
/// Every adapter implements `PaperSource` and turns a provider-specific response into
/// canonical `Paper` records. Adapters own their HTTP client, hold no shared mutable
/// state, and report failures as `SourceError`; the coordinator converts those into
/// "zero papers from this source".

pub mod arxiv;
pub mod biorxiv;
pub mod coordinator;
pub mod openalex;
pub mod pubmed;
pub mod semantic_scholar;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SourcesConfig;

pub use coordinator::{dedupe_by_title, FetchCoordinator, SourceReport};

/// Registration names of every available catalog, in default merge order.
pub const ALL_SOURCES: [&str; 6] = [
    "arxiv",
    "semantic_scholar",
    "openalex",
    "biorxiv",
    "medrxiv",
    "pubmed",
];

/// A discovered paper in source-agnostic form.
///
/// Constructed once by an adapter and never mutated afterwards. `id` is namespaced
/// as `<source>:<native-id>`; it is not a cross-source identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub source: String,
    pub url: String,
    pub pdf_url: Option<String>,
    /// ISO date (YYYY-MM-DD); empty when the provider does not report one
    pub published_date: String,
    pub categories: BTreeSet<String>,
}

impl Paper {
    /// Soft deduplication key: the first 50 characters of the lowercased title.
    pub fn title_key(&self) -> String {
        self.title.to_lowercase().chars().take(50).collect()
    }

    pub fn has_abstract(&self) -> bool {
        !self.abstract_text.trim().is_empty()
    }
}

/// Errors that can occur when fetching from a source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport failure, including timeouts
    #[error("Network error: {0}")]
    Network(String),

    /// Provider answered 429
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Provider answered with another non-success status
    #[error("HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    /// Malformed provider response (XML, JSON)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Adapter could not be constructed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::DeError> for SourceError {
    fn from(err: quick_xml::DeError) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(err: quick_xml::Error) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

/// Capability every catalog adapter provides.
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Short registration name, also used as the id namespace (e.g. "arxiv")
    fn name(&self) -> &str;

    /// Fetch papers published within the last `days` days, at most `max_results`.
    ///
    /// Best-effort: records without an abstract are dropped silently.
    async fn fetch_recent(&self, days: u32, max_results: usize) -> Result<Vec<Paper>, SourceError>;
}

/// Build an HTTP client with the shared timeout and user agent.
pub fn build_http_client(config: &SourcesConfig) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.request_timeout_secs.min(10)))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| SourceError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Map a non-success response to the matching `SourceError`.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.as_u16() == 429 {
        return Err(SourceError::RateLimited);
    }
    let message = response
        .text()
        .await
        .map(|body| body.chars().take(200).collect())
        .unwrap_or_else(|_| "unreadable body".to_string());
    Err(SourceError::Http {
        status: status.as_u16(),
        message,
    })
}

/// Instantiate the adapters named in `config.enabled`, in that order.
pub fn build_sources(config: &SourcesConfig) -> Result<Vec<Arc<dyn PaperSource>>, SourceError> {
    let client = build_http_client(config)?;
    let mut sources: Vec<Arc<dyn PaperSource>> = Vec::with_capacity(config.enabled.len());

    for name in &config.enabled {
        let source: Arc<dyn PaperSource> = match name.as_str() {
            "arxiv" => Arc::new(arxiv::ArxivSource::new(client.clone())),
            "semantic_scholar" => Arc::new(semantic_scholar::SemanticScholarSource::new(
                client.clone(),
                config.semantic_scholar_api_key.clone(),
            )),
            "openalex" => Arc::new(openalex::OpenAlexSource::new(
                client.clone(),
                config.openalex_mailto.clone(),
            )),
            "biorxiv" => Arc::new(biorxiv::RxivSource::biorxiv(client.clone())),
            "medrxiv" => Arc::new(biorxiv::RxivSource::medrxiv(client.clone())),
            "pubmed" => Arc::new(pubmed::PubMedSource::new(
                client.clone(),
                config.pubmed_api_key.clone(),
            )),
            other => {
                return Err(SourceError::Config(format!("unknown source '{}'", other)));
            }
        };
        sources.push(source);
    }

    Ok(sources)
}

/// Earliest publication date inside a lookback window of `days` days.
pub fn cutoff_date(days: u32) -> NaiveDate {
    (Utc::now() - chrono::Duration::days(i64::from(days))).date_naive()
}

/// Whether an ISO date string falls on or after `cutoff`.
///
/// Dates that cannot be parsed are kept: the provider already filtered on its side
/// or did not report a date, and dropping the paper would lose it silently.
pub fn within_window(date: &str, cutoff: NaiveDate) -> bool {
    match parse_iso_date(date) {
        Some(d) => d >= cutoff,
        None => true,
    }
}

/// Parse the date part of an ISO-8601 date or timestamp.
pub fn parse_iso_date(date: &str) -> Option<NaiveDate> {
    let head: String = date.trim().chars().take(10).collect();
    NaiveDate::parse_from_str(&head, "%Y-%m-%d").ok()
}

/// Collapse internal whitespace (feeds wrap titles across lines).
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(title: &str) -> Paper {
        Paper {
            id: "x:1".to_string(),
            title: title.to_string(),
            abstract_text: "text".to_string(),
            authors: vec![],
            source: "x".to_string(),
            url: String::new(),
            pdf_url: None,
            published_date: String::new(),
            categories: BTreeSet::new(),
        }
    }

    #[test]
    fn test_title_key_is_lowercase_prefix() {
        let p = paper("A VERY Long Title That Keeps Going Well Beyond Fifty Characters In Length");
        let key = p.title_key();
        assert_eq!(key.chars().count(), 50);
        assert_eq!(key, "a very long title that keeps going well beyond fif");
    }

    #[test]
    fn test_title_key_short_title() {
        assert_eq!(paper("Short").title_key(), "short");
    }

    #[test]
    fn test_within_window() {
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert!(within_window("2025-03-10", cutoff));
        assert!(within_window("2025-03-11T08:00:00Z", cutoff));
        assert!(!within_window("2025-03-09", cutoff));
        // unparseable or missing dates are kept
        assert!(within_window("", cutoff));
        assert!(within_window("2025", cutoff));
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Deep\n   Learning\tfor  X "), "Deep Learning for X");
    }

    #[test]
    fn test_build_sources_preserves_order() {
        let config = SourcesConfig {
            enabled: vec!["pubmed".to_string(), "arxiv".to_string()],
            ..SourcesConfig::default()
        };
        let sources = build_sources(&config).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["pubmed", "arxiv"]);
    }

    #[test]
    fn test_build_sources_all_defaults() {
        let sources = build_sources(&SourcesConfig::default()).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, ALL_SOURCES.to_vec());
    }

    #[test]
    fn test_build_sources_rejects_unknown() {
        let config = SourcesConfig {
            enabled: vec!["scopus".to_string()],
            ..SourcesConfig::default()
        };
        assert!(matches!(build_sources(&config), Err(SourceError::Config(_))));
    }
}
