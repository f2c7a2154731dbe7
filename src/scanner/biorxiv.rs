/// bioRxiv / medRxiv adapter
///
/// Both preprint servers share one API (`api.biorxiv.org/details/<server>/...`), so a
/// single adapter type serves both, registered twice with a different server. The
/// API pages by 100 records and filters by date interval; the category allow-list is
/// applied here. At most one follow-up page is fetched.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::{check_status, clean_text, cutoff_date, Paper, PaperSource, SourceError};

const BASE_URL: &str = "https://api.biorxiv.org/details";
const PAGE_SIZE: usize = 100;

pub const BIORXIV_CATEGORIES: [&str; 3] = ["bioinformatics", "systems biology", "synthetic biology"];
pub const MEDRXIV_CATEGORIES: [&str; 2] = ["health informatics", "epidemiology"];

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    collection: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Message {
    /// Reported as a string by the API, occasionally as a number
    #[serde(default)]
    total: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Record {
    doi: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(rename = "abstract", default)]
    abstract_text: String,
}

/// One page of parsed results plus the server's total record count.
#[derive(Debug)]
pub(crate) struct Page {
    pub papers: Vec<Paper>,
    pub total: usize,
    pub raw_count: usize,
}

pub struct RxivSource {
    client: reqwest::Client,
    server: &'static str,
    host: &'static str,
    categories: &'static [&'static str],
}

impl RxivSource {
    pub fn biorxiv(client: reqwest::Client) -> Self {
        RxivSource {
            client,
            server: "biorxiv",
            host: "www.biorxiv.org",
            categories: &BIORXIV_CATEGORIES,
        }
    }

    pub fn medrxiv(client: reqwest::Client) -> Self {
        RxivSource {
            client,
            server: "medrxiv",
            host: "www.medrxiv.org",
            categories: &MEDRXIV_CATEGORIES,
        }
    }

    async fn fetch_page(&self, from: NaiveDate, to: NaiveDate, cursor: usize) -> Result<Page, SourceError> {
        let url = format!(
            "{}/{}/{}/{}/{}/json",
            BASE_URL,
            self.server,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
            cursor
        );
        let response = self.client.get(url).send().await?;
        let body = check_status(response).await?.text().await?;
        self.parse_page(&body)
    }

    pub(crate) fn parse_page(&self, body: &str) -> Result<Page, SourceError> {
        let response: DetailsResponse = serde_json::from_str(body)?;

        let total = response
            .messages
            .first()
            .and_then(|m| m.total.as_ref())
            .and_then(|t| match t {
                serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .unwrap_or(0);
        let raw_count = response.collection.len();

        let papers = response
            .collection
            .into_iter()
            .filter(|r| !r.abstract_text.trim().is_empty())
            .filter(|r| {
                let category = r.category.trim().to_lowercase();
                self.categories.iter().any(|c| *c == category)
            })
            .map(|r| {
                let version = r.version.unwrap_or_else(|| "1".to_string());
                let landing = format!("https://{}/content/{}v{}", self.host, r.doi, version);
                Paper {
                    id: format!("{}:{}", self.server, r.doi),
                    title: clean_text(&r.title),
                    abstract_text: r.abstract_text.trim().to_string(),
                    authors: r
                        .authors
                        .split(';')
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(str::to_string)
                        .collect(),
                    source: self.server.to_string(),
                    pdf_url: Some(format!("{}.full.pdf", landing)),
                    url: landing,
                    published_date: r.date,
                    categories: std::iter::once(r.category.trim().to_lowercase()).collect(),
                }
            })
            .collect();

        Ok(Page {
            papers,
            total,
            raw_count,
        })
    }
}

#[async_trait]
impl PaperSource for RxivSource {
    fn name(&self) -> &str {
        self.server
    }

    async fn fetch_recent(&self, days: u32, max_results: usize) -> Result<Vec<Paper>, SourceError> {
        let from = cutoff_date(days);
        let to = Utc::now().date_naive();

        let first = self.fetch_page(from, to, 0).await?;
        let follow_up = needs_follow_up(&first, max_results);
        let mut papers = first.papers;

        if follow_up {
            let second = self.fetch_page(from, to, first.raw_count).await;
            papers = merge_follow_up(self.server, papers, second);
        }

        papers.truncate(max_results);
        Ok(papers)
    }
}

/// A second page is worth fetching only when the first was full and the server
/// reports more records than it returned.
fn needs_follow_up(first: &Page, max_results: usize) -> bool {
    first.papers.len() < max_results && first.total > first.raw_count && first.raw_count >= PAGE_SIZE
}

/// Append the follow-up page. A failed follow-up keeps the first page's papers.
fn merge_follow_up(server: &str, mut papers: Vec<Paper>, second: Result<Page, SourceError>) -> Vec<Paper> {
    match second {
        Ok(page) => papers.extend(page.papers),
        Err(e) => {
            tracing::warn!(source = server, kept = papers.len(), error = %e, "Follow-up page failed, keeping first page");
        }
    }
    papers
}
