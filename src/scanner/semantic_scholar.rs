/// Semantic Scholar adapter
///
/// Uses the Graph API paper search restricted to Computer Science, with the
/// publication-date range starting at the lookback cutoff. An API key is optional;
/// unauthenticated callers are rate limited aggressively and see HTTP 429.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use super::{check_status, clean_text, cutoff_date, within_window, Paper, PaperSource, SourceError};

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const FIELDS: &str = "paperId,title,abstract,authors,url,publicationDate,fieldsOfStudy,openAccessPdf";
const QUERY: &str = "machine learning | artificial intelligence | neural network";
const FIELDS_OF_STUDY: &str = "Computer Science";
/// The search endpoint caps `limit` at 100
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<S2Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    authors: Vec<S2Author>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    fields_of_study: Option<Vec<String>>,
    #[serde(default)]
    open_access_pdf: Option<S2Pdf>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Pdf {
    #[serde(default)]
    url: Option<String>,
}

pub struct SemanticScholarSource {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        SemanticScholarSource { client, api_key }
    }
}

#[async_trait]
impl PaperSource for SemanticScholarSource {
    fn name(&self) -> &str {
        "semantic_scholar"
    }

    async fn fetch_recent(&self, days: u32, max_results: usize) -> Result<Vec<Paper>, SourceError> {
        let cutoff = cutoff_date(days);
        let mut request = self
            .client
            .get(format!("{}/paper/search", BASE_URL))
            .query(&[
                ("query", QUERY.to_string()),
                ("fields", FIELDS.to_string()),
                ("limit", max_results.min(MAX_LIMIT).to_string()),
                ("fieldsOfStudy", FIELDS_OF_STUDY.to_string()),
                ("publicationDateOrYear", format!("{}:", cutoff.format("%Y-%m-%d"))),
            ]);
        if let Some(ref key) = self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        let body = check_status(response).await?.text().await?;

        parse_search(&body, cutoff)
    }
}

pub(crate) fn parse_search(body: &str, cutoff: NaiveDate) -> Result<Vec<Paper>, SourceError> {
    let response: SearchResponse = serde_json::from_str(body)?;

    let papers = response
        .data
        .into_iter()
        .filter_map(|item| {
            let abstract_text = item.abstract_text.filter(|a| !a.trim().is_empty())?;
            let title = item.title.map(|t| clean_text(&t)).filter(|t| !t.is_empty())?;
            let published_date = item.publication_date.unwrap_or_default();
            if !within_window(&published_date, cutoff) {
                return None;
            }

            Some(Paper {
                id: format!("s2:{}", item.paper_id),
                url: item
                    .url
                    .unwrap_or_else(|| format!("https://www.semanticscholar.org/paper/{}", item.paper_id)),
                title,
                abstract_text: abstract_text.trim().to_string(),
                authors: item.authors.into_iter().filter_map(|a| a.name).collect(),
                source: "semantic_scholar".to_string(),
                pdf_url: item.open_access_pdf.and_then(|p| p.url).filter(|u| !u.is_empty()),
                published_date,
                categories: item.fields_of_study.unwrap_or_default().into_iter().collect(),
            })
        })
        .collect();

    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
      "total": 3,
      "offset": 0,
      "data": [
        {
          "paperId": "abc123",
          "title": "Grounding Large Models",
          "abstract": "A study of hallucination and grounding.",
          "authors": [{"authorId": "1", "name": "Grace Hopper"}, {"authorId": null, "name": "Edsger Dijkstra"}],
          "url": "https://www.semanticscholar.org/paper/abc123",
          "publicationDate": "2025-03-11",
          "fieldsOfStudy": ["Computer Science"],
          "openAccessPdf": {"url": "https://example.org/abc.pdf", "status": "GREEN"}
        },
        {
          "paperId": "noabs",
          "title": "Missing Abstract",
          "abstract": null,
          "authors": [],
          "publicationDate": "2025-03-11"
        },
        {
          "paperId": "old",
          "title": "Stale",
          "abstract": "Published long ago.",
          "publicationDate": "2024-01-01",
          "fieldsOfStudy": null,
          "openAccessPdf": null
        },
        {
          "paperId": "nodate",
          "title": "Undated",
          "abstract": "Provider did not report a date.",
          "publicationDate": null
        }
      ]
    }"#;

    #[test]
    fn test_parse_search() {
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let papers = parse_search(BODY, cutoff).unwrap();
        let ids: Vec<&str> = papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["s2:abc123", "s2:nodate"]);

        let p = &papers[0];
        assert_eq!(p.authors, vec!["Grace Hopper", "Edsger Dijkstra"]);
        assert_eq!(p.pdf_url.as_deref(), Some("https://example.org/abc.pdf"));
        assert_eq!(p.source, "semantic_scholar");
        assert!(p.categories.contains("Computer Science"));

        let undated = &papers[1];
        assert_eq!(undated.published_date, "");
        assert_eq!(undated.url, "https://www.semanticscholar.org/paper/nodate");
    }

    #[test]
    fn test_parse_search_without_data() {
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert!(parse_search(r#"{"total": 0}"#, cutoff).unwrap().is_empty());
    }

    #[test]
    fn test_parse_search_invalid_json() {
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert!(matches!(parse_search("not json", cutoff), Err(SourceError::Parse(_))));
    }
}
