/// OpenAlex adapter
///
/// Filters works server-side by publication date and by a fixed set of concept ids.
/// OpenAlex does not ship abstracts as text; they arrive as an inverted index
/// (word -> positions) and are rebuilt here.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use super::{check_status, clean_text, cutoff_date, within_window, Paper, PaperSource, SourceError};

const BASE_URL: &str = "https://api.openalex.org/works";
/// `per-page` upper bound accepted by the API
const MAX_PER_PAGE: usize = 200;

/// Concept ids: Artificial intelligence, Machine learning, Natural language processing
pub const CONCEPTS: [&str; 3] = ["C154945302", "C119857082", "C204321447"];

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    #[serde(default)]
    primary_location: Option<Location>,
    #[serde(default)]
    best_oa_location: Option<Location>,
    #[serde(default)]
    concepts: Vec<Concept>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    #[serde(default)]
    author: Option<AuthorRef>,
}

#[derive(Debug, Deserialize)]
struct AuthorRef {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    landing_page_url: Option<String>,
    #[serde(default)]
    pdf_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Concept {
    display_name: String,
    #[serde(default)]
    level: Option<u32>,
}

pub struct OpenAlexSource {
    client: reqwest::Client,
    mailto: Option<String>,
}

impl OpenAlexSource {
    pub fn new(client: reqwest::Client, mailto: Option<String>) -> Self {
        OpenAlexSource { client, mailto }
    }

    fn filter(cutoff: NaiveDate) -> String {
        format!(
            "from_publication_date:{},concepts.id:{},has_abstract:true",
            cutoff.format("%Y-%m-%d"),
            CONCEPTS.join("|")
        )
    }
}

#[async_trait]
impl PaperSource for OpenAlexSource {
    fn name(&self) -> &str {
        "openalex"
    }

    async fn fetch_recent(&self, days: u32, max_results: usize) -> Result<Vec<Paper>, SourceError> {
        let cutoff = cutoff_date(days);
        let mut params = vec![
            ("filter", Self::filter(cutoff)),
            ("sort", "publication_date:desc".to_string()),
            ("per-page", max_results.min(MAX_PER_PAGE).to_string()),
        ];
        if let Some(ref mailto) = self.mailto {
            params.push(("mailto", mailto.clone()));
        }

        let response = self.client.get(BASE_URL).query(&params).send().await?;
        let body = check_status(response).await?.text().await?;

        parse_works(&body, cutoff)
    }
}

/// Rebuild abstract text from OpenAlex's inverted index.
pub(crate) fn rebuild_abstract(index: &HashMap<String, Vec<usize>>) -> String {
    let mut positions: BTreeMap<usize, &str> = BTreeMap::new();
    for (word, slots) in index {
        for &slot in slots {
            positions.insert(slot, word.as_str());
        }
    }
    positions.into_values().collect::<Vec<_>>().join(" ")
}

pub(crate) fn parse_works(body: &str, cutoff: NaiveDate) -> Result<Vec<Paper>, SourceError> {
    let response: WorksResponse = serde_json::from_str(body)?;

    let papers = response
        .results
        .into_iter()
        .filter_map(|work| {
            let abstract_text = work
                .abstract_inverted_index
                .as_ref()
                .map(rebuild_abstract)
                .filter(|a| !a.trim().is_empty())?;
            let title = work
                .display_name
                .or(work.title)
                .map(|t| clean_text(&t))
                .filter(|t| !t.is_empty())?;
            let published_date = work.publication_date.unwrap_or_default();
            if !within_window(&published_date, cutoff) {
                return None;
            }

            let native_id = work.id.rsplit('/').next().unwrap_or(work.id.as_str()).to_string();
            let url = work
                .primary_location
                .as_ref()
                .and_then(|l| l.landing_page_url.clone())
                .unwrap_or_else(|| work.id.clone());
            let pdf_url = work
                .best_oa_location
                .as_ref()
                .and_then(|l| l.pdf_url.clone())
                .or_else(|| work.primary_location.as_ref().and_then(|l| l.pdf_url.clone()));

            Some(Paper {
                id: format!("openalex:{}", native_id),
                title,
                abstract_text,
                authors: work
                    .authorships
                    .into_iter()
                    .filter_map(|a| a.author.and_then(|r| r.display_name))
                    .collect(),
                source: "openalex".to_string(),
                url,
                pdf_url,
                published_date,
                // concept levels 0 and 1 only
                categories: work
                    .concepts
                    .into_iter()
                    .filter(|c| c.level.map_or(true, |l| l <= 1))
                    .map(|c| c.display_name)
                    .collect(),
            })
        })
        .collect();

    Ok(papers)
}
