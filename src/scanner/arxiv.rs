/// arXiv adapter
///
/// Queries the export API for the newest submissions in a fixed set of categories
/// and parses the Atom feed. The API has no date filter, so the lookback cutoff is
/// applied to each entry's `published` timestamp here.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use super::{check_status, clean_text, cutoff_date, within_window, Paper, PaperSource, SourceError};

const BASE_URL: &str = "https://export.arxiv.org/api/query";

/// Categories relevant to the topic corpus
pub const CATEGORIES: [&str; 5] = ["cs.AI", "cs.LG", "cs.CL", "cs.MA", "stat.ML"];

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: String,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
    #[serde(rename = "category", default)]
    categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(rename = "@term")]
    term: String,
}

pub struct ArxivSource {
    client: reqwest::Client,
}

impl ArxivSource {
    pub fn new(client: reqwest::Client) -> Self {
        ArxivSource { client }
    }

    fn search_query() -> String {
        let cats: Vec<String> = CATEGORIES.iter().map(|c| format!("cat:{}", c)).collect();
        format!("({})", cats.join(" OR "))
    }
}

#[async_trait]
impl PaperSource for ArxivSource {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn fetch_recent(&self, days: u32, max_results: usize) -> Result<Vec<Paper>, SourceError> {
        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("search_query", Self::search_query()),
                ("sortBy", "submittedDate".to_string()),
                ("sortOrder", "descending".to_string()),
                ("max_results", max_results.to_string()),
            ])
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;

        parse_feed(&body, cutoff_date(days))
    }
}

/// Parse an arXiv Atom feed into papers published on or after `cutoff`.
pub(crate) fn parse_feed(xml: &str, cutoff: NaiveDate) -> Result<Vec<Paper>, SourceError> {
    let feed: Feed = quick_xml::de::from_str(xml)?;

    let papers = feed
        .entries
        .into_iter()
        .filter(|e| within_window(&e.published, cutoff))
        .filter(|e| !e.summary.trim().is_empty())
        .filter(|e| !e.title.trim().is_empty())
        .map(|e| {
            let arxiv_id = e
                .id
                .rsplit("/abs/")
                .next()
                .unwrap_or(e.id.as_str())
                .trim()
                .to_string();
            Paper {
                id: format!("arxiv:{}", arxiv_id),
                title: clean_text(&e.title),
                abstract_text: e.summary.trim().to_string(),
                authors: e.authors.into_iter().map(|a| clean_text(&a.name)).collect(),
                source: "arxiv".to_string(),
                url: format!("https://arxiv.org/abs/{}", arxiv_id),
                pdf_url: Some(format!("https://arxiv.org/pdf/{}.pdf", arxiv_id)),
                published_date: e.published.chars().take(10).collect(),
                categories: e.categories.into_iter().map(|c| c.term).collect(),
            }
        })
        .collect();

    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query</title>
  <id>http://arxiv.org/api/abc</id>
  <updated>2025-03-12T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/2503.01234v1</id>
    <updated>2025-03-11T17:59:59Z</updated>
    <published>2025-03-11T17:59:59Z</published>
    <title>Solver Compatibility in
      Multi-Agent Systems</title>
    <summary>  We study representation &amp; solver compatibility.
    </summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/2503.01234v1" rel="alternate" type="text/html"/>
    <category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.MA" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2502.00001v2</id>
    <published>2025-02-01T10:00:00Z</published>
    <title>Old Paper</title>
    <summary>Too old to be included.</summary>
    <author><name>Someone</name></author>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2503.09999v1</id>
    <published>2025-03-11T09:00:00Z</published>
    <title>No Abstract</title>
    <summary></summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_maps_entries() {
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let papers = parse_feed(FEED, cutoff).unwrap();
        assert_eq!(papers.len(), 1);

        let p = &papers[0];
        assert_eq!(p.id, "arxiv:2503.01234v1");
        assert_eq!(p.title, "Solver Compatibility in Multi-Agent Systems");
        assert_eq!(p.abstract_text, "We study representation & solver compatibility.");
        assert_eq!(p.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(p.url, "https://arxiv.org/abs/2503.01234v1");
        assert_eq!(p.pdf_url.as_deref(), Some("https://arxiv.org/pdf/2503.01234v1.pdf"));
        assert_eq!(p.published_date, "2025-03-11");
        assert!(p.categories.contains("cs.AI"));
        assert!(p.categories.contains("cs.MA"));
    }

    #[test]
    fn test_entry_without_title_is_skipped() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/2503.00002v1</id>
    <published>2025-03-11T09:00:00Z</published>
    <summary>An entry the feed sent without a title.</summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2503.00003v1</id>
    <published>2025-03-11T09:00:00Z</published>
    <title>   </title>
    <summary>Blank title.</summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2503.00004v1</id>
    <published>2025-03-11T09:00:00Z</published>
    <title>Kappa Gates</title>
    <summary>Certified routing.</summary>
  </entry>
</feed>"#;
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let papers = parse_feed(xml, cutoff).unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].id, "arxiv:2503.00004v1");
    }

    #[test]
    fn test_parse_empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>Empty</title></feed>"#;
        let cutoff = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(parse_feed(xml, cutoff).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_feed_is_error() {
        let cutoff = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(matches!(
            parse_feed("<feed><entry><id>", cutoff),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn test_search_query_covers_categories() {
        let q = ArxivSource::search_query();
        assert!(q.starts_with("(cat:cs.AI OR "));
        assert!(q.ends_with("cat:stat.ML)"));
    }
}
