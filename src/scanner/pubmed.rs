/// PubMed adapter (NCBI E-utilities)
///
/// Two calls make up one logical fetch: `esearch` returns the PMIDs published
/// within the lookback window (`reldate` + `datetype=pdat`, filtered server-side),
/// then `efetch` returns the full records as MEDLINE XML. The efetch document is
/// read with the streaming event reader because abstracts carry inline markup and
/// repeated labelled sections that do not map cleanly onto serde structs.

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

use super::{check_status, clean_text, Paper, PaperSource, SourceError};

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

pub const QUERY: &str = "(\"artificial intelligence\"[MeSH Terms] OR \"machine learning\"[MeSH Terms] \
OR \"neural networks, computer\"[MeSH Terms] OR \"large language model*\"[Title/Abstract]) AND hasabstract";

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    esearchresult: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

pub struct PubMedSource {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl PubMedSource {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        PubMedSource { client, api_key }
    }

    async fn search_ids(&self, days: u32, max_results: usize) -> Result<Vec<String>, SourceError> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", QUERY.to_string()),
            ("reldate", days.to_string()),
            ("datetype", "pdat".to_string()),
            ("retmax", max_results.to_string()),
            ("sort", "pub_date".to_string()),
            ("retmode", "json".to_string()),
        ];
        if let Some(ref key) = self.api_key {
            params.push(("api_key", key.clone()));
        }

        let response = self.client.get(ESEARCH_URL).query(&params).send().await?;
        let body = check_status(response).await?.text().await?;
        parse_search_ids(&body)
    }

    async fn fetch_records(&self, ids: &[String]) -> Result<String, SourceError> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
        ];
        if let Some(ref key) = self.api_key {
            params.push(("api_key", key.clone()));
        }

        let response = self.client.get(EFETCH_URL).query(&params).send().await?;
        Ok(check_status(response).await?.text().await?)
    }
}

#[async_trait]
impl PaperSource for PubMedSource {
    fn name(&self) -> &str {
        "pubmed"
    }

    async fn fetch_recent(&self, days: u32, max_results: usize) -> Result<Vec<Paper>, SourceError> {
        let ids = self.search_ids(days, max_results).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(count = ids.len(), "PubMed esearch returned ids");

        let xml = self.fetch_records(&ids).await?;
        let mut papers = parse_articles(&xml)?;
        papers.truncate(max_results);
        Ok(papers)
    }
}

pub(crate) fn parse_search_ids(body: &str) -> Result<Vec<String>, SourceError> {
    let envelope: SearchEnvelope = serde_json::from_str(body)?;
    Ok(envelope.esearchresult.idlist)
}

/// Accumulates one `<PubmedArticle>` while the reader walks it.
#[derive(Default)]
struct ArticleBuilder {
    pmid: String,
    title: String,
    abstract_parts: Vec<String>,
    authors: Vec<String>,
    last_name: String,
    fore_name: String,
    collective_name: String,
    article_date: DateParts,
    pub_date: DateParts,
    categories: Vec<String>,
}

#[derive(Default)]
struct DateParts {
    year: String,
    month: String,
    day: String,
}

impl DateParts {
    /// ISO date, or empty when year or month is missing.
    fn to_iso(&self) -> String {
        let Some(month) = month_number(&self.month) else {
            return String::new();
        };
        if self.year.len() != 4 {
            return String::new();
        }
        let day: u32 = self.day.trim().parse().unwrap_or(1);
        format!("{}-{:02}-{:02}", self.year, month, day)
    }
}

fn month_number(month: &str) -> Option<u32> {
    let month = month.trim();
    if let Ok(n) = month.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    const NAMES: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix: String = month.to_lowercase().chars().take(3).collect();
    NAMES.iter().position(|n| *n == prefix).map(|i| i as u32 + 1)
}

impl ArticleBuilder {
    fn finish_author(&mut self) {
        let name = if !self.collective_name.trim().is_empty() {
            clean_text(&self.collective_name)
        } else {
            clean_text(&format!("{} {}", self.fore_name, self.last_name))
        };
        if !name.is_empty() {
            self.authors.push(name);
        }
        self.last_name.clear();
        self.fore_name.clear();
        self.collective_name.clear();
    }

    fn build(self) -> Option<Paper> {
        let abstract_text = clean_text(&self.abstract_parts.join(" "));
        let title = clean_text(&self.title);
        if self.pmid.is_empty() || title.is_empty() || abstract_text.is_empty() {
            return None;
        }
        let published_date = match self.article_date.to_iso() {
            d if !d.is_empty() => d,
            _ => self.pub_date.to_iso(),
        };

        Some(Paper {
            id: format!("pubmed:{}", self.pmid),
            url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", self.pmid),
            title,
            abstract_text,
            authors: self.authors,
            source: "pubmed".to_string(),
            pdf_url: None,
            published_date,
            categories: self.categories.into_iter().collect(),
        })
    }
}

fn label_of(start: &BytesStart<'_>) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"Label")
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Parse an efetch `PubmedArticleSet` document.
pub(crate) fn parse_articles(xml: &str) -> Result<Vec<Paper>, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<ArticleBuilder> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                match name.as_str() {
                    "PubmedArticle" => current = Some(ArticleBuilder::default()),
                    "AbstractText" => {
                        if let (Some(article), Some(label)) = (current.as_mut(), label_of(&start)) {
                            article.abstract_parts.push(format!("{}:", label));
                        }
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::End(end) => {
                let name = end.name();
                match name.as_ref() {
                    b"PubmedArticle" => {
                        if let Some(paper) = current.take().and_then(ArticleBuilder::build) {
                            papers.push(paper);
                        }
                    }
                    b"Author" => {
                        if let Some(article) = current.as_mut() {
                            article.finish_author();
                        }
                    }
                    _ => {}
                }
                path.pop();
            }
            Event::Text(text) => {
                let Some(article) = current.as_mut() else {
                    continue;
                };
                let value = text.unescape()?;
                absorb_text(article, &path, &value);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(papers)
}

fn absorb_text(article: &mut ArticleBuilder, path: &[String], value: &str) {
    let Some(leaf) = path.last().map(String::as_str) else {
        return;
    };
    let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
    let inside = |name: &str| path.iter().any(|p| p == name);

    if leaf == "PMID" && parent == Some("MedlineCitation") {
        if article.pmid.is_empty() {
            article.pmid = value.trim().to_string();
        }
    } else if inside("ArticleTitle") {
        article.title.push(' ');
        article.title.push_str(value);
    } else if inside("AbstractText") {
        article.abstract_parts.push(value.to_string());
    } else if inside("Author") && inside("AuthorList") {
        match leaf {
            "LastName" => article.last_name = value.to_string(),
            "ForeName" => article.fore_name = value.to_string(),
            "CollectiveName" => article.collective_name.push_str(value),
            _ => {}
        }
    } else if inside("ArticleDate") {
        set_date_part(&mut article.article_date, leaf, value);
    } else if inside("PubDate") && inside("JournalIssue") {
        set_date_part(&mut article.pub_date, leaf, value);
    } else if (leaf == "DescriptorName" && inside("MeshHeading")) || (leaf == "Keyword" && inside("KeywordList")) {
        article.categories.push(clean_text(value));
    }
}

fn set_date_part(date: &mut DateParts, leaf: &str, value: &str) {
    match leaf {
        "Year" => date.year = value.trim().to_string(),
        "Month" => date.month = value.trim().to_string(),
        "Day" => date.day = value.trim().to_string(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EFETCH: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2025//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_250101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="PubMed-not-MEDLINE" Owner="NLM">
      <PMID Version="1">40012345</PMID>
      <Article PubModel="Print-Electronic">
        <Journal>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2025</Year><Month>Apr</Month></PubDate>
          </JournalIssue>
        </Journal>
        <ArticleTitle>Kappa gates for <i>clinical</i> decision support.</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Hallucination &amp; grounding matter.</AbstractText>
          <AbstractText Label="METHODS">We evaluate a <b>certification</b> layer.</AbstractText>
        </Abstract>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y"><LastName>Curie</LastName><ForeName>Marie</ForeName><Initials>M</Initials></Author>
          <Author ValidYN="Y"><CollectiveName>Safety Consortium</CollectiveName></Author>
        </AuthorList>
        <ArticleDate DateType="Electronic"><Year>2025</Year><Month>03</Month><Day>11</Day></ArticleDate>
      </Article>
      <MeshHeadingList>
        <MeshHeading><DescriptorName UI="D001185">Artificial Intelligence</DescriptorName></MeshHeading>
      </MeshHeadingList>
      <KeywordList Owner="NOTNLM"><Keyword>kappa</Keyword></KeywordList>
      <CommentsCorrectionsList>
        <CommentsCorrections RefType="Cites"><PMID Version="1">11111111</PMID></CommentsCorrections>
      </CommentsCorrectionsList>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">40099999</PMID>
      <Article>
        <Journal><JournalIssue><PubDate><Year>2025</Year><Month>Mar</Month><Day>2</Day></PubDate></JournalIssue></Journal>
        <ArticleTitle>No abstract for this one</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_articles() {
        let papers = parse_articles(EFETCH).unwrap();
        assert_eq!(papers.len(), 1);

        let p = &papers[0];
        assert_eq!(p.id, "pubmed:40012345");
        assert_eq!(p.url, "https://pubmed.ncbi.nlm.nih.gov/40012345/");
        assert_eq!(p.title, "Kappa gates for clinical decision support.");
        assert_eq!(
            p.abstract_text,
            "BACKGROUND: Hallucination & grounding matter. METHODS: We evaluate a certification layer."
        );
        assert_eq!(p.authors, vec!["Marie Curie", "Safety Consortium"]);
        assert_eq!(p.published_date, "2025-03-11");
        assert!(p.categories.contains("Artificial Intelligence"));
        assert!(p.categories.contains("kappa"));
        assert_eq!(p.source, "pubmed");
    }

    #[test]
    fn test_pub_date_fallback() {
        let date = DateParts {
            year: "2025".to_string(),
            month: "Mar".to_string(),
            day: String::new(),
        };
        assert_eq!(date.to_iso(), "2025-03-01");
        assert_eq!(DateParts::default().to_iso(), "");
    }

    #[test]
    fn test_month_number() {
        assert_eq!(month_number("03"), Some(3));
        assert_eq!(month_number("Dec"), Some(12));
        assert_eq!(month_number("13"), None);
        assert_eq!(month_number("Spring"), None);
    }

    #[test]
    fn test_parse_search_ids() {
        let body = r#"{"header": {"type": "esearch"}, "esearchresult": {"count": "2", "retmax": "2", "idlist": ["40012345", "40099999"]}}"#;
        assert_eq!(parse_search_ids(body).unwrap(), vec!["40012345", "40099999"]);
    }

    #[test]
    fn test_parse_search_ids_rejects_garbage() {
        assert!(matches!(parse_search_ids("<html>"), Err(SourceError::Parse(_))));
    }
}
