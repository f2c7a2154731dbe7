/// Concurrent multi-source fetch with per-source failure isolation.
///
/// One tokio task per registered adapter; all are joined before anything is merged.
/// An adapter error or a panicking task contributes zero papers and a single warning
/// line. Results are concatenated in registration order, then deduplicated by the
/// title key, so on a collision the earlier-registered source wins.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::{Paper, PaperSource};

/// Outcome of one adapter within a fetch round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    pub fetched: usize,
    pub error: Option<String>,
}

impl SourceReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct FetchCoordinator {
    sources: Vec<Arc<dyn PaperSource>>,
}

impl FetchCoordinator {
    pub fn new(sources: Vec<Arc<dyn PaperSource>>) -> Self {
        FetchCoordinator { sources }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Fetch from every source and return the merged, deduplicated papers.
    pub async fn fetch_all(&self, days: u32, max_per_source: usize) -> Vec<Paper> {
        self.fetch_all_with_report(days, max_per_source).await.0
    }

    /// Like `fetch_all`, also returning one `SourceReport` per source in registration order.
    pub async fn fetch_all_with_report(&self, days: u32, max_per_source: usize) -> (Vec<Paper>, Vec<SourceReport>) {
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                tokio::spawn(async move { source.fetch_recent(days, max_per_source).await })
            })
            .collect();

        let outcomes = join_all(handles).await;

        let mut merged = Vec::new();
        let mut reports = Vec::with_capacity(outcomes.len());

        for (source, outcome) in self.sources.iter().zip(outcomes) {
            let name = source.name().to_string();
            match outcome {
                Ok(Ok(papers)) => {
                    tracing::info!(source = %name, count = papers.len(), "Fetched papers");
                    reports.push(SourceReport {
                        source: name,
                        fetched: papers.len(),
                        error: None,
                    });
                    merged.extend(papers);
                }
                Ok(Err(e)) => {
                    tracing::warn!(source = %name, error = %e, "Source fetch failed");
                    reports.push(SourceReport {
                        source: name,
                        fetched: 0,
                        error: Some(e.to_string()),
                    });
                }
                Err(join_err) => {
                    tracing::warn!(source = %name, error = %join_err, "Source task aborted");
                    reports.push(SourceReport {
                        source: name,
                        fetched: 0,
                        error: Some(format!("task failed: {}", join_err)),
                    });
                }
            }
        }

        let total = merged.len();
        let unique = dedupe_by_title(merged);
        tracing::info!(total, unique = unique.len(), "Merged source results");

        (unique, reports)
    }
}

/// Drop papers whose title key was already seen, keeping the first occurrence.
pub fn dedupe_by_title(papers: Vec<Paper>) -> Vec<Paper> {
    let mut seen = HashSet::new();
    papers
        .into_iter()
        .filter(|p| seen.insert(p.title_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;

    use super::*;
    use crate::scanner::SourceError;

    fn paper(source: &str, n: usize, title: &str) -> Paper {
        Paper {
            id: format!("{}:{}", source, n),
            title: title.to_string(),
            abstract_text: "An abstract.".to_string(),
            authors: vec![],
            source: source.to_string(),
            url: format!("https://example.org/{}/{}", source, n),
            pdf_url: None,
            published_date: "2025-03-11".to_string(),
            categories: BTreeSet::new(),
        }
    }

    struct FixedSource {
        name: &'static str,
        titles: Vec<&'static str>,
    }

    #[async_trait]
    impl PaperSource for FixedSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_recent(&self, _days: u32, max_results: usize) -> Result<Vec<Paper>, SourceError> {
            Ok(self
                .titles
                .iter()
                .enumerate()
                .take(max_results)
                .map(|(i, t)| paper(self.name, i, t))
                .collect())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl PaperSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch_recent(&self, _days: u32, _max: usize) -> Result<Vec<Paper>, SourceError> {
            Err(SourceError::RateLimited)
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl PaperSource for PanickingSource {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn fetch_recent(&self, _days: u32, _max: usize) -> Result<Vec<Paper>, SourceError> {
            panic!("adapter bug");
        }
    }

    struct SlowSource;

    #[async_trait]
    impl PaperSource for SlowSource {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch_recent(&self, _days: u32, _max: usize) -> Result<Vec<Paper>, SourceError> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(vec![paper("slow", 0, "Slow Paper")])
        }
    }

    #[tokio::test]
    async fn test_cross_source_dedup_keeps_first_registered() {
        let coordinator = FetchCoordinator::new(vec![
            Arc::new(FixedSource {
                name: "a",
                titles: vec!["Kappa Gates for Multi-Agent Systems"],
            }),
            Arc::new(FixedSource {
                name: "b",
                titles: vec!["KAPPA GATES FOR MULTI-AGENT SYSTEMS", "Another Paper"],
            }),
        ]);

        let papers = coordinator.fetch_all(1, 50).await;
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].source, "a");
        assert_eq!(papers[1].title, "Another Paper");
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let coordinator = FetchCoordinator::new(vec![
            Arc::new(FailingSource),
            Arc::new(PanickingSource),
            Arc::new(FixedSource {
                name: "ok",
                titles: vec!["Survivor"],
            }),
        ]);

        let (papers, reports) = coordinator.fetch_all_with_report(1, 50).await;
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].title, "Survivor");

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].source, "failing");
        assert!(!reports[0].is_ok());
        assert_eq!(reports[1].source, "panicking");
        assert!(reports[1].error.as_deref().unwrap_or_default().starts_with("task failed"));
        assert!(reports[2].is_ok());
        assert_eq!(reports[2].fetched, 1);
    }

    #[tokio::test]
    async fn test_merge_follows_registration_order_not_completion_order() {
        let coordinator = FetchCoordinator::new(vec![
            Arc::new(SlowSource),
            Arc::new(FixedSource {
                name: "fast",
                titles: vec!["Fast Paper"],
            }),
        ]);

        let papers = coordinator.fetch_all(1, 50).await;
        let sources: Vec<&str> = papers.iter().map(|p| p.source.as_str()).collect();
        assert_eq!(sources, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_all_sources_failing_yields_empty() {
        let coordinator = FetchCoordinator::new(vec![Arc::new(FailingSource)]);
        assert!(coordinator.fetch_all(1, 50).await.is_empty());
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let papers = vec![
            paper("a", 0, "Same Title"),
            paper("b", 0, "same title"),
            paper("c", 0, "Different"),
        ];
        let once = dedupe_by_title(papers);
        let twice = dedupe_by_title(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_dedupe_uses_fifty_char_prefix() {
        let base = "x".repeat(50);
        let papers = vec![
            paper("a", 0, &format!("{}-first-suffix", base)),
            paper("b", 0, &format!("{}-second-suffix", base)),
        ];
        assert_eq!(dedupe_by_title(papers).len(), 1);
    }
}
