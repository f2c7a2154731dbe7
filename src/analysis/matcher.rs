/// Topic matching: scores each paper against the curated topic corpus.
///
/// With topic embeddings available the score is the best cosine similarity between
/// the paper and any topic. Otherwise (keyword mode, empty corpus, or a failed
/// embedding call) a fixed weighted keyword table is used instead, and
/// `matched_topics` stays empty.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::topics::{load_corpus, TopicDocument};
use crate::embedding::{cosine_similarity, truncate_chars, unit_score, EmbedMode, Embedder};
use crate::errors::PipelineError;
use crate::scanner::Paper;

/// Keyword weights in hundredths. Summed as integers so that the score of a given
/// match set is exact; the total (101) is clamped to 100.
pub const KEYWORD_WEIGHTS: [(&str, u32); 10] = [
    ("representation", 15),
    ("solver", 15),
    ("compatibility", 15),
    ("kappa", 10),
    ("certification", 10),
    ("multi-agent", 10),
    ("hallucination", 8),
    ("grounding", 8),
    ("safety", 5),
    ("alignment", 5),
];

const MAX_MATCHED_TOPICS: usize = 3;
const MAX_EMBED_CHARS: usize = 8000;

/// Outcome of matching one paper against the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub paper_id: String,
    pub paper_title: String,
    /// Always within [0, 1]
    pub similarity_score: f64,
    /// Topic titles at or above the threshold, best first, at most three
    pub matched_topics: Vec<String>,
    pub top_keywords: Vec<String>,
    pub explanation: String,
}

/// Weighted keyword score of `text` (case-insensitive substring hits).
///
/// Matched keywords are returned in table order.
pub fn keyword_match(text: &str) -> (f64, Vec<String>) {
    let lower = text.to_lowercase();
    let mut total = 0u32;
    let mut matched = Vec::new();
    for (keyword, weight) in KEYWORD_WEIGHTS {
        if lower.contains(keyword) {
            total += weight;
            matched.push(keyword.to_string());
        }
    }
    (f64::from(total.min(100)) / 100.0, matched)
}

pub struct SimilarityMatcher {
    topics_dir: PathBuf,
    threshold: f64,
    embedder: Embedder,
    topics: Vec<TopicDocument>,
}

impl SimilarityMatcher {
    pub fn new(topics_dir: impl Into<PathBuf>, threshold: f64, embedder: Embedder) -> Self {
        SimilarityMatcher {
            topics_dir: topics_dir.into(),
            threshold: threshold.clamp(0.0, 1.0),
            embedder,
            topics: Vec::new(),
        }
    }

    pub fn mode(&self) -> EmbedMode {
        self.embedder.mode
    }

    /// Whether `match_paper` will take the embedding path.
    pub fn uses_embeddings(&self) -> bool {
        self.embedder.provider.is_some()
            && !self.topics.is_empty()
            && self.topics.iter().all(|t| t.embedding.is_some())
    }

    /// Load the corpus and, outside keyword mode, embed every topic once.
    ///
    /// Returns the number of topics loaded. Read and parse failures are errors; an
    /// embedding failure only leaves the corpus unembedded.
    pub async fn load_topics(&mut self) -> Result<usize, PipelineError> {
        self.topics = load_corpus(&self.topics_dir)?;

        if self.topics.is_empty() {
            tracing::warn!(dir = %self.topics_dir.display(), "Topic corpus is empty, using keyword matching");
            return Ok(0);
        }

        if let Some(provider) = self.embedder.provider.as_ref() {
            let texts: Vec<String> = self.topics.iter().map(TopicDocument::embedding_text).collect();
            match provider.embed_batch(&texts).await {
                Ok(vectors) if vectors.len() == self.topics.len() => {
                    for (topic, vector) in self.topics.iter_mut().zip(vectors) {
                        topic.embedding = Some(vector);
                    }
                }
                Ok(vectors) => {
                    tracing::warn!(
                        expected = self.topics.len(),
                        got = vectors.len(),
                        "Topic embedding count mismatch, using keyword matching"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to embed topics, using keyword matching");
                }
            }
        }

        tracing::info!(
            topics = self.topics.len(),
            mode = %self.embedder.mode,
            embedded = self.uses_embeddings(),
            "Loaded topic corpus"
        );
        Ok(self.topics.len())
    }

    /// Score one paper. `paper_id` is left empty; batch callers fill it in.
    pub async fn match_paper(&self, title: &str, abstract_text: &str) -> MatchResult {
        let text = format!("{}\n{}", title, abstract_text);

        if self.uses_embeddings() {
            if let Some(provider) = self.embedder.provider.as_ref() {
                match provider.embed(truncate_chars(&text, MAX_EMBED_CHARS)).await {
                    Ok(vector) => return self.embedding_result(title, &vector),
                    Err(e) => {
                        tracing::warn!(error = %e, title, "Paper embedding failed, using keyword matching");
                    }
                }
            }
        }

        keyword_result(title, &text)
    }

    fn embedding_result(&self, title: &str, vector: &[f32]) -> MatchResult {
        let mut similarities: Vec<(&str, f64)> = self
            .topics
            .iter()
            .filter_map(|t| {
                t.embedding
                    .as_ref()
                    .map(|e| (t.title.as_str(), unit_score(cosine_similarity(vector, e))))
            })
            .collect();
        similarities.sort_by(|a, b| b.1.total_cmp(&a.1));

        let (best_title, best_score) = similarities.first().copied().unwrap_or(("", 0.0));
        let matched_topics = similarities
            .iter()
            .filter(|(_, sim)| *sim >= self.threshold)
            .take(MAX_MATCHED_TOPICS)
            .map(|(t, _)| t.to_string())
            .collect();

        MatchResult {
            paper_id: String::new(),
            paper_title: title.to_string(),
            similarity_score: best_score,
            matched_topics,
            top_keywords: Vec::new(),
            explanation: format!("Best match: {} ({:.2})", best_title, best_score),
        }
    }

    /// Score every paper; results are sorted by score, best first (stable).
    pub async fn match_papers(&self, papers: &[Paper]) -> Vec<MatchResult> {
        let mut results = self.score_each(papers).await;
        results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        results
    }

    /// Keep papers whose score reaches `min_score`, in input order, each paired with
    /// its own result.
    pub async fn filter_relevant(&self, papers: Vec<Paper>, min_score: f64) -> Vec<(Paper, MatchResult)> {
        let results = self.score_each(&papers).await;
        papers
            .into_iter()
            .zip(results)
            .filter(|(_, result)| result.similarity_score >= min_score)
            .collect()
    }

    async fn score_each(&self, papers: &[Paper]) -> Vec<MatchResult> {
        let mut results = Vec::with_capacity(papers.len());
        for paper in papers {
            let mut result = self.match_paper(&paper.title, &paper.abstract_text).await;
            result.paper_id = paper.id.clone();
            results.push(result);
        }
        results
    }
}

fn keyword_result(title: &str, text: &str) -> MatchResult {
    let (score, keywords) = keyword_match(text);
    let explanation = if keywords.is_empty() {
        "No keyword matches".to_string()
    } else {
        format!("Keyword match: {}", keywords.join(", "))
    };
    MatchResult {
        paper_id: String::new(),
        paper_title: title.to_string(),
        similarity_score: score,
        matched_topics: Vec::new(),
        top_keywords: keywords,
        explanation,
    }
}
