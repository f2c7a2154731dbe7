/// Second-stage relevance against a single reference document.
///
/// The reference (usually a LaTeX paper) is reduced to plain text, truncated, and
/// embedded once through the hosted tier. Every paper also gets an unweighted
/// concept-overlap score over a fixed 16-term vocabulary, which stands in for the
/// embedding score whenever no reference embedding exists.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::matcher::MatchResult;
use crate::embedding::{cosine_similarity, truncate_chars, unit_score, Embedder};
use crate::scanner::Paper;

pub const CONCEPTS: [&str; 16] = [
    "representation",
    "solver",
    "compatibility",
    "kappa",
    "noise",
    "spurious",
    "relevance",
    "decomposition",
    "simplex",
    "certification",
    "multi-agent",
    "swarm",
    "hallucination",
    "alignment",
    "safety",
    "constraint",
];

const EMBEDDING_WEIGHT: f64 = 0.7;
const KEYWORD_WEIGHT: f64 = 0.3;
const REFERENCE_WEIGHT: f64 = 0.6;
const TOPIC_WEIGHT: f64 = 0.4;

/// Characters of reference or paper text sent to the embedding service
pub const MAX_TEXT_CHARS: usize = 8000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceScore {
    pub paper_id: String,
    pub paper_title: String,
    pub reference_similarity: f64,
    pub topic_similarity: f64,
    /// `0.6 * reference_similarity + 0.4 * topic_similarity`; the ranking key
    pub combined_score: f64,
    pub overlapping_concepts: Vec<String>,
}

/// A paper that survived both stages, with everything known about it.
#[derive(Debug, Clone)]
pub struct RankedPaper {
    pub paper: Paper,
    pub topic: MatchResult,
    pub score: ReferenceScore,
}

static LATEX_COMMAND_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+\{([^}]*)\}").expect("command-with-argument regex must compile"));
static LATEX_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+").expect("bare command regex must compile"));
static BRACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[{}]").expect("brace regex must compile"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex must compile"));

/// Strip LaTeX markup: `\cmd{x}` keeps `x`, bare commands and braces are dropped,
/// whitespace is collapsed.
pub fn strip_markup(raw: &str) -> String {
    let text = LATEX_COMMAND_ARG.replace_all(raw, "$1");
    let text = LATEX_COMMAND.replace_all(&text, "");
    let text = BRACES.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Fraction of `CONCEPTS` present in `text`, plus the hits in vocabulary order.
pub fn concept_overlap(text: &str) -> (f64, Vec<String>) {
    let lower = text.to_lowercase();
    let matched: Vec<String> = CONCEPTS
        .iter()
        .filter(|c| lower.contains(*c))
        .map(|c| c.to_string())
        .collect();
    (matched.len() as f64 / CONCEPTS.len() as f64, matched)
}

pub struct ReferenceScorer {
    text: String,
    embedding: Option<Vec<f32>>,
    embedder: Embedder,
}

impl ReferenceScorer {
    /// Load and embed the reference document.
    ///
    /// A missing path or unreadable file leaves the scorer with empty text, which
    /// means keyword-only scoring for the whole run.
    pub async fn load(path: Option<&Path>, embedder: Embedder) -> Self {
        let text = match path {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(raw) => truncate_chars(&strip_markup(&raw), MAX_TEXT_CHARS).to_string(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read reference document");
                    String::new()
                }
            },
            None => {
                tracing::warn!("No reference document configured, using keyword scoring only");
                String::new()
            }
        };
        Self::from_text(text, embedder).await
    }

    /// Build a scorer around already-normalized reference text.
    pub async fn from_text(text: String, embedder: Embedder) -> Self {
        let mut embedding = None;
        if let Some(provider) = embedder.provider.as_ref() {
            if !text.is_empty() {
                match provider.embed(truncate_chars(&text, MAX_TEXT_CHARS)).await {
                    Ok(vector) => embedding = Some(vector),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to embed reference document");
                    }
                }
            }
        }

        tracing::info!(
            chars = text.chars().count(),
            embedded = embedding.is_some(),
            "Reference scorer ready"
        );
        ReferenceScorer {
            text,
            embedding,
            embedder,
        }
    }

    pub fn reference_text(&self) -> &str {
        &self.text
    }

    pub fn has_reference_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    pub async fn score_paper(
        &self,
        paper_id: &str,
        title: &str,
        abstract_text: &str,
        topic_similarity: f64,
    ) -> ReferenceScore {
        let text = format!("{} {}", title, abstract_text);
        let (keyword_score, overlapping_concepts) = concept_overlap(&text);

        let embed_score = match (&self.embedding, &self.embedder.provider) {
            (Some(reference), Some(provider)) => {
                match provider.embed(truncate_chars(&text, MAX_TEXT_CHARS)).await {
                    Ok(vector) => unit_score(cosine_similarity(&vector, reference)),
                    Err(e) => {
                        tracing::warn!(paper_id, error = %e, "Paper embedding failed, using keyword score");
                        keyword_score
                    }
                }
            }
            _ => keyword_score,
        };

        let topic_similarity = unit_score(topic_similarity);
        let reference_similarity =
            (EMBEDDING_WEIGHT * embed_score + KEYWORD_WEIGHT * keyword_score).clamp(0.0, 1.0);
        let combined_score =
            (REFERENCE_WEIGHT * reference_similarity + TOPIC_WEIGHT * topic_similarity).clamp(0.0, 1.0);

        ReferenceScore {
            paper_id: paper_id.to_string(),
            paper_title: title.to_string(),
            reference_similarity,
            topic_similarity,
            combined_score,
            overlapping_concepts,
        }
    }

    /// Score the candidates, drop those under `min_reference_score`, and sort by
    /// combined score, best first. Ties keep their input order.
    pub async fn rank_candidates(
        &self,
        candidates: Vec<(Paper, MatchResult)>,
        min_reference_score: f64,
    ) -> Vec<RankedPaper> {
        let mut ranked = Vec::with_capacity(candidates.len());
        for (paper, topic) in candidates {
            let score = self
                .score_paper(&paper.id, &paper.title, &paper.abstract_text, topic.similarity_score)
                .await;
            if score.reference_similarity >= min_reference_score {
                ranked.push(RankedPaper { paper, topic, score });
            }
        }
        ranked.sort_by(|a, b| b.score.combined_score.total_cmp(&a.score.combined_score));
        ranked
    }

    /// Scores only, in ranking order.
    pub async fn rank_papers(
        &self,
        candidates: &[(Paper, MatchResult)],
        min_reference_score: f64,
    ) -> Vec<ReferenceScore> {
        self.rank_candidates(candidates.to_vec(), min_reference_score)
            .await
            .into_iter()
            .map(|r| r.score)
            .collect()
    }
}
