/// Output rendering for the final shortlist.
///
/// The pipeline hands a renderer a finite, ordered list of `EnrichedPaper` records
/// (already truncated to top-N) and gets back the paths it wrote. Formatting beyond
/// that is the renderer's business.

pub mod json;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::RankedPaper;
use crate::certification::CertificationResult;
use crate::scanner::Paper;

pub use json::JsonRenderer;

const MAX_SLUG_CHARS: usize = 60;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A shortlisted paper with every score and its per-paper certification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPaper {
    #[serde(flatten)]
    pub paper: Paper,
    pub topic_similarity: f64,
    pub reference_similarity: f64,
    pub combined_score: f64,
    pub matched_topics: Vec<String>,
    pub overlapping_concepts: Vec<String>,
    pub certification: CertificationResult,
}

impl EnrichedPaper {
    pub fn new(ranked: &RankedPaper, certification: CertificationResult) -> Self {
        EnrichedPaper {
            paper: ranked.paper.clone(),
            topic_similarity: ranked.score.topic_similarity,
            reference_similarity: ranked.score.reference_similarity,
            combined_score: ranked.score.combined_score,
            matched_topics: ranked.topic.matched_topics.clone(),
            overlapping_concepts: ranked.score.overlapping_concepts.clone(),
            certification,
        }
    }

    pub fn slug(&self) -> String {
        let slug = slugify(&self.paper.title);
        if slug.is_empty() {
            slugify(&self.paper.id)
        } else {
            slug
        }
    }
}

#[async_trait]
pub trait Renderer: Send + Sync {
    fn name(&self) -> &str;

    /// Persist `papers` in order, returning one path per written document.
    async fn render(&self, papers: &[EnrichedPaper]) -> Result<Vec<PathBuf>, RenderError>;
}

/// URL-friendly slug: lowercase ASCII alphanumerics separated by single hyphens,
/// at most 60 characters.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug.truncate(MAX_SLUG_CHARS);
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Kappa Gates: A Study!"), "kappa-gates-a-study");
        assert_eq!(slugify("  --Multi-Agent   RL--  "), "multi-agent-rl");
        assert_eq!(slugify("Über große Modelle"), "ber-gro-e-modelle");
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn test_slugify_truncates_without_trailing_hyphen() {
        let title = format!("{} tail", "a".repeat(59));
        let slug = slugify(&title);
        assert_eq!(slug, "a".repeat(59));
        assert!(slugify(&"word ".repeat(40)).chars().count() <= 60);
    }
}
