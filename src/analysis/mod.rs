/// Relevance analysis: topic matching and reference scoring.
///
/// Both stages share the embedding layer but degrade independently: a failed or
/// missing embedding backend drops the affected stage to its keyword scheme for
/// that call, never the whole run.

pub mod matcher;
pub mod reference;
pub mod topics;

pub use matcher::{keyword_match, MatchResult, SimilarityMatcher};
pub use reference::{RankedPaper, ReferenceScore, ReferenceScorer};
pub use topics::TopicDocument;
