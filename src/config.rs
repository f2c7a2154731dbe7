/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: paperscout.toml (in working directory)
/// 3. Conventional credential variables: OPENAI_API_KEY, SEMANTIC_SCHOLAR_API_KEY, SWARMIT_URL
/// 4. Environment variables: prefixed PAPERSCOUT_, nested with `__`
///    (e.g., PAPERSCOUT_PIPELINE__MIN_SCORE=0.6)
///
/// CLI flags are applied on top by the binary, then `validate()` runs before any
/// network activity.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for JSON log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub certification: CertificationConfig,
}

/// Embedding backends used by the matcher and the reference scorer.
///
/// A configured `openai_api_key` selects the hosted service. Without it the matcher
/// tries the local fastembed model (when `local_enabled`), then keyword matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible embeddings API
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Allow the local model tier (downloads weights on first use)
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Directory for cached local model weights
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Catalogs to query, in registration (merge) order
    #[serde(default = "default_enabled_sources")]
    pub enabled: Vec<String>,

    /// Per-request network timeout for every adapter
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub semantic_scholar_api_key: Option<String>,

    /// Contact address for the OpenAlex polite pool
    #[serde(default)]
    pub openalex_mailto: Option<String>,

    #[serde(default)]
    pub pubmed_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Lookback window in days
    #[serde(default = "default_days")]
    pub days: u32,

    #[serde(default = "default_max_per_source")]
    pub max_per_source: usize,

    /// Minimum topic-match score for a paper to reach the scoring stage
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    /// Minimum reference similarity for a paper to be ranked
    #[serde(default = "default_min_reference_score")]
    pub min_reference_score: f64,

    /// Similarity a topic must reach to be listed in `matched_topics`
    #[serde(default = "default_topic_threshold")]
    pub topic_threshold: f64,

    #[serde(default = "default_publish_top_n")]
    pub publish_top_n: usize,

    #[serde(default = "default_review_top_n")]
    pub review_top_n: usize,

    #[serde(default = "default_true")]
    pub generate_reviews: bool,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "default_topics_dir")]
    pub topics_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_review_output_dir")]
    pub review_output_dir: PathBuf,

    /// Reference document (LaTeX or plain text) for second-stage scoring
    #[serde(default)]
    pub reference_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificationConfig {
    /// Base URL of the certification sidecar. Unset means every gate passes.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_certification_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_cache_dir() -> String {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("paperscout")
        .join("models")
        .to_string_lossy()
        .into_owned()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_certification_timeout_secs() -> u64 {
    10
}

fn default_enabled_sources() -> Vec<String> {
    crate::scanner::ALL_SOURCES.iter().map(|s| s.to_string()).collect()
}

fn default_user_agent() -> String {
    format!("paperscout/{}", env!("CARGO_PKG_VERSION"))
}

fn default_days() -> u32 {
    1
}

fn default_max_per_source() -> usize {
    50
}

fn default_min_score() -> f64 {
    0.5
}

fn default_min_reference_score() -> f64 {
    0.3
}

fn default_topic_threshold() -> f64 {
    0.6
}

fn default_publish_top_n() -> usize {
    10
}

fn default_review_top_n() -> usize {
    5
}

fn default_topics_dir() -> PathBuf {
    PathBuf::from("content/topics")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("content/reviews")
}

fn default_review_output_dir() -> PathBuf {
    PathBuf::from("content/pdf-reviews")
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            openai_model: default_openai_model(),
            local_enabled: true,
            cache_dir: default_cache_dir(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        SourcesConfig {
            enabled: default_enabled_sources(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            semantic_scholar_api_key: None,
            openalex_mailto: None,
            pubmed_api_key: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            days: default_days(),
            max_per_source: default_max_per_source(),
            min_score: default_min_score(),
            min_reference_score: default_min_reference_score(),
            topic_threshold: default_topic_threshold(),
            publish_top_n: default_publish_top_n(),
            review_top_n: default_review_top_n(),
            generate_reviews: true,
            dry_run: false,
            topics_dir: default_topics_dir(),
            output_dir: default_output_dir(),
            review_output_dir: default_review_output_dir(),
            reference_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            embedding: EmbeddingConfig::default(),
            sources: SourcesConfig::default(),
            pipeline: PipelineConfig::default(),
            certification: CertificationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, the TOML file at `toml_path` (skipped when
    /// missing), and environment variables.
    pub fn load_from(toml_path: &Path) -> Result<Config, PipelineError> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::raw().filter_map(|key| {
                match key.as_str().to_ascii_uppercase().as_str() {
                    "OPENAI_API_KEY" => Some("embedding.openai_api_key".into()),
                    "SEMANTIC_SCHOLAR_API_KEY" => Some("sources.semantic_scholar_api_key".into()),
                    "SWARMIT_URL" => Some("certification.url".into()),
                    _ => None,
                }
            }))
            .merge(Env::prefixed("PAPERSCOUT_").split("__"))
            .extract()
            .map_err(|e| PipelineError::Config(format!("Failed to load config: {}", e)))
    }

    /// Reject configurations the pipeline cannot run with.
    ///
    /// Runs before any network activity so that a bad threshold or a missing
    /// corpus directory fails the process up front.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let p = &self.pipeline;

        for (field, value) in [
            ("pipeline.min_score", p.min_score),
            ("pipeline.min_reference_score", p.min_reference_score),
            ("pipeline.topic_threshold", p.topic_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::validation(
                    field,
                    &format!("must be within [0, 1], got {}", value),
                ));
            }
        }

        if p.days == 0 {
            return Err(PipelineError::validation("pipeline.days", "must be at least 1"));
        }
        if p.max_per_source == 0 {
            return Err(PipelineError::validation(
                "pipeline.max_per_source",
                "must be at least 1",
            ));
        }
        if p.publish_top_n == 0 {
            return Err(PipelineError::validation(
                "pipeline.publish_top_n",
                "must be at least 1",
            ));
        }
        if p.generate_reviews && p.review_top_n == 0 {
            return Err(PipelineError::validation(
                "pipeline.review_top_n",
                "must be at least 1 when reviews are enabled",
            ));
        }

        if !p.topics_dir.is_dir() {
            return Err(PipelineError::validation(
                "pipeline.topics_dir",
                &format!("directory not found: {}", p.topics_dir.display()),
            ));
        }

        for name in &self.sources.enabled {
            if !crate::scanner::ALL_SOURCES.contains(&name.as_str()) {
                return Err(PipelineError::validation(
                    "sources.enabled",
                    &format!(
                        "unknown source '{}', expected one of: {}",
                        name,
                        crate::scanner::ALL_SOURCES.join(", ")
                    ),
                ));
            }
        }

        for (field, secs) in [
            ("sources.request_timeout_secs", self.sources.request_timeout_secs),
            ("embedding.request_timeout_secs", self.embedding.request_timeout_secs),
            ("certification.timeout_secs", self.certification.timeout_secs),
        ] {
            if secs == 0 {
                return Err(PipelineError::validation(field, "must be at least 1"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.pipeline.topics_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_file, None);
        assert_eq!(config.pipeline.days, 1);
        assert_eq!(config.pipeline.max_per_source, 50);
        assert_eq!(config.pipeline.publish_top_n, 10);
        assert_eq!(config.pipeline.review_top_n, 5);
        assert!((config.pipeline.topic_threshold - 0.6).abs() < 1e-12);
        assert_eq!(config.sources.enabled.len(), 6);
        assert_eq!(config.sources.request_timeout_secs, 30);
        assert!(config.certification.url.is_none());
    }

    #[test]
    fn test_validate_accepts_defaults_with_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(valid_config(dir.path()).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.pipeline.min_score = 1.5;
        let err = config.validate().unwrap_err();
        match err {
            PipelineError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("pipeline.min_score"))
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut config = valid_config(dir.path());
        config.pipeline.min_reference_score = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_topics_dir() {
        let mut config = Config::default();
        config.pipeline.topics_dir = PathBuf::from("/definitely/not/here/topics");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("topics_dir"));
    }

    #[test]
    fn test_validate_rejects_unknown_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.sources.enabled.push("scopus".to_string());
        assert!(config.validate().unwrap_err().to_string().contains("scopus"));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.pipeline.days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = valid_config(dir.path());
        config.embedding.request_timeout_secs = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("embedding.request_timeout_secs"));

        let mut config = valid_config(dir.path());
        config.certification.timeout_secs = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("certification.timeout_secs"));

        let mut config = valid_config(dir.path());
        config.sources.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paperscout.toml");
        std::fs::write(
            &path,
            "log_level = \"debug\"\n[pipeline]\nmin_score = 0.7\ndays = 3\n",
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert!((config.pipeline.min_score - 0.7).abs() < 1e-12);
        assert_eq!(config.pipeline.days, 3);
        // untouched sections keep their defaults
        assert_eq!(config.pipeline.publish_top_n, 10);
    }
}
