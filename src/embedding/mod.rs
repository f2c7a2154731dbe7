/// Embedding provider trait and supporting types
///
/// Provides a pluggable interface for text embedding generation.
/// Supports a hosted OpenAI-compatible API and a local fastembed model. Which one
/// a component uses is decided once, at construction, through `EmbedMode`.

pub mod local;
pub mod openai;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EmbeddingConfig;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// fastembed model initialization failure
    #[error("Model initialization error: {0}")]
    ModelInit(String),

    /// Embedding generation failure (inference error)
    #[error("Embedding generation error: {0}")]
    Generation(String),

    /// API provider returned an HTTP error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Provider not configured (e.g., missing API key)
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Core trait for embedding text into fixed-dimension float vectors.
///
/// Implementations must be Send + Sync to support use in async contexts
/// and across thread boundaries (e.g., Arc<dyn EmbeddingProvider>).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts, preserving input order.
    ///
    /// The default issues one `embed` call per text; providers with a native batch
    /// endpoint override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Return the model name identifier (e.g., "all-MiniLM-L6-v2").
    fn model_name(&self) -> &str;

    /// Return the dimension of the embedding vectors produced by this model.
    fn dimension(&self) -> usize;
}

/// How a scoring component turns text into a similarity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedMode {
    /// Hosted embedding service (credential configured)
    Hosted,
    /// Local embedding model
    Local,
    /// Deterministic keyword scoring, no embeddings
    KeywordFallback,
}

impl fmt::Display for EmbedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbedMode::Hosted => write!(f, "hosted"),
            EmbedMode::Local => write!(f, "local"),
            EmbedMode::KeywordFallback => write!(f, "keyword"),
        }
    }
}

/// An embedding backend paired with the mode it was resolved to.
///
/// `provider` is `None` exactly when `mode` is `KeywordFallback`.
#[derive(Clone)]
pub struct Embedder {
    pub mode: EmbedMode,
    pub provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl Embedder {
    pub fn keyword() -> Self {
        Embedder {
            mode: EmbedMode::KeywordFallback,
            provider: None,
        }
    }

    pub fn new(mode: EmbedMode, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Embedder {
            mode,
            provider: Some(provider),
        }
    }

    /// Resolve the full mode ladder: hosted, then local, then keyword.
    ///
    /// Resolution happens once; a local model that fails to initialize drops the
    /// component to keyword mode for the rest of the run.
    pub async fn resolve(config: &EmbeddingConfig) -> Self {
        if let Some(hosted) = Self::resolve_hosted(config) {
            return hosted;
        }

        if config.local_enabled {
            match local::LocalEmbeddingProvider::new(&config.cache_dir).await {
                Ok(provider) => {
                    tracing::info!(model = provider.model_name(), "Using local embedding model");
                    return Embedder::new(EmbedMode::Local, Arc::new(provider));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Local embedding model unavailable");
                }
            }
        }

        tracing::warn!("No embedding model available, using keyword matching");
        Embedder::keyword()
    }

    /// Resolve the hosted tier only (used by the reference scorer, which has no local tier).
    pub fn resolve_hosted_or_keyword(config: &EmbeddingConfig) -> Self {
        Self::resolve_hosted(config).unwrap_or_else(|| {
            tracing::warn!("Hosted embeddings not configured, using keyword matching only");
            Embedder::keyword()
        })
    }

    fn resolve_hosted(config: &EmbeddingConfig) -> Option<Self> {
        let api_key = config.openai_api_key.as_ref()?;
        match openai::OpenAIEmbeddingProvider::new(
            api_key.clone(),
            config.openai_base_url.clone(),
            config.openai_model.clone(),
            config.request_timeout_secs,
        ) {
            Ok(provider) => Some(Embedder::new(EmbedMode::Hosted, Arc::new(provider))),
            Err(e) => {
                tracing::warn!(error = %e, "Hosted embedding provider rejected its configuration");
                None
            }
        }
    }
}

impl fmt::Debug for Embedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedder")
            .field("mode", &self.mode)
            .field("model", &self.provider.as_ref().map(|p| p.model_name().to_string()))
            .finish()
    }
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero norm or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Clamp a similarity into [0, 1]. NaN and infinities score 0.0.
pub fn unit_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// First `max_chars` characters of `text` (char-boundary safe).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
