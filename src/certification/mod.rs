/// Certification gate between pipeline stages.
///
/// A `Certifier` is the external collaborator that scores a piece of text and says
/// whether it may proceed. `Gate` wraps an optional certifier and fails open: when
/// none is configured, it is unhealthy, or a call errors, the stage gets the neutral
/// passing result with `fallback` set to the reason. Only an explicit block from a
/// reachable certifier can stop the pipeline.

pub mod http;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpCertifier;

#[derive(Debug, Error)]
pub enum CertificationError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Malformed certification response: {0}")]
    Parse(String),

    #[error("Certifier not configured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for CertificationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CertificationError::Parse(err.to_string())
        } else {
            CertificationError::Network(err.to_string())
        }
    }
}

/// Gate decision reported by the certifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Execute,
    Review,
    Block,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Decision::Execute => "EXECUTE",
            Decision::Review => "REVIEW",
            Decision::Block => "BLOCK",
            Decision::Unknown => "UNKNOWN",
        };
        f.write_str(tag)
    }
}

/// Raw verdict from a certifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certification {
    pub allowed: bool,
    /// Within [0, 1]
    pub gate_score: f64,
    pub decision: Decision,
    pub r: Option<f64>,
    pub s: Option<f64>,
    pub n: Option<f64>,
}

impl Certification {
    /// The neutral result used whenever the certifier cannot be consulted.
    pub fn passing() -> Self {
        Certification {
            allowed: true,
            gate_score: 1.0,
            decision: Decision::Execute,
            r: None,
            s: None,
            n: None,
        }
    }
}

/// A certification as recorded for one stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationResult {
    pub stage: String,
    pub allowed: bool,
    pub gate_score: f64,
    pub decision: Decision,
    #[serde(rename = "R")]
    pub r: Option<f64>,
    #[serde(rename = "S")]
    pub s: Option<f64>,
    #[serde(rename = "N")]
    pub n: Option<f64>,
    /// Set when this is the fail-open default rather than a real verdict
    pub fallback: Option<String>,
}

impl CertificationResult {
    fn from_certification(stage: &str, cert: Certification, fallback: Option<String>) -> Self {
        CertificationResult {
            stage: stage.to_string(),
            allowed: cert.allowed,
            gate_score: cert.gate_score.clamp(0.0, 1.0),
            decision: cert.decision,
            r: cert.r,
            s: cert.s,
            n: cert.n,
            fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

#[async_trait]
pub trait Certifier: Send + Sync {
    fn name(&self) -> &str;

    async fn health(&self) -> bool;

    async fn certify(&self, text: &str) -> Result<Certification, CertificationError>;
}

/// Fail-open wrapper around an optional certifier.
#[derive(Clone)]
pub struct Gate {
    certifier: Option<Arc<dyn Certifier>>,
    unavailable: Option<String>,
}

impl Gate {
    /// A gate with no certifier: every stage passes.
    pub fn disabled() -> Self {
        Gate {
            certifier: None,
            unavailable: Some("certifier not configured".to_string()),
        }
    }

    /// Use `certifier` without a health probe.
    pub fn new(certifier: Arc<dyn Certifier>) -> Self {
        Gate {
            certifier: Some(certifier),
            unavailable: None,
        }
    }

    /// Probe the certifier once; an unhealthy one is treated as absent for the run.
    pub async fn connect(certifier: Arc<dyn Certifier>) -> Self {
        if certifier.health().await {
            tracing::info!(certifier = certifier.name(), "Certifier reachable");
            return Gate::new(certifier);
        }
        tracing::warn!(certifier = certifier.name(), "Certifier not reachable, gates will pass by default");
        Gate {
            certifier: None,
            unavailable: Some(format!("certifier unreachable: {}", certifier.name())),
        }
    }

    pub fn is_active(&self) -> bool {
        self.certifier.is_some()
    }

    pub async fn certify(&self, text: &str, stage: &str) -> CertificationResult {
        let Some(certifier) = self.certifier.as_ref() else {
            let reason = self
                .unavailable
                .clone()
                .unwrap_or_else(|| "certifier not configured".to_string());
            return CertificationResult::from_certification(stage, Certification::passing(), Some(reason));
        };

        match certifier.certify(text).await {
            Ok(cert) => {
                let result = CertificationResult::from_certification(stage, cert, None);
                tracing::debug!(
                    stage,
                    allowed = result.allowed,
                    gate_score = result.gate_score,
                    decision = %result.decision,
                    "Certification complete"
                );
                result
            }
            Err(e) => {
                tracing::warn!(stage, error = %e, "Certification failed, passing by default");
                CertificationResult::from_certification(
                    stage,
                    Certification::passing(),
                    Some(format!("certification error: {}", e)),
                )
            }
        }
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("certifier", &self.certifier.as_ref().map(|c| c.name().to_string()))
            .field("unavailable", &self.unavailable)
            .finish()
    }
}
