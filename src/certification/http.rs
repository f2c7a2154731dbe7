/// HTTP client for the certification sidecar.
///
/// `POST <url>/api/v1/certify` with `{"content": text}` returns
/// `{allowed, kappa_gate, decision, R, S, N}`; `GET <url>/health` answers 2xx when
/// the service is up.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Certification, CertificationError, Certifier, Decision};

#[derive(Debug, Serialize)]
struct CertifyRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CertifyResponse {
    allowed: bool,
    #[serde(default)]
    kappa_gate: Option<f64>,
    #[serde(default)]
    decision: Option<Decision>,
    #[serde(rename = "R", default)]
    r: Option<f64>,
    #[serde(rename = "S", default)]
    s: Option<f64>,
    #[serde(rename = "N", default)]
    n: Option<f64>,
}

impl From<CertifyResponse> for Certification {
    fn from(resp: CertifyResponse) -> Self {
        let decision = resp
            .decision
            .unwrap_or(if resp.allowed { Decision::Execute } else { Decision::Block });
        Certification {
            allowed: resp.allowed,
            gate_score: resp.kappa_gate.unwrap_or(0.0).clamp(0.0, 1.0),
            decision,
            r: resp.r,
            s: resp.s,
            n: resp.n,
        }
    }
}

pub struct HttpCertifier {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCertifier {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self, CertificationError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(CertificationError::Config("certification URL is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CertificationError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpCertifier {
            client,
            base_url,
            api_key,
        })
    }
}

pub(crate) fn parse_response(body: &str) -> Result<Certification, CertificationError> {
    serde_json::from_str::<CertifyResponse>(body)
        .map(Certification::from)
        .map_err(|e| CertificationError::Parse(e.to_string()))
}

#[async_trait]
impl Certifier for HttpCertifier {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn health(&self) -> bool {
        match self.client.get(format!("{}/health", self.base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %self.base_url, error = %e, "Certifier health check failed");
                false
            }
        }
    }

    async fn certify(&self, text: &str) -> Result<Certification, CertificationError> {
        let mut request = self
            .client
            .post(format!("{}/api/v1/certify", self.base_url))
            .json(&CertifyRequest { content: text });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .map(|body| body.chars().take(200).collect())
                .unwrap_or_else(|_| "unreadable body".to_string());
            return Err(CertificationError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let cert = parse_response(
            r#"{"allowed": true, "kappa_gate": 0.82, "decision": "EXECUTE", "R": 0.7, "S": 0.2, "N": 0.1}"#,
        )
        .unwrap();
        assert!(cert.allowed);
        assert_eq!(cert.gate_score, 0.82);
        assert_eq!(cert.decision, Decision::Execute);
        assert_eq!((cert.r, cert.s, cert.n), (Some(0.7), Some(0.2), Some(0.1)));
    }

    #[test]
    fn test_parse_minimal_block() {
        let cert = parse_response(r#"{"allowed": false}"#).unwrap();
        assert!(!cert.allowed);
        assert_eq!(cert.decision, Decision::Block);
        assert_eq!(cert.gate_score, 0.0);
        assert!(cert.r.is_none());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(parse_response("ok"), Err(CertificationError::Parse(_))));
    }

    #[test]
    fn test_new_rejects_empty_url() {
        assert!(matches!(
            HttpCertifier::new("  ", None, 5),
            Err(CertificationError::Config(_))
        ));
        let certifier = HttpCertifier::new("http://localhost:8080/", None, 5).unwrap();
        assert_eq!(certifier.name(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // port 9 (discard) is closed on test machines
        let certifier = HttpCertifier::new("http://127.0.0.1:9", None, 2).unwrap();
        assert!(!certifier.health().await);
        assert!(matches!(
            certifier.certify("text").await,
            Err(CertificationError::Network(_))
        ));
    }
}
