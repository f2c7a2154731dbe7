/// Writes one pretty-printed JSON document per paper: `<dir>/<slug>.json`.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{EnrichedPaper, RenderError, Renderer};

pub struct JsonRenderer {
    name: String,
    dir: PathBuf,
}

impl JsonRenderer {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        JsonRenderer {
            name: name.into(),
            dir: dir.into(),
        }
    }
}

#[async_trait]
impl Renderer for JsonRenderer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn render(&self, papers: &[EnrichedPaper]) -> Result<Vec<PathBuf>, RenderError> {
        if papers.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(&self.dir).await.map_err(|source| RenderError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut written = Vec::with_capacity(papers.len());
        for paper in papers {
            let path = self.dir.join(format!("{}.json", paper.slug()));
            let body = serde_json::to_vec_pretty(paper)?;
            tokio::fs::write(&path, body)
                .await
                .map_err(|source| RenderError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!(renderer = %self.name, path = %path.display(), "Wrote document");
            written.push(path);
        }

        tracing::info!(renderer = %self.name, count = written.len(), dir = %self.dir.display(), "Rendered documents");
        Ok(written)
    }
}
