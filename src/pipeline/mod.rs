/// Pipeline orchestrator.
///
/// Runs the stages strictly in order:
///
/// `LOAD_TOPICS -> FETCH -> GATE_1 -> MATCH -> SCORE -> GATE_2 -> RENDER -> GATE_3 -> DONE`
///
/// A dry run stops after GATE_2. A stage that leaves zero papers ends the run early
/// without an error. An explicit block from a gate records an error and halts. Every
/// path returns a `RunSummary`.

pub mod report;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::{MatchResult, RankedPaper, ReferenceScorer, SimilarityMatcher};
use crate::certification::{Gate, HttpCertifier};
use crate::config::{Config, PipelineConfig};
use crate::embedding::{EmbedMode, Embedder};
use crate::errors::PipelineError;
use crate::render::{EnrichedPaper, JsonRenderer, Renderer};
use crate::scanner::{build_sources, FetchCoordinator, Paper};

pub use report::{print_report, RunSummary, TopPaper};

/// Papers listed in the summary's `top_papers`
const SUMMARY_TOP_PAPERS: usize = 5;
/// Papers named in a stage summary sent to a gate
const GATE_SAMPLE: usize = 5;
/// Characters of abstract included when certifying a single paper
const PAPER_CERT_ABSTRACT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LoadTopics,
    Fetch,
    Gate1,
    Match,
    Score,
    Gate2,
    Render,
    Gate3,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::LoadTopics => "LOAD_TOPICS",
            Stage::Fetch => "FETCH",
            Stage::Gate1 => "GATE_1",
            Stage::Match => "MATCH",
            Stage::Score => "SCORE",
            Stage::Gate2 => "GATE_2",
            Stage::Render => "RENDER",
            Stage::Gate3 => "GATE_3",
            Stage::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Run parameters, resolved from configuration and CLI overrides.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub days: u32,
    pub max_per_source: usize,
    pub min_score: f64,
    pub min_reference_score: f64,
    pub publish_top_n: usize,
    pub review_top_n: usize,
    pub generate_reviews: bool,
    pub dry_run: bool,
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        PipelineOptions {
            days: config.days,
            max_per_source: config.max_per_source,
            min_score: config.min_score,
            min_reference_score: config.min_reference_score,
            publish_top_n: config.publish_top_n,
            review_top_n: config.review_top_n,
            generate_reviews: config.generate_reviews,
            dry_run: config.dry_run,
        }
    }
}

pub struct Pipeline {
    options: PipelineOptions,
    coordinator: FetchCoordinator,
    matcher: SimilarityMatcher,
    scorer: ReferenceScorer,
    gate: Gate,
    post_renderer: Arc<dyn Renderer>,
    review_renderer: Option<Arc<dyn Renderer>>,
}

impl Pipeline {
    pub fn new(
        options: PipelineOptions,
        coordinator: FetchCoordinator,
        matcher: SimilarityMatcher,
        scorer: ReferenceScorer,
        gate: Gate,
        post_renderer: Arc<dyn Renderer>,
    ) -> Self {
        Pipeline {
            options,
            coordinator,
            matcher,
            scorer,
            gate,
            post_renderer,
            review_renderer: None,
        }
    }

    pub fn with_review_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.review_renderer = Some(renderer);
        self
    }

    /// Wire every component from a validated configuration.
    ///
    /// Resolves embedding modes once, loads the reference document, and probes the
    /// certifier. Nothing here fails on an unreachable collaborator; only a
    /// configuration the components reject is an error.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let p = &config.pipeline;

        let sources = build_sources(&config.sources).map_err(|e| PipelineError::Config(e.to_string()))?;
        let coordinator = FetchCoordinator::new(sources);
        tracing::info!(sources = ?coordinator.source_names(), "Registered paper sources");

        let matcher_embedder = Embedder::resolve(&config.embedding).await;
        let scorer_embedder = if matcher_embedder.mode == EmbedMode::Hosted {
            matcher_embedder.clone()
        } else {
            Embedder::resolve_hosted_or_keyword(&config.embedding)
        };

        let matcher = SimilarityMatcher::new(&p.topics_dir, p.topic_threshold, matcher_embedder);
        let scorer = ReferenceScorer::load(p.reference_path.as_deref(), scorer_embedder).await;

        let gate = match config.certification.url.as_deref() {
            Some(url) => {
                let certifier = HttpCertifier::new(
                    url,
                    config.certification.api_key.clone(),
                    config.certification.timeout_secs,
                )
                .map_err(|e| PipelineError::Config(e.to_string()))?;
                Gate::connect(Arc::new(certifier)).await
            }
            None => {
                tracing::info!("No certification service configured, gates pass by default");
                Gate::disabled()
            }
        };

        let mut pipeline = Pipeline::new(
            PipelineOptions::from(p),
            coordinator,
            matcher,
            scorer,
            gate,
            Arc::new(JsonRenderer::new("posts", &p.output_dir)),
        );
        if p.generate_reviews {
            pipeline = pipeline.with_review_renderer(Arc::new(JsonRenderer::new("reviews", &p.review_output_dir)));
        }
        Ok(pipeline)
    }

    fn enter(summary: &mut RunSummary, stage: Stage) {
        tracing::info!(stage = %stage, run_id = %summary.run_id, "Entering stage");
        summary.stopped_at = stage;
    }

    /// Execute one full run.
    pub async fn run(&mut self) -> RunSummary {
        let mut summary = RunSummary::new(self.options.dry_run);
        self.run_stages(&mut summary).await;
        summary.finish();
        tracing::info!(
            run_id = %summary.run_id,
            stopped_at = %summary.stopped_at,
            fetched = summary.papers_fetched,
            matched = summary.papers_matched,
            ranked = summary.papers_ranked,
            posts = summary.posts_generated,
            reviews = summary.reviews_generated,
            errors = summary.errors.len(),
            "Pipeline run finished"
        );
        summary
    }

    async fn run_stages(&mut self, summary: &mut RunSummary) {
        Self::enter(summary, Stage::LoadTopics);
        if let Err(e) = self.matcher.load_topics().await {
            tracing::error!(error = %e, "Failed to load topics");
            summary.errors.push(format!("Topic loading failed: {}", e));
            return;
        }

        Self::enter(summary, Stage::Fetch);
        let (mut papers, reports) = self
            .coordinator
            .fetch_all_with_report(self.options.days, self.options.max_per_source)
            .await;
        summary.sources = reports;
        papers.retain(Paper::has_abstract);
        summary.papers_fetched = papers.len();
        if papers.is_empty() {
            tracing::info!("No papers fetched, nothing to do");
            return;
        }

        Self::enter(summary, Stage::Gate1);
        if !self.pass_gate(summary, &fetch_summary(&papers), "scanner").await {
            summary.errors.push("Scanner output blocked by certification".to_string());
            return;
        }

        Self::enter(summary, Stage::Match);
        let relevant = self.matcher.filter_relevant(papers, self.options.min_score).await;
        summary.papers_matched = relevant.len();
        tracing::info!(
            matched = relevant.len(),
            min_score = self.options.min_score,
            mode = %self.matcher.mode(),
            "Topic matching complete"
        );
        if relevant.is_empty() {
            tracing::info!("No papers matched above threshold");
            return;
        }
        let analyzer_text = match_summary(&relevant);

        Self::enter(summary, Stage::Score);
        let ranked = self
            .scorer
            .rank_candidates(relevant, self.options.min_reference_score)
            .await;
        summary.papers_ranked = ranked.len();
        summary.top_papers = ranked.iter().take(SUMMARY_TOP_PAPERS).map(TopPaper::from).collect();
        if ranked.is_empty() {
            tracing::info!("No papers above the reference threshold");
            return;
        }

        Self::enter(summary, Stage::Gate2);
        if !self.pass_gate(summary, &analyzer_text, "analyzer").await {
            summary.errors.push("Analyzer output blocked by certification".to_string());
            return;
        }

        if self.options.dry_run {
            for r in ranked.iter().take(self.options.publish_top_n) {
                tracing::info!(
                    title = %r.paper.title,
                    combined = r.score.combined_score,
                    "Dry run: would publish"
                );
            }
            return;
        }

        Self::enter(summary, Stage::Render);
        let written = self.render(summary, &ranked).await;

        Self::enter(summary, Stage::Gate3);
        if !self.pass_gate(summary, &render_summary(&written), "publisher").await {
            summary.errors.push("Publisher output blocked by certification".to_string());
            return;
        }

        Self::enter(summary, Stage::Done);
    }

    /// Certify a stage summary and record the result. Returns whether to proceed.
    async fn pass_gate(&self, summary: &mut RunSummary, text: &str, stage: &str) -> bool {
        let cert = self.gate.certify(text, stage).await;
        if cert.is_fallback() {
            tracing::warn!(stage, reason = cert.fallback.as_deref().unwrap_or_default(), "Gate passed by default");
        } else {
            tracing::info!(
                stage,
                kappa = cert.gate_score,
                decision = %cert.decision,
                allowed = cert.allowed,
                "Gate decision"
            );
        }
        let allowed = cert.allowed;
        summary.certifications.push(cert);
        allowed
    }

    /// Certify each shortlisted paper, then hand the top-N to the renderers.
    async fn render(&self, summary: &mut RunSummary, ranked: &[RankedPaper]) -> Vec<PathBuf> {
        let review_n = match self.review_renderer {
            Some(_) if self.options.generate_reviews => self.options.review_top_n,
            _ => 0,
        };
        let wanted = self.options.publish_top_n.max(review_n).min(ranked.len());

        let mut enriched = Vec::with_capacity(wanted);
        for r in &ranked[..wanted] {
            let cert = self.gate.certify(&paper_certification_text(&r.paper), "paper").await;
            enriched.push(EnrichedPaper::new(r, cert));
        }

        let mut written = Vec::new();

        let posts = &enriched[..self.options.publish_top_n.min(enriched.len())];
        match self.post_renderer.render(posts).await {
            Ok(paths) => {
                summary.posts_generated = paths.len();
                written.extend(paths);
            }
            Err(e) => {
                tracing::error!(renderer = self.post_renderer.name(), error = %e, "Rendering failed");
                summary.errors.push(format!("Render failed ({}): {}", self.post_renderer.name(), e));
            }
        }

        if let Some(renderer) = self.review_renderer.as_ref().filter(|_| review_n > 0) {
            let reviews = &enriched[..review_n.min(enriched.len())];
            match renderer.render(reviews).await {
                Ok(paths) => {
                    summary.reviews_generated = paths.len();
                    written.extend(paths);
                }
                Err(e) => {
                    tracing::error!(renderer = renderer.name(), error = %e, "Rendering failed");
                    summary.errors.push(format!("Render failed ({}): {}", renderer.name(), e));
                }
            }
        }

        summary.documents = written.iter().map(|p| p.display().to_string()).collect();
        written
    }
}

/// `"Fetched N papers: t1, t2, ..."` over the first five titles, 50 chars each.
pub fn fetch_summary(papers: &[Paper]) -> String {
    let titles: Vec<String> = papers
        .iter()
        .take(GATE_SAMPLE)
        .map(|p| p.title.chars().take(50).collect())
        .collect();
    format!("Fetched {} papers: {}", papers.len(), titles.join(", "))
}

/// `"Matched N papers: title (45%); ..."` over the first five matches.
pub fn match_summary(matched: &[(Paper, MatchResult)]) -> String {
    let parts: Vec<String> = matched
        .iter()
        .take(GATE_SAMPLE)
        .map(|(_, m)| {
            let title: String = m.paper_title.chars().take(30).collect();
            format!("{} ({:.0}%)", title, m.similarity_score * 100.0)
        })
        .collect();
    format!("Matched {} papers: {}", matched.len(), parts.join("; "))
}

/// `"Generated N documents: stem1, stem2, ..."`
pub fn render_summary(paths: &[PathBuf]) -> String {
    let stems: Vec<String> = paths
        .iter()
        .take(GATE_SAMPLE)
        .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    format!("Generated {} documents: {}", paths.len(), stems.join(", "))
}

fn paper_certification_text(paper: &Paper) -> String {
    format!(
        "{}: {}",
        paper.title,
        crate::embedding::truncate_chars(&paper.abstract_text, PAPER_CERT_ABSTRACT_CHARS)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{paper, topic_result};

    #[test]
    fn test_stage_display_and_serde() {
        assert_eq!(Stage::Gate1.to_string(), "GATE_1");
        assert_eq!(Stage::LoadTopics.to_string(), "LOAD_TOPICS");
        assert_eq!(serde_json::to_string(&Stage::Gate3).unwrap(), "\"gate3\"");
    }

    #[test]
    fn test_fetch_summary_samples_five_titles() {
        let papers: Vec<Paper> = (0..7)
            .map(|i| paper(&format!("x:{}", i), &format!("Paper {} {}", i, "z".repeat(60)), "a"))
            .collect();
        let text = fetch_summary(&papers);
        assert!(text.starts_with("Fetched 7 papers: Paper 0 "));
        assert_eq!(text.matches(", ").count(), 4);
        assert!(!text.contains("Paper 5"));
    }

    #[test]
    fn test_match_summary_format() {
        let mut m = topic_result("x:1", 0.45);
        m.paper_title = "Kappa Gates".to_string();
        let text = match_summary(&[(paper("x:1", "Kappa Gates", "a"), m)]);
        assert_eq!(text, "Matched 1 papers: Kappa Gates (45%)");
    }

    #[test]
    fn test_render_summary_uses_stems() {
        let paths = vec![PathBuf::from("out/kappa-gates.json"), PathBuf::from("out/solvers.json")];
        assert_eq!(render_summary(&paths), "Generated 2 documents: kappa-gates, solvers");
    }

    #[test]
    fn test_paper_certification_text_truncates_abstract() {
        let p = paper("x:1", "Title", &"a".repeat(800));
        let text = paper_certification_text(&p);
        assert_eq!(text.len(), "Title: ".len() + 500);
    }
}
