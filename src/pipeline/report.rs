/// Run summary: the structured outcome of one pipeline run.
///
/// Always produced, whatever stage the run stopped at. Serializes to JSON for
/// `--json` output and prints as a human-readable report otherwise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Stage;
use crate::analysis::RankedPaper;
use crate::certification::CertificationResult;
use crate::scanner::SourceReport;

/// Condensed view of a top-ranked paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPaper {
    pub paper_id: String,
    pub title: String,
    pub url: String,
    pub topic_score: f64,
    pub reference_score: f64,
    pub combined_score: f64,
    pub overlapping_concepts: Vec<String>,
}

impl From<&RankedPaper> for TopPaper {
    fn from(ranked: &RankedPaper) -> Self {
        TopPaper {
            paper_id: ranked.paper.id.clone(),
            title: ranked.paper.title.clone(),
            url: ranked.paper.url.clone(),
            topic_score: ranked.score.topic_similarity,
            reference_score: ranked.score.reference_similarity,
            combined_score: ranked.score.combined_score,
            overlapping_concepts: ranked.score.overlapping_concepts.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Last stage entered; `Done` for a run that went all the way through
    pub stopped_at: Stage,
    pub dry_run: bool,
    pub papers_fetched: usize,
    pub papers_matched: usize,
    pub papers_ranked: usize,
    pub posts_generated: usize,
    pub reviews_generated: usize,
    pub sources: Vec<SourceReport>,
    pub certifications: Vec<CertificationResult>,
    pub top_papers: Vec<TopPaper>,
    pub documents: Vec<String>,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn new(dry_run: bool) -> Self {
        RunSummary {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            stopped_at: Stage::LoadTopics,
            dry_run,
            papers_fetched: 0,
            papers_matched: 0,
            papers_ranked: 0,
            posts_generated: 0,
            reviews_generated: 0,
            sources: Vec::new(),
            certifications: Vec::new(),
            top_papers: Vec::new(),
            documents: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

fn percent(score: f64) -> String {
    format!("{:.0}%", score * 100.0)
}

/// Print a formatted summary to stdout.
pub fn print_report(summary: &RunSummary) {
    println!("{}", "=".repeat(60));
    println!("PIPELINE SUMMARY  (run {})", summary.run_id);
    println!("{}", "=".repeat(60));
    println!("Started:           {}", summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Stopped at:        {}{}", summary.stopped_at, if summary.dry_run { " (dry run)" } else { "" });
    println!("Papers fetched:    {}", summary.papers_fetched);
    println!("Papers matched:    {}", summary.papers_matched);
    println!("Reference ranked:  {}", summary.papers_ranked);
    println!("Posts generated:   {}", summary.posts_generated);
    println!("Reviews generated: {}", summary.reviews_generated);
    println!("Certifications:    {}", summary.certifications.len());

    if !summary.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &summary.sources {
            match &source.error {
                None => println!("  {:<18} {} papers", source.source, source.fetched),
                Some(e) => println!("  {:<18} FAILED ({})", source.source, e),
            }
        }
    }

    if !summary.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &summary.errors {
            println!("  - {}", e);
        }
    }

    let stage_certs: Vec<_> = summary.certifications.iter().filter(|c| c.stage != "paper").collect();
    if !stage_certs.is_empty() {
        println!();
        println!("Certification Results:");
        for cert in stage_certs {
            let status = if cert.allowed { "PASS" } else { "BLOCK" };
            let note = cert
                .fallback
                .as_ref()
                .map(|f| format!("  [default: {}]", f))
                .unwrap_or_default();
            println!(
                "  [{}] {} kappa={:.2} decision={}{}",
                cert.stage, status, cert.gate_score, cert.decision, note
            );
        }
    }

    if !summary.top_papers.is_empty() {
        println!();
        println!("{}", "-".repeat(60));
        println!("TOP RANKED PAPERS");
        println!("{}", "-".repeat(60));
        for (i, paper) in summary.top_papers.iter().enumerate() {
            let title: String = paper.title.chars().take(60).collect();
            println!();
            println!("{}. {}", i + 1, title);
            println!(
                "   Topic: {} | Reference: {} | Combined: {}",
                percent(paper.topic_score),
                percent(paper.reference_score),
                percent(paper.combined_score)
            );
            if !paper.overlapping_concepts.is_empty() {
                let concepts: Vec<&str> = paper.overlapping_concepts.iter().take(5).map(String::as_str).collect();
                println!("   Key concepts: {}", concepts.join(", "));
            }
            println!("   {}", paper.url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_summary_is_empty_and_successful() {
        let summary = RunSummary::new(true);
        assert!(summary.is_success());
        assert!(summary.dry_run);
        assert_eq!(summary.stopped_at, Stage::LoadTopics);
        assert!(summary.finished_at.is_none());
    }

    #[test]
    fn test_summary_serializes_stage_and_counts() {
        let mut summary = RunSummary::new(false);
        summary.stopped_at = Stage::Done;
        summary.papers_fetched = 12;
        summary.errors.push("Scanner output blocked by certification".to_string());
        summary.finish();

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["stopped_at"], "done");
        assert_eq!(json["papers_fetched"], 12);
        assert_eq!(json["errors"][0], "Scanner output blocked by certification");
        assert!(json["finished_at"].is_string());
        assert!(!summary.is_success());
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0.45), "45%");
        assert_eq!(percent(1.0), "100%");
    }
}
