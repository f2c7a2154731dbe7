use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use paperscout::config::Config;
use paperscout::logging;
use paperscout::pipeline::{print_report, Pipeline};

#[derive(Parser)]
#[command(name = "paperscout", version, about = "Discover recent research papers and rank them by relevance")]
struct Cli {
    /// Days to look back
    #[arg(long)]
    days: Option<u32>,

    /// Max papers per source
    #[arg(long)]
    max_papers: Option<usize>,

    /// Min topic similarity score
    #[arg(long)]
    min_score: Option<f64>,

    /// Min reference relevance score
    #[arg(long)]
    min_reference_score: Option<f64>,

    /// Rank only; do not render anything
    #[arg(long)]
    dry_run: bool,

    /// Skip detailed review generation
    #[arg(long)]
    no_reviews: bool,

    /// Topic corpus directory
    #[arg(long)]
    topics_dir: Option<PathBuf>,

    /// Output directory for posts
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output directory for detailed reviews
    #[arg(long)]
    review_output_dir: Option<PathBuf>,

    /// Reference document to score papers against
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(long, default_value = "paperscout.toml")]
    config: PathBuf,

    /// Print the run summary as JSON instead of a report
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        let p = &mut config.pipeline;
        if let Some(days) = self.days {
            p.days = days;
        }
        if let Some(max) = self.max_papers {
            p.max_per_source = max;
        }
        if let Some(min) = self.min_score {
            p.min_score = min;
        }
        if let Some(min) = self.min_reference_score {
            p.min_reference_score = min;
        }
        if self.dry_run {
            p.dry_run = true;
        }
        if self.no_reviews {
            p.generate_reviews = false;
        }
        if let Some(dir) = self.topics_dir {
            p.topics_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            p.output_dir = dir;
        }
        if let Some(dir) = self.review_output_dir {
            p.review_output_dir = dir;
        }
        if let Some(path) = self.reference {
            p.reference_path = Some(path);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args
    let cli = Cli::parse();
    let json = cli.json;

    // 2. Load configuration, apply flag overrides, validate before any network activity
    let mut config = Config::load_from(&cli.config)?;
    cli.apply(&mut config);
    config.validate()?;

    // 3. Logging goes to stderr; stdout carries the summary
    logging::init_logging(&config);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        days = config.pipeline.days,
        sources = ?config.sources.enabled,
        dry_run = config.pipeline.dry_run,
        "paperscout starting"
    );

    // 4. Build components and run
    let mut pipeline = Pipeline::from_config(&config).await?;
    let summary = pipeline.run().await;

    // 5. Report; runtime outcomes (blocked gate, zero papers) still exit 0
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_report(&summary);
    }

    Ok(())
}
