//! Cookline runner
//!
//! Cooks one content branch of a game stored in a DuckDB file and publishes
//! the artifacts under a target branch.
//!
//! Usage:
//!   cookline --db content.duckdb --game g1 --source main_working --target 1.4
//!
//! `RUST_LOG` overrides the log filter; `--verbose` defaults it to `debug`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use cookline_pipeline::{CookConfig, CookOrchestrator, CookReport, CookRequest};
use cookline_storage::ContentDb;
use cookline_types::{BranchName, GameId};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cookline")]
#[command(about = "Cook a draft content branch into published artifacts")]
struct Args {
    /// Path to the DuckDB content database
    #[arg(long, default_value = "content.duckdb")]
    db: PathBuf,

    /// Game id
    #[arg(short, long)]
    game: String,

    /// Branch to read raw content from
    #[arg(short, long)]
    source: String,

    /// Branch to publish under
    #[arg(short, long)]
    target: String,

    /// Cook configuration file (TOML)
    #[arg(short, long, default_value = "cookline.toml")]
    config: PathBuf,

    /// Freeze the formula clock and event window at this RFC 3339 instant
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = CookConfig::load_from(&args.config);
    let db = ContentDb::open(&args.db)
        .with_context(|| format!("failed to open content database {}", args.db.display()))?;

    let source = BranchName::parse(&args.source).context("invalid source branch")?;
    let target = BranchName::parse(&args.target).context("invalid target branch")?;
    let mut request = CookRequest::new(GameId::new(args.game), source, target);
    if let Some(now) = args.now {
        request = request.with_now(now);
    }

    info!(game_id = %request.game, source = %request.source, target = %request.target, "Cookline starting");
    let orchestrator = CookOrchestrator::from_db(db, config);
    let report = orchestrator
        .cook_branch_content(request.clone())
        .await
        .with_context(|| format!("cook of {} into {} failed", request.source, request.target))?;

    print_report(&request, &report);
    Ok(())
}

fn print_report(request: &CookRequest, report: &CookReport) {
    println!("\n========================================");
    println!("  Cook complete");
    println!("========================================");
    println!("  Run:       {}", report.run_id);
    println!("  Game:      {}", request.game);
    println!("  Published: {} (from {})", request.target, request.source);
    println!("  Segments:  {}", report.segments.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "));
    println!("  Duration:  {} ms", report.duration.as_millis());
    println!("\n  Artifacts:");
    for (kind, count) in &report.artifact_counts {
        println!("    {:<18} {}", kind.as_str(), count);
    }
    if report.changed_collections.is_empty() {
        println!("\n  No collection changed since the last publish.");
    } else {
        println!("\n  Changed since last publish:");
        for collection in &report.changed_collections {
            println!("    {collection}");
        }
    }
    println!("========================================\n");
}
