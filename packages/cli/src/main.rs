#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! CLI for the locate map geocoding pipeline.
//!
//! Runs ticket batches through the pipeline and gives field supervisors a
//! maintenance surface over the geocode cache: statistics, version
//! history, and lock/unlock for field-verified coordinates.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use locate_map_cache::GeocodeCache;
use locate_map_cache_models::{RecordQuery, ReviewPriority};
use locate_map_pipeline::config::PipelineConfig;
use locate_map_pipeline::{Pipeline, export};
use locate_map_ticket_models::Ticket;

#[derive(Parser)]
#[command(name = "locate_map", about = "811 locate ticket geocoding pipeline")]
struct Cli {
    /// Pipeline configuration file.
    #[arg(long, default_value = "locate_map.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a ticket batch through the pipeline
    Run {
        /// Ticket CSV with normalized headers (`ticket_number`, `street`,
        /// `intersection`, `city`, `county`, `ticket_type`, `duration`,
        /// `work_type`, `excavator`)
        tickets: PathBuf,
    },
    /// Show cache statistics
    Stats,
    /// Show the version history for a ticket
    History {
        /// Ticket number
        ticket: String,
    },
    /// Lock a ticket's current record against automated supersession
    Lock {
        /// Ticket number
        ticket: String,
        /// Why the record is being pinned (e.g., "Field verified")
        #[arg(long)]
        reason: String,
        /// Who is locking it
        #[arg(long, default_value = "cli")]
        by: String,
    },
    /// Clear the lock on a ticket's current record
    Unlock {
        /// Ticket number
        ticket: String,
    },
    /// Regenerate the review-queue CSV from the cache
    ReviewQueue {
        /// Output path (defaults to `<output_dir>/review_queue.csv`)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let config = PipelineConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run { tickets } => {
            let batch = load_tickets(&tickets)?;
            log::info!("Loaded {} tickets from {}", batch.len(), tickets.display());
            let mut pipeline = Pipeline::from_config(&config)?;
            let run = pipeline.run(&batch)?;
            print_summary(&run.summary);
            println!(
                "\nResults written to {}",
                config.output_dir.join("results.csv").display()
            );
        }
        Commands::Stats => {
            let cache = GeocodeCache::open(&config.cache.db_path)?;
            let stats = cache.statistics()?;
            println!("Total records: {}", stats.total_records);
            println!("Locked:        {}", stats.locked_count);
            println!("\n{:<16} COUNT", "TIER");
            for (tier, count) in &stats.tier_counts {
                println!("{tier:<16} {count}");
            }
            println!("\n{:<16} COUNT", "PRIORITY");
            for (priority, count) in &stats.priority_counts {
                println!("{priority:<16} {count}");
            }
            println!("\n{:<16} COUNT", "METHOD");
            for (method, count) in &stats.method_counts {
                println!("{method:<16} {count}");
            }
        }
        Commands::History { ticket } => {
            let cache = GeocodeCache::open(&config.cache.db_path)?;
            let history = cache.history(&ticket)?;
            if history.is_empty() {
                println!("No records for ticket {ticket}");
                return Ok(());
            }
            println!(
                "{:<4} {:<12} {:<10} {:<14} {:<20} CURRENT",
                "VER", "TIER", "CONF", "PRIORITY", "STAGE"
            );
            for record in &history {
                println!(
                    "{:<4} {:<12} {:<10} {:<14} {:<20} {}",
                    record.version,
                    record.quality_tier.to_string(),
                    record
                        .confidence
                        .map_or_else(|| "-".to_string(), |c| format!("{c:.2}")),
                    record.review_priority.to_string(),
                    record.created_by_stage,
                    if record.is_current { "*" } else { "" }
                );
            }
        }
        Commands::Lock { ticket, reason, by } => {
            let mut cache = GeocodeCache::open(&config.cache.db_path)?;
            cache.lock(&ticket, &reason, &by)?;
            println!("Locked {ticket}: {reason}");
        }
        Commands::Unlock { ticket } => {
            let mut cache = GeocodeCache::open(&config.cache.db_path)?;
            cache.unlock(&ticket)?;
            println!("Unlocked {ticket}");
        }
        Commands::ReviewQueue { output } => {
            let cache = GeocodeCache::open(&config.cache.db_path)?;
            let mut queue = cache.query(&RecordQuery {
                priorities: vec![
                    ReviewPriority::Low,
                    ReviewPriority::Medium,
                    ReviewPriority::High,
                    ReviewPriority::Critical,
                ],
                ..RecordQuery::default()
            })?;
            queue.sort_by(|a, b| {
                b.review_priority.cmp(&a.review_priority).then_with(|| {
                    a.confidence
                        .unwrap_or(-1.0)
                        .total_cmp(&b.confidence.unwrap_or(-1.0))
                })
            });
            let path = output.unwrap_or_else(|| config.output_dir.join("review_queue.csv"));
            export::write_records_csv(&path, &queue)?;
            println!("Wrote {} review rows to {}", queue.len(), path.display());
        }
    }

    Ok(())
}

/// Loads a normalized ticket CSV. Column mapping from raw one-call exports
/// is upstream tooling; this reader expects the pipeline's own headers.
fn load_tickets(path: &Path) -> Result<Vec<Ticket>, Box<dyn std::error::Error>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut tickets = Vec::new();
    for row in reader.deserialize() {
        let ticket: Ticket = row?;
        tickets.push(ticket);
    }
    Ok(tickets)
}

fn print_summary(summary: &locate_map_pipeline::PipelineSummary) {
    println!("Pipeline {} complete", summary.pipeline_id);
    println!(
        "{} tickets ({} rejected), {:.1}s",
        summary.total_tickets,
        summary.rejected,
        summary.total_time_ms / 1000.0
    );
    println!(
        "\n{:<14} {:>9} {:>9} {:>7} {:>8} {:>9} {:>9} {:>11}",
        "STAGE", "PROCESSED", "SUCCEEDED", "FAILED", "SKIPPED", "DEGRADED", "IMPROVED", "AVG(ms)"
    );
    for stage in &summary.stages {
        println!(
            "{:<14} {:>9} {:>9} {:>7} {:>8} {:>9} {:>9} {:>11.1}",
            stage.stage_name,
            stage.processed,
            stage.succeeded,
            stage.failed,
            stage.skipped,
            stage.degraded,
            stage.improved,
            stage.avg_time_ms
        );
    }
    if !summary.tier_counts.is_empty() {
        println!("\n{:<16} COUNT", "TIER");
        for (tier, count) in &summary.tier_counts {
            println!("{tier:<16} {count}");
        }
    }
    if !summary.error_counts.is_empty() {
        println!("\n{:<16} COUNT", "ERRORS");
        for (category, count) in &summary.error_counts {
            println!("{category:<16} {count}");
        }
    }
}
