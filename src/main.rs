use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relationship_health::db::{Scope, Store};
use relationship_health::engine::analyze_roster;
use relationship_health::models::SubjectAnalysis;
use relationship_health::report;

#[derive(Parser)]
#[command(name = "relationship-health")]
#[command(about = "Relationship health scoring for personal contacts", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import interactions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rescore relationships and persist their state
    Score {
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Score as of this RFC 3339 timestamp instead of now
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
        /// Print scores without writing state back
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the full analysis for one relationship
    Show {
        #[arg(long)]
        name: String,
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_analysis(analysis: &SubjectAnalysis) {
    let change = if analysis.state_changed() {
        format!("{} -> {}", analysis.previous_state, analysis.transition.state)
    } else {
        analysis.transition.state.to_string()
    };
    let flag = if analysis.transition.neglected {
        " [neglected]"
    } else {
        ""
    };
    println!(
        "- {} score {:.2} ({}){}, {} days since last interaction",
        analysis.full_name,
        analysis.report.score,
        change,
        flag,
        analysis.report.days_since_last_interaction
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = Store::new(pool);

    match cli.command {
        Commands::InitDb => {
            store.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            store.seed(Utc::now()).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = store.import_csv(&csv).await?;
            println!("Inserted {inserted} interactions from {}.", csv.display());
        }
        Commands::Score {
            name,
            limit,
            as_of,
            dry_run,
        } => {
            let now = as_of.unwrap_or_else(Utc::now);

            let analyses = if dry_run {
                let scope = name.as_deref().map_or(Scope::All, Scope::Name);
                let subjects = store.fetch_subjects(scope, now).await?;
                analyze_roster(&subjects, now)
            } else {
                let mut analyses = Vec::new();
                for id in store.subject_ids(name.as_deref()).await? {
                    if let Some(analysis) = store.rescore(id, now).await? {
                        analyses.push(analysis);
                    }
                }
                analyses.sort_by(|a, b| a.report.score.total_cmp(&b.report.score));
                let written = analyses.iter().filter(|a| a.needs_write_back()).count();
                info!(scored = analyses.len(), changed = written, "rescoring complete");
                analyses
            };

            if analyses.is_empty() {
                println!("No relationships found.");
                return Ok(());
            }

            println!("Relationships most in need of attention:");
            for analysis in analyses.iter().take(limit) {
                print_analysis(analysis);
            }
        }
        Commands::Show { name, as_of, json } => {
            let now = as_of.unwrap_or_else(Utc::now);
            let subjects = store.fetch_subjects(Scope::Name(&name), now).await?;
            let analysis = analyze_roster(&subjects, now)
                .into_iter()
                .next()
                .with_context(|| format!("no relationship named {name}"))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print_analysis(&analysis);
                println!(
                    "  actions completed {:.0}%, critical {:.0}%",
                    analysis.report.action_completion_rate * 100.0,
                    analysis.report.critical_action_completion_rate * 100.0
                );
                for recommendation in &analysis.report.recommendations {
                    println!("  * {recommendation}");
                }
            }
        }
        Commands::Report { as_of, out } => {
            let now = as_of.unwrap_or_else(Utc::now);
            let subjects = store.fetch_subjects(Scope::All, now).await?;
            let analyses = analyze_roster(&subjects, now);
            let report = report::build_report(now, &analyses);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
