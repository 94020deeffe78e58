use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use iep_progress::db;
use iep_progress::duration::{
    encode_minutes_seconds, format_duration, validate_duration_value, DurationStyle, DurationUnit,
};
use iep_progress::entry::{accept_entry, check_objective, DataPointInput};
use iep_progress::models::{DataPoint, Goal, GoalProgress};
use iep_progress::progress::{self, ProgressSummary};
use iep_progress::report;

#[derive(Parser)]
#[command(name = "iep-progress")]
#[command(about = "Goal progress tracking for special-education data collection", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Maximum Postgres connections
    #[arg(long, global = true, default_value_t = 5)]
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
    /// Import data points from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record one data point against a goal
    Record {
        #[arg(long)]
        goal: Uuid,
        /// Observation date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, allow_negative_numbers = true)]
        value: Option<f64>,
        /// Correct trials, for percentage goals
        #[arg(long, requires = "denominator")]
        numerator: Option<u32>,
        /// Attempted trials, for percentage goals
        #[arg(long, requires = "numerator")]
        denominator: Option<u32>,
        /// Duration unit, for duration goals (seconds or minutes)
        #[arg(long)]
        unit: Option<DurationUnit>,
        #[arg(long)]
        objective: Option<Uuid>,
        /// Level of support tag; repeat for several
        #[arg(long = "support")]
        support: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Summarize progress for goals
    #[command(group(
        ArgGroup::new("scope")
            .args(["goal", "student"])
            .multiple(false)
    ))]
    Summary {
        #[arg(long)]
        goal: Option<Uuid>,
        #[arg(long)]
        student: Option<String>,
        /// Only points tagged with this objective
        #[arg(long, requires = "goal", conflicts_with = "general")]
        objective: Option<Uuid>,
        /// Only points not tagged with an objective
        #[arg(long, requires = "goal")]
        general: bool,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        student: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Check or build packed duration values without a database
    Duration {
        #[command(subcommand)]
        action: DurationAction,
    },
}

#[derive(Subcommand)]
enum DurationAction {
    /// Validate a stored value under a unit
    Check {
        #[arg(long, allow_negative_numbers = true)]
        value: f64,
        #[arg(long)]
        unit: DurationUnit,
    },
    /// Pack minutes and seconds into a stored value
    Encode {
        #[arg(long)]
        minutes: u32,
        #[arg(long)]
        seconds: u32,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn connect(max_connections: u32) -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    tracing::debug!(max_connections, "connected to Postgres");
    Ok(pool)
}

fn summary_line(progress: &GoalProgress) -> String {
    let goal = &progress.goal;
    let kind = goal.data_collection_type;
    let summary = &progress.summary;
    if summary.data_points_count == 0 {
        return "no data points yet".to_string();
    }
    format!(
        "current {}, average {}, trend {:+.2} ({}) across {} points",
        report::format_value(kind, progress.duration_unit, summary.current_progress),
        report::format_average(kind, progress.duration_unit, summary.average_score),
        summary.trend,
        goal.trend_direction(summary).label(),
        summary.data_points_count
    )
}

fn print_progress(progress: &GoalProgress) {
    println!(
        "- {} / {} ({}): {}",
        progress.student_name,
        progress.goal.title,
        progress.goal.data_collection_type,
        summary_line(progress)
    );
}

/// Wraps a summary computed over some subset of a goal's points.
fn scoped(
    student_name: String,
    goal: Goal,
    points: &[DataPoint],
    summary: ProgressSummary,
) -> GoalProgress {
    GoalProgress {
        student_name,
        duration_unit: points.iter().find_map(|point| point.duration_unit),
        summary,
        goal,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    match cli.command {
        Commands::Duration { action } => match action {
            DurationAction::Check { value, unit } => {
                if !validate_duration_value(value, unit) {
                    anyhow::bail!("{value} is not a valid duration in {unit}");
                }
                match unit {
                    DurationUnit::Minutes => println!(
                        "{value} minutes is valid: {} ({})",
                        format_duration(value, DurationStyle::Clock),
                        format_duration(value, DurationStyle::Words)
                    ),
                    DurationUnit::Seconds => println!("{value} seconds is valid"),
                }
            }
            DurationAction::Encode { minutes, seconds } => {
                let encoded = encode_minutes_seconds(minutes, seconds)?;
                println!("{encoded:.2}");
            }
        },
        Commands::InitDb => {
            let pool = connect(cli.max_connections).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(cli.max_connections).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect(cli.max_connections).await?;
            let outcome = db::import_csv(&pool, &csv).await?;
            println!(
                "Inserted {} data points from {} ({} duplicates, {} rejected).",
                outcome.inserted,
                csv.display(),
                outcome.duplicates,
                outcome.rejected
            );
        }
        Commands::Record {
            goal,
            date,
            value,
            numerator,
            denominator,
            unit,
            objective,
            support,
            notes,
        } => {
            let pool = connect(cli.max_connections).await?;
            let (student_name, goal) = db::fetch_goal(&pool, goal)
                .await?
                .with_context(|| format!("goal {goal} not found"))?;
            if let Some(objective_id) = objective {
                let objectives = db::fetch_objectives(&pool, goal.id).await?;
                check_objective(&goal, &objectives, objective_id)
                    .with_context(|| format!("data point rejected for '{}'", goal.title))?;
            }
            let existing = db::fetch_data_points(&pool, goal.id).await?;

            let input = DataPointInput {
                date,
                progress_value: value,
                numerator,
                denominator,
                duration_unit: unit,
                objective_id: objective,
                level_of_support: support,
                notes,
            };
            let today = chrono::Utc::now().date_naive();
            let point = accept_entry(&goal, &existing, input, today)
                .with_context(|| format!("data point rejected for '{}'", goal.title))?;
            db::insert_data_point(&pool, &point, None).await?;
            tracing::info!(goal = %goal.id, point = %point.id, "recorded data point");

            let mut points = existing;
            points.insert(0, point);
            let recorded = scoped(student_name, goal.clone(), &points, goal.summarize(&points));
            println!("Recorded. {}", summary_line(&recorded));
        }
        Commands::Summary {
            goal,
            student,
            objective,
            general,
            json,
        } => {
            let pool = connect(cli.max_connections).await?;

            let entries = match goal {
                Some(goal_id) => {
                    let (student_name, goal) = db::fetch_goal(&pool, goal_id)
                        .await?
                        .with_context(|| format!("goal {goal_id} not found"))?;
                    let points = db::fetch_data_points(&pool, goal.id).await?;
                    let kind = goal.data_collection_type;
                    let summary = match (objective, general) {
                        (Some(objective_id), _) => {
                            progress::aggregate_objective(kind, &points, objective_id)
                        }
                        (None, true) => progress::aggregate_general(kind, &points),
                        (None, false) => progress::aggregate(kind, &points),
                    };
                    vec![scoped(student_name, goal, &points, summary)]
                }
                None => db::goal_progress(&pool, student.as_deref()).await?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("No goals found.");
                return Ok(());
            }

            for entry in &entries {
                print_progress(entry);
                if objective.is_some() || general {
                    continue;
                }

                let objectives = db::fetch_objectives(&pool, entry.goal.id).await?;
                if objectives.is_empty() {
                    continue;
                }
                let points = db::fetch_data_points(&pool, entry.goal.id).await?;
                let kind = entry.goal.data_collection_type;
                for objective in objectives {
                    let summary = progress::aggregate_objective(kind, &points, objective.id);
                    let scoped_entry = scoped(
                        entry.student_name.clone(),
                        entry.goal.clone(),
                        &points,
                        summary,
                    );
                    println!(
                        "    objective {}: {}",
                        objective.description,
                        summary_line(&scoped_entry)
                    );
                }
                let general_entry = scoped(
                    entry.student_name.clone(),
                    entry.goal.clone(),
                    &points,
                    progress::aggregate_general(kind, &points),
                );
                println!("    general: {}", summary_line(&general_entry));
            }
        }
        Commands::Report { student, out } => {
            let pool = connect(cli.max_connections).await?;
            let entries = db::goal_progress(&pool, student.as_deref()).await?;
            let generated_on = chrono::Utc::now().date_naive();
            let report = report::build_report(student.as_deref(), generated_on, &entries);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use iep_progress::entry::{validate_entry, EntryError};
    use iep_progress::models::DataCollectionType;

    const GOAL_ID: &str = "6f1c1f7e-2a55-4c57-9d4e-4f0b8a2b7c11";

    #[test]
    fn negative_record_value_reaches_validation() {
        let cli = Cli::try_parse_from(["iep-progress", "record", "--goal", GOAL_ID, "--value", "-1"])
            .unwrap();
        let Commands::Record { goal, value, .. } = cli.command else {
            panic!("expected the record command");
        };
        assert_eq!(value, Some(-1.0));

        let goal = Goal {
            id: goal,
            student_id: Uuid::new_v4(),
            title: "Reduces calling out".to_string(),
            data_collection_type: DataCollectionType::Frequency,
            frequency_direction: None,
        };
        let input = DataPointInput {
            progress_value: value,
            ..DataPointInput::default()
        };
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(
            validate_entry(&goal, input, today),
            Err(EntryError::Negative(-1.0))
        );
    }

    #[test]
    fn negative_duration_check_value_parses() {
        let cli = Cli::try_parse_from([
            "iep-progress",
            "duration",
            "check",
            "--value",
            "-0.30",
            "--unit",
            "minutes",
        ])
        .unwrap();
        let Commands::Duration {
            action: DurationAction::Check { value, unit },
        } = cli.command
        else {
            panic!("expected duration check");
        };
        assert_eq!(value, -0.30);
        assert!(!validate_duration_value(value, unit));
    }

    #[test]
    fn record_trials_must_come_in_pairs() {
        let parsed =
            Cli::try_parse_from(["iep-progress", "record", "--goal", GOAL_ID, "--numerator", "7"]);
        assert!(parsed.is_err());
    }
}
