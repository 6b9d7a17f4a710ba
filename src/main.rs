//! Keyword Scout - command line front end
//!
//! Plans searches and records feedback against a state directory so budgets,
//! checkpoints and learned weights carry over between invocations. The
//! searches themselves are executed by whatever consumes the printed plan.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use scout_core::{
    FetchedResult, JsonFileStore, Keyword, KeywordReport, PlannedQuery, QueryOutcome, RunTracker,
    ScoutConfig, SearchPlanner, StateStore,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Keyword-driven search budget optimizer", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Directory holding persisted state (defaults to the platform data dir)
    #[arg(long, env = "SCOUT_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "SCOUT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a search plan and print it as JSON
    Plan {
        /// JSON file with an array of {"term", "weight"} objects
        #[arg(short, long)]
        keywords: PathBuf,

        /// Unique results after which the run should stop
        #[arg(short, long, default_value = "500")]
        budget: u64,

        /// Days back to search
        #[arg(short, long, default_value = "7")]
        window: u32,

        /// Use proposed weights as given instead of learned ones
        #[arg(long)]
        no_learning: bool,
    },

    /// Show quota usage and health
    Quota {
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show per-keyword effectiveness
    Stats {
        /// Only this keyword
        #[arg(short, long)]
        keyword: Option<String>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Record a downstream classification for a keyword
    Classify {
        #[arg(short, long)]
        keyword: String,

        /// The result was judged relevant
        #[arg(long)]
        relevant: bool,

        /// Classification score in [0, 1]
        #[arg(short, long, default_value = "0.5")]
        score: f64,
    },

    /// Scale down weights after a rejected downstream artifact
    Penalize {
        /// Comma-separated keywords
        #[arg(short, long, value_delimiter = ',')]
        keywords: Vec<String>,

        /// Fraction to remove from each weight
        #[arg(short, long, default_value = "0.2")]
        factor: f64,
    },

    /// Fold tracked effectiveness into learned weights
    Learn,

    /// Report an executed query so quota, checkpoints and the cache advance
    Record {
        /// JSON file with one planned query, as printed by `plan`
        #[arg(short, long)]
        query: PathBuf,

        /// JSON file with the fetched results
        #[arg(short, long, required_unless_present_any = ["rejected", "failed"])]
        results: Option<PathBuf>,

        /// API calls spent (defaults to the query's estimate)
        #[arg(long)]
        calls: Option<u64>,

        /// The platform rejected the query's since_id
        #[arg(long, conflicts_with_all = ["results", "failed"])]
        rejected: bool,

        /// The query failed outright
        #[arg(long, conflicts_with = "results")]
        failed: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn default_state_dir() -> PathBuf {
    ProjectDirs::from("", "", "keyword-scout")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".keyword-scout"))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ScoutConfig> {
    match path {
        Some(path) => ScoutConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ScoutConfig::default()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} from {}", what, path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid {} in {}", what, path.display()))
}

fn load_keywords(path: &Path) -> anyhow::Result<Vec<Keyword>> {
    let raw: Vec<Keyword> = read_json(path, "keyword list")?;
    // Re-normalize: the file may carry mixed case or out-of-range weights
    Ok(raw.into_iter().map(|k| Keyword::new(k.term, k.weight)).collect())
}

/// Outcome described by the `record` arguments
fn load_outcome(
    query: &PlannedQuery,
    results: Option<&Path>,
    calls: Option<u64>,
    rejected: bool,
    failed: bool,
) -> anyhow::Result<QueryOutcome> {
    if rejected {
        return Ok(QueryOutcome::BoundaryRejected);
    }
    if failed {
        return Ok(QueryOutcome::Failed);
    }
    let path = results.context("No results file given")?;
    let results: Vec<FetchedResult> = read_json(path, "results")?;
    Ok(QueryOutcome::Results {
        results,
        calls: calls.unwrap_or(query.estimated_calls),
    })
}

/// Fold one executed query into persisted state, returning the retry query if any
async fn record_query(
    planner: &SearchPlanner,
    query: &PlannedQuery,
    outcome: QueryOutcome,
) -> Option<PlannedQuery> {
    // Each invocation is its own run; deduplication across runs is the cache's job
    let mut run = RunTracker::new(u64::MAX);
    let retry = planner.record_outcome(&mut run, query, outcome).await;
    info!(
        "Recorded query over {:?}: {} new results",
        query.keywords,
        run.unique_count()
    );
    retry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "scout={level},scout_core={level}",
            level = level.as_str().to_lowercase()
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Plans go to stdout
        .init();

    debug!("Keyword Scout v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;
    let state_dir = cli.state_dir.unwrap_or_else(default_state_dir);
    let store: Arc<dyn StateStore> = Arc::new(
        JsonFileStore::open(&state_dir)
            .await
            .with_context(|| format!("Failed to open state in {}", state_dir.display()))?,
    );
    debug!("Using state directory {}", state_dir.display());

    let planner = SearchPlanner::load(&config, store).await;

    match cli.command {
        Commands::Plan {
            keywords,
            budget,
            window,
            no_learning,
        } => {
            let keywords = load_keywords(&keywords)?;
            let plan = if no_learning {
                planner.plan(&keywords, budget, window).await
            } else {
                planner.plan_with_learning(&keywords, budget, window).await
            };
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }

        Commands::Quota { format } => {
            let stats = planner
                .quota()
                .stats()
                .await
                .context("Quota state unavailable")?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Text => {
                    println!("Quota for {}", stats.month);
                    println!(
                        "  Monthly: {}/{} used ({:.1}%), {} usable remaining",
                        stats.monthly_used,
                        stats.monthly_limit,
                        stats.usage_percent,
                        stats.monthly_remaining
                    );
                    println!(
                        "  Window:  {}/{} used, resets at {}",
                        stats.window_used,
                        stats.window_effective_limit,
                        stats.window_resets_at.to_rfc3339()
                    );
                    println!("  Health:  {}", stats.health);

                    let savings = planner
                        .boundaries()
                        .estimated_savings(stats.monthly_limit);
                    println!("  Checkpointed keywords: {}", planner.boundaries().len());
                    println!(
                        "  Incremental searches this session: {}",
                        savings.incremental_searches
                    );
                }
            }
        }

        Commands::Stats { keyword, format } => {
            let reports: Vec<KeywordReport> = match keyword {
                Some(keyword) => vec![planner.tracker().report(&keyword)],
                None => planner.tracker().all_reports(),
            };
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
                OutputFormat::Text => print_reports(&planner, &reports),
            }
        }

        Commands::Classify {
            keyword,
            relevant,
            score,
        } => {
            planner
                .tracker()
                .record_classification(&keyword, relevant, score)
                .await;
            let report = planner.tracker().report(&keyword);
            info!(
                "Recorded classification for '{}' (effectiveness now {:.3})",
                report.stats.keyword, report.effectiveness
            );
        }

        Commands::Penalize { keywords, factor } => {
            anyhow::ensure!(!keywords.is_empty(), "No keywords given");
            planner.learner().penalize(&keywords, factor).await;
        }

        Commands::Learn => {
            let updated = planner.learn().await;
            println!("Updated {} learned weights", updated);
        }

        Commands::Record {
            query,
            results,
            calls,
            rejected,
            failed,
        } => {
            let query: PlannedQuery = read_json(&query, "planned query")?;
            let outcome = load_outcome(&query, results.as_deref(), calls, rejected, failed)?;
            if let Some(retry) = record_query(&planner, &query, outcome).await {
                // Printed so the caller can run it without a checkpoint
                println!("{}", serde_json::to_string_pretty(&retry)?);
            }
        }
    }

    Ok(())
}

fn print_reports(planner: &SearchPlanner, reports: &[KeywordReport]) {
    if reports.is_empty() {
        println!("No keyword statistics recorded yet");
        return;
    }

    println!(
        "{:<30} {:>6} {:>6} {:>8} {:>8} {:>7} {:>12}",
        "keyword", "hits", "class", "success", "eff", "weight", "trend"
    );
    for report in reports {
        let weight = planner
            .learner()
            .learned_weight(&report.stats.keyword)
            .map(|w| format!("{:.3}", w.weight))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<30} {:>6} {:>6} {:>7.1}% {:>8.3} {:>7} {:>12}",
            report.stats.keyword,
            report.stats.hits,
            report.stats.classified_count,
            report.success_rate * 100.0,
            report.effectiveness,
            weight,
            format!("{:?}", report.trend).to_lowercase()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::{MemoryStore, Phase};
    use tempfile::TempDir;

    fn planned(since_id: Option<u64>) -> PlannedQuery {
        PlannedQuery {
            query: "federalism".to_string(),
            keywords: vec!["federalism".to_string()],
            phase: Phase::HighPriority,
            since_id,
            window_days: 7,
            estimated_calls: 2,
            truncated: false,
        }
    }

    #[test]
    fn test_record_arguments_parse() {
        let cli = Cli::try_parse_from([
            "scout", "record", "--query", "q.json", "--results", "r.json", "--calls", "3",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Record { calls: Some(3), rejected: false, .. }
        ));

        // Results are required unless the query did not succeed
        assert!(Cli::try_parse_from(["scout", "record", "--query", "q.json"]).is_err());
        assert!(Cli::try_parse_from(["scout", "record", "--query", "q.json", "--rejected"]).is_ok());
        assert!(Cli::try_parse_from([
            "scout", "record", "--query", "q.json", "--results", "r.json", "--failed",
        ])
        .is_err());
    }

    #[test]
    fn test_outcome_defaults_to_estimated_calls() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("results.json");
        std::fs::write(
            &path,
            r#"[{"id": 42, "text": "federalism", "created_at": "2026-01-05T12:00:00Z"}]"#,
        )
        .unwrap();

        let outcome = load_outcome(&planned(None), Some(&path), None, false, false).unwrap();
        match outcome {
            QueryOutcome::Results { results, calls } => {
                assert_eq!(calls, 2);
                assert_eq!(results[0].id, 42);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(load_outcome(&planned(None), None, None, false, false).is_err());
    }

    #[tokio::test]
    async fn test_recorded_results_advance_state() {
        let store = Arc::new(MemoryStore::new());
        let planner = SearchPlanner::load(&ScoutConfig::default(), store.clone()).await;
        let results = vec![FetchedResult {
            id: 42,
            text: "federalism explained".to_string(),
            created_at: chrono::Utc::now(),
            metadata: serde_json::Value::Null,
        }];

        let retry = record_query(
            &planner,
            &planned(None),
            QueryOutcome::Results { results, calls: 2 },
        )
        .await;
        assert!(retry.is_none());
        assert_eq!(planner.quota().stats().await.unwrap().monthly_used, 2);
        assert_eq!(planner.boundaries().boundary("federalism").unwrap().since_id, 42);
        assert!(planner.cache().contains(42));

        let retry = record_query(&planner, &planned(Some(42)), QueryOutcome::BoundaryRejected)
            .await
            .unwrap();
        assert!(retry.since_id.is_none());
        assert!(planner.boundaries().boundary("federalism").is_none());
    }
}
