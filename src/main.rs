//! conductor CLI - test orchestration engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use conductor::analytics::{AnalyticsStore, PerformanceAnalyzer};
use conductor::config::{self, Config};
use conductor::discovery::{self, Discovery};
use conductor::executor::ProcessRunner;
use conductor::model::TestRecord;
use conductor::orchestrator::Orchestrator;
use conductor::report::{self, ConsoleReporter, JsonReporter, MultiReporter, Reporter};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Test orchestration engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "conductor.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and run tests
    Run {
        /// Override the worker pool size
        #[arg(short, long)]
        workers: Option<usize>,

        /// Run everything sequentially
        #[arg(long)]
        no_parallel: bool,

        /// Stop dispatching after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Only run these categories (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Write a JSON report to this path
        #[arg(long)]
        json_report: Option<PathBuf>,

        /// Do not record this run into the analytics store
        #[arg(long)]
        no_store: bool,
    },

    /// Discover tests without running them
    Discover {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Query the historical metrics store
    Analytics {
        #[command(subcommand)]
        command: AnalyticsCommands,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init,
}

#[derive(Subcommand)]
enum AnalyticsCommands {
    /// Aggregate statistics for recent runs
    Report {
        /// Trailing window in days
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Tests whose failure rate exceeds a threshold
    Flaky {
        /// Flakiness threshold in [0, 1]
        #[arg(short, long, default_value_t = 0.1)]
        threshold: f64,

        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Tests whose average duration exceeds a threshold
    Slow {
        /// Duration threshold in seconds
        #[arg(short, long, default_value_t = 1.0)]
        threshold: f64,

        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Suggest a worker count from recent timing history
    Optimize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    // Logs go to stderr; stdout is reserved for artifacts (JSON output,
    // discovery listings, reports).
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            workers,
            no_parallel,
            fail_fast,
            categories,
            json_report,
            no_store,
        } => {
            run_tests(
                &cli.config,
                RunOverrides {
                    workers,
                    no_parallel,
                    fail_fast,
                    categories,
                    json_report,
                    no_store,
                    verbose: cli.verbose,
                },
            )
            .await
        }
        Commands::Discover { format } => discover_tests(&cli.config, &format),
        Commands::Analytics { command } => analytics(&cli.config, command),
        Commands::Validate => validate_config(&cli.config),
        Commands::Init => init_config(),
    }
}

struct RunOverrides {
    workers: Option<usize>,
    no_parallel: bool,
    fail_fast: bool,
    categories: Vec<String>,
    json_report: Option<PathBuf>,
    no_store: bool,
    verbose: bool,
}

/// Load config from `path`, falling back to defaults when the file does
/// not exist.
fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        let config = config::load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    } else {
        info!("no config file at {}, using defaults", path.display());
        Ok(Config::default())
    }
}

async fn run_tests(config_path: &Path, overrides: RunOverrides) -> Result<()> {
    let mut config = load_or_default(config_path)?;

    if let Some(workers) = overrides.workers {
        config.run.max_workers = workers;
    }
    if overrides.no_parallel {
        config.run.parallel = false;
    }
    if overrides.fail_fast {
        config.run.fail_fast = true;
    }
    if overrides.verbose {
        config.run.verbose = true;
    }
    config
        .run
        .categories
        .extend(config::parse_categories(&overrides.categories)?);
    config::validate(&config)?;

    let discovery = Discovery::new(config.discovery.clone())?;
    let mut tests = discovery.discover(&config.discovery.roots);

    // Refine cost estimates from history when the store is reachable.
    if config.analytics.refine_estimates {
        match AnalyticsStore::open(&config.analytics.db_path) {
            Ok(store) => {
                discovery::apply_history(&mut tests, &store, config.analytics.window_days)
            }
            Err(e) => warn!("analytics store unavailable, keeping heuristic costs: {e}"),
        }
    }

    let records: Vec<TestRecord> = tests.into_values().collect();

    let reporter = Arc::new(create_reporter(&config, overrides.json_report));
    reporter.on_discovery_complete(&records).await;

    let runner = Arc::new(ProcessRunner::unittest());
    let orchestrator = Orchestrator::new(config.run.clone(), runner, reporter);
    let summary = orchestrator.run(records).await;

    // History recording is best-effort; a store fault never changes the
    // run's exit status.
    if !overrides.no_store {
        match AnalyticsStore::open(&config.analytics.db_path) {
            Ok(mut store) => {
                if let Err(e) =
                    store.record_execution(&summary, config.run.parallel, config.run.max_workers)
                {
                    warn!("failed to record run history: {e}");
                }
            }
            Err(e) => warn!("failed to open analytics store: {e}"),
        }
    }

    std::process::exit(summary.exit_code());
}

fn discover_tests(config_path: &Path, format: &str) -> Result<()> {
    let config = load_or_default(config_path)?;
    let discovery = Discovery::new(config.discovery.clone())?;
    let tests = discovery.discover(&config.discovery.roots);

    match format {
        "json" => {
            let records: Vec<&TestRecord> = tests.values().collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            println!("Discovered {} tests:", tests.len());
            for record in tests.values() {
                println!(
                    "  {} [{}] priority={:?} cost={:.2}s",
                    record.name,
                    record.category.as_str(),
                    record.priority,
                    record.estimated_cost_secs
                );
            }
        }
    }

    Ok(())
}

fn analytics(config_path: &Path, command: AnalyticsCommands) -> Result<()> {
    let config = load_or_default(config_path)?;
    let store = AnalyticsStore::open(&config.analytics.db_path)
        .with_context(|| format!("cannot open {}", config.analytics.db_path.display()))?;
    let default_days = config.analytics.window_days;

    match command {
        AnalyticsCommands::Report { days } => {
            let days = days.unwrap_or(default_days);
            let stats = store.window_stats(days)?;
            report::print_window_stats(days, &stats);
        }
        AnalyticsCommands::Flaky { threshold, days } => {
            let days = days.unwrap_or(default_days);
            let flaky = store.flaky_tests(threshold, days)?;
            report::print_metrics(
                &format!("Flaky tests (>{threshold:.2} over {days} days)"),
                &flaky,
            );
        }
        AnalyticsCommands::Slow { threshold, days } => {
            let days = days.unwrap_or(default_days);
            let slow = store.slow_tests(threshold, days)?;
            report::print_metrics(
                &format!("Slow tests (>{threshold:.1}s over {days} days)"),
                &slow,
            );
        }
        AnalyticsCommands::Optimize => {
            let analyzer = PerformanceAnalyzer::new(&store);
            let plan = analyzer.suggest_parallelization()?;
            report::print_parallelization(&plan);

            let order = analyzer.optimize_execution_order()?;
            if !order.is_empty() {
                println!();
                println!("Suggested execution order (most failure-prone first):");
                for id in order.iter().take(20) {
                    println!("  {id}");
                }
            }
        }
    }

    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    match config::load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("Settings:");
            println!("  Max workers: {}", config.run.max_workers);
            println!("  Parallel: {}", config.run.parallel);
            println!("  Fail fast: {}", config.run.fail_fast);
            println!("  Retry flaky: {}", config.run.retry_flaky);
            println!(
                "  Discovery roots: {}",
                config
                    .discovery
                    .roots
                    .iter()
                    .map(|r| r.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!("  File pattern: {}", config.discovery.file_pattern);
            println!("  Analytics db: {}", config.analytics.db_path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    }
}

fn init_config() -> Result<()> {
    let config = r#"# conductor configuration file

[run]
max_workers = 4
parallel = true
fail_fast = false
retry_flaky = 3

[discovery]
roots = ["tests"]
file_pattern = "test_*.py"
base_marker = "TestCase"
method_prefix = "test_"

[analytics]
db_path = "test_analytics.db"
window_days = 30
refine_estimates = false

[report]
json = false
json_file = "test-results.json"
"#;

    let path = PathBuf::from("conductor.toml");
    if path.exists() {
        eprintln!("conductor.toml already exists. Remove it first or edit manually.");
        std::process::exit(1);
    }

    std::fs::write(&path, config)?;
    println!("Created conductor.toml");
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  conductor run");

    Ok(())
}

fn create_reporter(config: &Config, json_override: Option<PathBuf>) -> MultiReporter {
    let mut multi = MultiReporter::new();

    multi = multi.with_reporter(ConsoleReporter::new(config.run.verbose));

    if config.report.json || json_override.is_some() {
        let json_path = json_override.unwrap_or_else(|| config.report.json_file.clone());
        multi = multi.with_reporter(JsonReporter::new(json_path));
    }

    multi
}
