//! esgctl - ESG metric engine command line
//!
//! Runs calculations, manages formula definitions and inspects the
//! audit log against the engine's SQLite database.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use esg_calc::CalculationRun;
use esg_model::{MetricFormula, Period};
use esg_store::{apply_schema, repository, SqliteStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "esgctl")]
#[command(about = "ESG metric calculation engine CLI")]
#[command(long_about = "ESG metric calculation engine CLI

Commands:
  init        Initialize the engine tables
  compute     Run metric calculations for a period
  formulas    List, load, enable or disable formula definitions
  logs        Show recent calculation log entries
  sources     List registered data sources

Examples:
  esgctl init
  esgctl compute --period 2024
  esgctl compute --period 2024-Q1 --metric E-001 --metric E-002
  esgctl compute --period 2024 --prefix S-
  esgctl formulas load formulas.json
  esgctl logs --limit 20")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Database URL (overrides configuration)
    #[arg(long = "db", global = true, env = "ESG_DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the engine tables
    Init,

    /// Run metric calculations for a period
    Compute {
        /// Reporting period: YYYY, YYYY-MM or YYYY-Qn
        #[arg(short, long)]
        period: String,

        /// Specific metric codes (repeatable); default is all active
        #[arg(short, long = "metric")]
        metrics: Vec<String>,

        /// Restrict to metric codes with this prefix (e.g. "E-")
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Manage formula definitions
    Formulas {
        #[command(subcommand)]
        command: FormulaCommands,
    },

    /// Show recent calculation log entries
    Logs {
        /// Maximum number of entries
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// List registered data sources and their fields
    Sources,
}

#[derive(Subcommand)]
enum FormulaCommands {
    /// List all formula definitions
    List,

    /// Load formula definitions from a JSON file (array of formulas)
    Load {
        /// Path to the JSON file
        file: PathBuf,
    },

    /// Activate a formula
    Enable { metric_code: String },

    /// Deactivate a formula
    Disable { metric_code: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config()?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database_url = cli.database_url.unwrap_or(config.database_url);
    let pool = connect(&database_url).await?;

    match cli.command {
        Commands::Init => {
            apply_schema(&pool).await?;
            println!("{} engine tables ready at {}", "✓".green(), database_url);
        },
        Commands::Compute {
            period,
            metrics,
            prefix,
        } => {
            apply_schema(&pool).await?;
            compute(&pool, &period, &metrics, prefix.as_deref()).await?;
        },
        Commands::Formulas { command } => {
            apply_schema(&pool).await?;
            formulas(&pool, command).await?;
        },
        Commands::Logs { limit } => {
            apply_schema(&pool).await?;
            logs(&pool, limit).await?;
        },
        Commands::Sources => sources(),
    }

    Ok(())
}

async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid database URL: {}", database_url))?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", database_url))
}

async fn compute(
    pool: &SqlitePool,
    period: &str,
    metrics: &[String],
    prefix: Option<&str>,
) -> Result<()> {
    let period = Period::parse(period)?;
    let store = SqliteStore::new(pool.clone());
    let mut run = CalculationRun::new(&store, &store, &store, period.clone());

    let results = if !metrics.is_empty() {
        run.calculate_many(metrics).await?
    } else if let Some(prefix) = prefix {
        run.calculate_for_module_prefix(prefix).await?
    } else {
        run.calculate_all().await?
    };

    if results.is_empty() {
        println!("{}", "No active formulas matched".yellow());
        return Ok(());
    }

    let mut failed = 0usize;
    for (code, result) in &results {
        if result.success {
            let unit = result.unit.as_deref().unwrap_or("");
            println!(
                "  {} {:<12} {} {}",
                "✓".green(),
                code,
                result.value_or_zero(),
                unit
            );
        } else {
            failed += 1;
            let message = result.error.as_deref().unwrap_or("calculation failed");
            println!("  {} {:<12} {}", "✗".red(), code, message.red());
        }
    }

    println!(
        "\n{} period {}: {} computed, {} failed",
        "Summary".bold(),
        period,
        results.len() - failed,
        failed
    );
    Ok(())
}

async fn formulas(pool: &SqlitePool, command: FormulaCommands) -> Result<()> {
    match command {
        FormulaCommands::List => {
            let formulas = repository::list_formulas(pool).await?;
            if formulas.is_empty() {
                println!("{}", "No formulas defined".yellow());
                return Ok(());
            }
            for formula in formulas {
                let state = if formula.active {
                    "active".green()
                } else {
                    "inactive".dimmed()
                };
                println!(
                    "  {:<12} [{}] {}",
                    formula.metric_code,
                    state,
                    formula.name.as_deref().unwrap_or("-")
                );
            }
        },
        FormulaCommands::Load { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let formulas: Vec<MetricFormula> = serde_json::from_str(&text)
                .with_context(|| format!("Invalid formula file {}", file.display()))?;

            let total = formulas.len();
            for formula in &formulas {
                repository::upsert_formula(pool, formula).await?;
            }
            println!("{} loaded {} formula definitions", "✓".green(), total);
        },
        FormulaCommands::Enable { metric_code } => {
            set_active(pool, &metric_code, true).await?;
        },
        FormulaCommands::Disable { metric_code } => {
            set_active(pool, &metric_code, false).await?;
        },
    }
    Ok(())
}

async fn set_active(pool: &SqlitePool, metric_code: &str, active: bool) -> Result<()> {
    if !repository::set_formula_active(pool, metric_code, active).await? {
        bail!("Unknown metric code: {}", metric_code);
    }
    let state = if active { "enabled" } else { "disabled" };
    println!("{} {} {}", "✓".green(), metric_code, state);
    Ok(())
}

async fn logs(pool: &SqlitePool, limit: u32) -> Result<()> {
    let entries = repository::recent_logs(pool, limit).await?;
    if entries.is_empty() {
        println!("{}", "No calculation logs".yellow());
        return Ok(());
    }

    for entry in entries {
        let status = match entry.status {
            esg_model::CalculationStatus::Success => "success".green(),
            esg_model::CalculationStatus::Failed => "failed".red(),
        };
        let value = entry
            .calculated_value
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {:<12} {:<8} [{}] {:>10} {:>4}ms {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.metric_code,
            entry.period,
            status,
            value,
            entry.execution_time_ms,
            entry.error_message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn sources() {
    let registry = esg_store::SourceRegistry::builtin();
    for name in registry.source_names() {
        // Names are straight from the builtin registry
        if let Ok(def) = registry.get(name) {
            let fields: Vec<&str> = def.fields.iter().map(|(logical, _)| *logical).collect();
            println!("  {:<24} fields: {}", name.bold(), fields.join(", "));
        }
    }
}
