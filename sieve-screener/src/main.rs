//! Sieve Screener - multi-factor A-share stock screener.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};

use sieve_common::config::Config;
use sieve_common::config_loader::check_modular_files;
use sieve_common::logging::init_from_config;
use sieve_screener::screener::{criteria_banner, recent_quarter_ends, ReportFormat};
use sieve_screener::{EastmoneyProvider, ScreenerEngine, ScreenerReport};

/// Multi-factor A-share stock screener.
#[derive(Parser, Debug)]
#[command(name = "sieve-screener")]
#[command(version)]
#[command(about = "Screen A-shares by shareholder trend, turnover, MA alignment, market cap, momentum and fund flow", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a full screening pass
    Run {
        /// Reference date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Restrict the universe to these codes (comma separated)
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Output formats (csv, json, markdown); repeatable
        #[arg(long = "format", short = 'f')]
        formats: Vec<ReportFormat>,

        /// Directory for result files
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Securities evaluated concurrently
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the quarter ends a run would use
    Quarters {
        /// Reference date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Print the active screening criteria
    Criteria,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_with_env().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(sieve_common::Error::from)
        .context("Invalid configuration")?;

    init_from_config(&config.observability);
    info!("Sieve Screener v{}", env!("CARGO_PKG_VERSION"));
    for (file, exists) in check_modular_files(None) {
        debug!(file = %file, exists, "Config file");
    }

    match cli.command {
        Commands::Run {
            date,
            symbols,
            formats,
            output_dir,
            concurrency,
        } => run(config, date, symbols, formats, output_dir, concurrency).await,
        Commands::Quarters { date } => {
            let reference = date.unwrap_or_else(|| Local::now().date_naive());
            for quarter in recent_quarter_ends(reference) {
                println!("{}", quarter.label());
            }
            Ok(())
        }
        Commands::Criteria => {
            println!("{}", criteria_banner(&config.screener.criteria));
            Ok(())
        }
    }
}

async fn run(
    mut config: Config,
    date: Option<NaiveDate>,
    symbols: Vec<String>,
    formats: Vec<ReportFormat>,
    output_dir: Option<PathBuf>,
    concurrency: Option<usize>,
) -> Result<()> {
    if !symbols.is_empty() {
        config.screener.target_symbols = symbols;
    }
    if let Some(n) = concurrency {
        config.screener.concurrency = n.max(1);
    }

    let formats = if formats.is_empty() {
        config
            .output
            .formats
            .iter()
            .map(|f| f.parse::<ReportFormat>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(anyhow::Error::msg)?
    } else {
        formats
    };
    let output_dir = output_dir.unwrap_or_else(|| config.output.resolved_dir());
    let reference = date.unwrap_or_else(|| Local::now().date_naive());

    println!("{}", criteria_banner(&config.screener.criteria));

    let provider = EastmoneyProvider::from_config(&config.data_source)
        .context("Failed to create eastmoney provider")?;
    let engine = ScreenerEngine::new(Arc::new(provider), &config);

    let report = match engine.run(reference).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Screening run aborted");
            bail!("Screening aborted: {}", e);
        }
    };

    let report = ScreenerReport::new(report);
    println!("\n{}", report.to_console_table());

    for path in report.save_all(&output_dir, &formats)? {
        println!("结果已保存到: {}", path.display());
    }

    Ok(())
}
