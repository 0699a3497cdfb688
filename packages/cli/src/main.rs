#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `macro_db`: fetch, inspect and export the Belgian macro database.
//!
//! Running without a subcommand performs the scheduled job: fetch every
//! enabled indicator, print the latest values, then regenerate all export
//! files. The process exits non-zero when every indicator failed or the
//! configuration is unusable, so an external scheduler can tell.

mod pipeline;
mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use macro_db_database::Store;
use macro_db_export::ExportFormat;

use crate::pipeline::Context;

#[derive(Parser)]
#[command(name = "macro_db", about = "Belgian macroeconomic indicator database")]
struct Cli {
    /// Database file (defaults to `$MACRO_DB_PATH` or `macro.duckdb` in the data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Directory for export files (defaults to `$MACRO_DB_DATA_DIR` or `data/`)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Indicator TOML file replacing the built-in indicator set
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch enabled indicators and store the results
    Fetch {
        /// Comma-separated indicator codes (overrides `MACRO_DB_INDICATORS` env var)
        #[arg(long)]
        indicators: Option<String>,
        /// Export in these formats after fetching (csv, json, html, all)
        #[arg(long = "export", value_name = "FORMAT", num_args = 1..)]
        export: Vec<ExportFormat>,
    },
    /// Print the latest stored value of each indicator
    Latest,
    /// Print stored observations grouped by indicator
    Dump {
        /// Only this indicator code
        #[arg(long)]
        indicator: Option<String>,
    },
    /// Write export files
    Export {
        /// Formats to write (csv, json, html, all)
        #[arg(long, value_name = "FORMAT", num_args = 1.., default_value = "all")]
        format: Vec<ExportFormat>,
    },
    /// Print recent fetch attempts, newest first
    History {
        /// Maximum number of entries
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List configured indicators
    Indicators,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .init();

    let cli = Cli::parse();
    let ctx = Context::new(cli.db, cli.data_dir, cli.config);

    match cli.command {
        None => {
            let summary = pipeline::fetch(&ctx, None).await?;
            if summary.is_total_failure() {
                log::error!("Every indicator failed; skipping export");
                return Ok(ExitCode::FAILURE);
            }
            let store = Store::open_read_only(&ctx.db_path)?;
            print!("{}", report::latest_table(&store.latest_observations()?));
            pipeline::export(&store, &ctx, &[ExportFormat::All])?;
        }
        Some(Commands::Fetch {
            indicators,
            export,
        }) => {
            let summary = pipeline::fetch(&ctx, indicators).await?;
            if summary.is_total_failure() {
                log::error!("Every indicator failed");
                return Ok(ExitCode::FAILURE);
            }
            if !export.is_empty() {
                let store = Store::open_read_only(&ctx.db_path)?;
                pipeline::export(&store, &ctx, &export)?;
            }
        }
        Some(Commands::Latest) => {
            let store = Store::open_read_only(&ctx.db_path)?;
            print!("{}", report::latest_table(&store.latest_observations()?));
        }
        Some(Commands::Dump { indicator }) => {
            let store = Store::open_read_only(&ctx.db_path)?;
            let rows = match &indicator {
                Some(code) => store.read_by_indicator(code)?,
                None => store.read_all()?,
            };
            if rows.is_empty() {
                println!(
                    "No observations stored{}",
                    indicator.map_or_else(String::new, |code| format!(" for {code}"))
                );
            } else {
                print!("{}", report::dump(&rows));
            }
        }
        Some(Commands::Export { format }) => {
            let store = Store::open_read_only(&ctx.db_path)?;
            pipeline::export(&store, &ctx, &format)?;
        }
        Some(Commands::History { limit }) => {
            let store = Store::open_read_only(&ctx.db_path)?;
            print!("{}", report::history_table(&store.read_log(limit)?));
        }
        Some(Commands::Indicators) => {
            print!("{}", report::indicators_table(&ctx.indicators()?));
        }
    }

    Ok(ExitCode::SUCCESS)
}
