//! 🚀 dix-cli: the front door, the bouncer, the maitre d' of dix.
//!
//! 🎬 *[narrator voice]* "It all started with a folder of CSVs and a state code..."
//! 📦 This binary crate is the thin CLI wrapper that loads config, sets up logging,
//! and then lets the library do the heavy lifting. Like a manager. 🦆
//!
//! ```text
//! dix import --partition US_ID staff.csv clients.ndjson.gz
//! dix import --partition US_ID --json --config dix.toml cases.csv
//! dix serve --bind 0.0.0.0:8080 --config dix.toml
//! ```
//!
//! 🚦 Exit codes for `import`: 0 everything landed, 2 partially, 1 nothing did.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dix::{AppConfig, ImportReport, OverallStatus, StateCode};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dix", version, about = "📥 schema-driven imports for state data feeds")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 📂 Import files from disk into one partition and print the report.
    Import {
        /// 🏷️ state code the files belong to, e.g. US_ID
        #[arg(long, short)]
        partition: StateCode,
        /// 🔧 TOML config; `DIX_*` env vars apply either way
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// 🦆 print the report as JSON instead of a table
        #[arg(long)]
        json: bool,
        /// 📄 the feed files. the name decides the entity: staff.csv, clients.ndjson.gz, ...
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// 🌐 Serve the HTTP import API.
    Serve {
        #[arg(long, short, default_value = "127.0.0.1:8080")]
        bind: String,
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

/// 🔧 A config path that doesn't exist is a typo, not a request for defaults.
fn load_app_config(config: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = config {
        let exists = path.try_exists().with_context(|| {
            format!(
                "💀 Couldn't check whether the configuration file exists. Relative paths are \
                 resolved from the current directory. Was checking here: '{}'",
                path.display()
            )
        })?;
        if !exists {
            anyhow::bail!(
                "💀 Configuration file not found at '{}'. If you meant \"no file\", leave --config off.",
                path.display()
            );
        }
    }
    dix::load_config(config)
        .context("💀 In dix-cli, we couldn't load the config. Check the TOML section names and any DIX_* env vars.")
}

fn exit_code_for(report: &ImportReport) -> i32 {
    match report.overall_status {
        OverallStatus::Succeeded => 0,
        OverallStatus::PartiallySucceeded => 2,
        OverallStatus::Failed => 1,
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Import {
            partition,
            config,
            json,
            files,
        } => {
            let app_config = load_app_config(config.as_deref())?;
            let report = dix::run(app_config, partition, &files).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("💀 the report refused to become JSON")?
                );
            } else {
                println!("{}", report.render_table());
            }
            Ok(exit_code_for(&report))
        }
        Command::Serve { bind, config } => {
            let app_config = load_app_config(config.as_deref())?;
            dix::serve(app_config, &bind).await?;
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() {
    // 📡 logs go to stderr so `--json` output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
            }
            std::process::exit(1);
        }
    }
}
