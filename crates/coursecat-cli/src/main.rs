//! Coursecat Command-Line Interface
//!
//! Manage catalogs, versions and approval workflows in a local database.

mod commands;
mod formatter;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use coursecat::{CatalogService, EngineConfig};
use coursecat_core::{StaticIdentity, TracingNotifier};
use formatter::OutputFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default directory for the catalog database.
pub const DEFAULT_DATA_PATH: &str = "./coursecat-data";

/// Coursecat Command-Line Interface
#[derive(Parser, Debug)]
#[command(name = "coursecat")]
#[command(version, about = "Versioned course catalogs with approval workflows")]
pub struct Args {
    /// Path to the database directory
    #[arg(short = 'd', long, default_value = DEFAULT_DATA_PATH)]
    pub data_path: PathBuf,

    /// Person the command acts on behalf of
    #[arg(short = 'a', long, default_value = "admin")]
    pub actor: String,

    /// Engine configuration file (JSON)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Retries after a concurrent modification
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Keep low-impact drafts in Draft instead of promoting them
    #[arg(long)]
    pub no_auto_promote: bool,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: commands::Command,
}

impl Args {
    /// Build the engine configuration from the config file and flags.
    pub fn engine_config(&self) -> Result<EngineConfig, coursecat_core::Error> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(retries) = self.max_retries {
            config = config.with_max_retries(retries);
        }
        if self.no_auto_promote {
            config = config.with_auto_promote(false);
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    // Logs go to stderr so JSON output stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "coursecat=info,coursecat_core=info,coursecat_cli=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.engine_config()?;

    tracing::debug!(
        data_path = %args.data_path.display(),
        actor = %args.actor,
        max_retries = config.max_retries,
        "configuration loaded"
    );

    let service = CatalogService::open(
        &args.data_path,
        config,
        Arc::new(StaticIdentity::new(args.actor.clone())),
        Arc::new(TracingNotifier),
    )?;
    let formatter = formatter::create_formatter(args.format);

    let output = commands::execute(&service, args.command, &*formatter)?;
    println!("{}", output);

    service.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from([
            "coursecat",
            "--actor",
            "registrar",
            "--max-retries",
            "5",
            "--format",
            "json",
            "compare",
            "3",
            "7",
            "--type",
            "summary",
        ])
        .unwrap();

        assert_eq!(args.actor, "registrar");
        assert_eq!(args.format, OutputFormat::Json);
        let config = args.engine_config().unwrap();
        assert_eq!(config.max_retries, 5);
        assert!(config.auto_promote_low_impact);
    }

    #[test]
    fn test_no_auto_promote_flag() {
        let args =
            Args::try_parse_from(["coursecat", "--no-auto-promote", "catalog", "list"]).unwrap();
        assert!(!args.engine_config().unwrap().auto_promote_low_impact);
        assert_eq!(args.data_path, PathBuf::from(DEFAULT_DATA_PATH));
    }
}
