//! Database table export tool.
//!
//! This binary reads an export configuration, connects to the configured
//! database, and streams the configured tables or queries into CSV files
//! with manifest sidecars. The aggregate run result is printed to stdout as
//! JSON; logs go to stderr.
//!
//! # Security Guarantees
//! - Read-only database operations only
//! - No credentials stored or logged

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use dbextract_core::{
    Action, ExtractorConfig, ExtractorError, IncrementalState, Result, Runner,
    error::redact_database_url, logging::init_logging,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dbextract")]
#[command(about = "Database table export tool")]
#[command(version)]
#[command(long_about = "
dbextract - incremental database table exports to CSV

This tool connects to a database and exports configured tables or queries
into CSV files with manifest sidecars, optionally resuming from a watermark
persisted between runs.

SUPPORTED DATABASES:
- MySQL and compatible engines (mysql://, mariadb://)
- Redshift (redshift://, postgres://)
- Snowflake (snowflake://) [dialect only]
- Oracle (oracle://) [dialect only]

EXAMPLES:
  dbextract --config config.json --data-dir out/
  dbextract --config config.json --state state.json run
  dbextract --config config.json tables
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Export configuration file (JSON)
    #[arg(short, long, help = "Path to the export configuration file")]
    pub config: PathBuf,

    /// Output directory for CSV files and manifests
    #[arg(short, long, default_value = ".", help = "Directory for CSV output")]
    pub data_dir: PathBuf,

    /// State file persisted between runs
    #[arg(
        short,
        long,
        help = "Path to the incremental state file (read before the run, rewritten after)"
    )]
    pub state: Option<PathBuf>,

    /// Database connection URL override
    #[arg(
        long,
        env = "DATABASE_URL",
        help = "Overrides the connection URL from the configuration (credentials are sanitized in logs)"
    )]
    pub database_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the configured exports
    Run,
    /// List tables visible to the connected user
    Tables,
    /// Test the database connection
    Test,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    pub quiet: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(&cli).await {
        error!("{}", err);
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    init_logging(cli.global.verbose, cli.global.quiet)?;

    let mut config = load_config(&cli.config)?;
    if let Some(url) = &cli.database_url {
        config.connection.url = url.clone();
    }
    if let Some(action) = action_override(cli.command.as_ref()) {
        config.action = action;
    }

    info!(
        database = %redact_database_url(&config.connection.url),
        action = ?config.action,
        "Starting dbextract"
    );

    let prior_state = load_state(cli.state.as_deref())?;
    let runner = Runner::connect(&config, &cli.data_dir).await?;
    let output = runner.run(&config, &prior_state).await?;

    if let (Some(path), Some(state)) = (&cli.state, &output.state) {
        let body = serde_json::to_string_pretty(state)
            .map_err(|e| ExtractorError::serialization("encoding state", e))?;
        std::fs::write(path, body)
            .map_err(|e| ExtractorError::io(format!("writing state {}", path.display()), e))?;
    }

    let rendered = serde_json::to_string_pretty(&output)
        .map_err(|e| ExtractorError::serialization("encoding run output", e))?;
    println!("{}", rendered);

    Ok(())
}

fn action_override(command: Option<&Command>) -> Option<Action> {
    match command {
        Some(Command::Run) => Some(Action::Run),
        Some(Command::Tables) => Some(Action::GetTables),
        Some(Command::Test) => Some(Action::TestConnection),
        None => None,
    }
}

fn load_config(path: &Path) -> Result<ExtractorConfig> {
    let body = std::fs::read_to_string(path)
        .map_err(|e| ExtractorError::io(format!("reading config {}", path.display()), e))?;
    serde_json::from_str(&body)
        .map_err(|e| ExtractorError::serialization(format!("parsing config {}", path.display()), e))
}

fn load_state(path: Option<&Path>) -> Result<IncrementalState> {
    let Some(path) = path else {
        return Ok(IncrementalState::default());
    };
    if !path.exists() {
        return Ok(IncrementalState::default());
    }

    let body = std::fs::read_to_string(path)
        .map_err(|e| ExtractorError::io(format!("reading state {}", path.display()), e))?;
    serde_json::from_str(&body)
        .map_err(|e| ExtractorError::serialization(format!("parsing state {}", path.display()), e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dbextract_core::Watermark;

    #[test]
    fn test_load_state_defaults_when_absent() {
        let state = load_state(None).unwrap();
        assert_eq!(state.last_fetched_row, None);

        let state = load_state(Some(Path::new("/nonexistent/state.json"))).unwrap();
        assert_eq!(state.last_fetched_row, None);
    }

    #[test]
    fn test_load_state_reads_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"lastFetchedRow": 4}"#).unwrap();

        let state = load_state(Some(&path)).unwrap();
        assert_eq!(state.last_fetched_row, Some(Watermark::Int(4)));
    }

    #[test]
    fn test_load_config_parses_and_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "connection": {"url": "mysql://user@localhost/db"},
                "action": "testConnection"
            }"#,
        )
        .unwrap();
        assert!(load_config(&path).is_ok());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_action_override() {
        assert_eq!(action_override(Some(&Command::Run)), Some(Action::Run));
        assert_eq!(
            action_override(Some(&Command::Tables)),
            Some(Action::GetTables)
        );
        assert_eq!(
            action_override(Some(&Command::Test)),
            Some(Action::TestConnection)
        );
        assert_eq!(action_override(None), None);
    }
}
