//! kvbench CLI: `kvbench <command> <database> [options]`.

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use kvbench::client;
use kvbench::properties::{self, Properties};
use kvbench::shell;
use kvbench::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Command {
    /// Execute the load phase.
    Load,
    /// Execute the transaction phase.
    Run,
    /// Interactive mode.
    Shell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
    Quiet,
}

impl LogLevel {
    fn filter(self) -> &'static str {
        match self {
            LogLevel::Verbose => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Quiet => "off",
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "kvbench",
    version,
    about = "YCSB-lineage benchmark harness for key-value and record stores",
    after_help = "Databases:\n  basic   echoes operations, optionally with simulated delay\n  memory  process-shared in-memory store\n\nWorkload files:\n  Line-oriented `key = value`; `#` starts a comment."
)]
struct Cli {
    /// Command to run.
    #[arg(value_enum)]
    command: Command,

    /// Database to drive.
    database: String,

    /// Load properties from one or more workload files.
    #[arg(short = 'P', value_name = "file")]
    property_files: Vec<String>,

    /// Set one property as name=value.
    #[arg(short = 'p', value_name = "name=value")]
    property_overrides: Vec<String>,

    /// Print periodic status to stderr.
    #[arg(short = 's')]
    status: bool,

    /// Label prefixed to every status line.
    #[arg(short = 'l', value_name = "label", default_value = "")]
    label: String,

    /// Override the database (same as the `db` property).
    #[arg(long = "db", value_name = "name")]
    db: Option<String>,

    /// Override the table name.
    #[arg(long = "table", value_name = "name")]
    table: Option<String>,

    /// Log level.
    #[arg(short = 'x', value_enum, value_name = "level", default_value = "quiet")]
    log_level: LogLevel,
}

fn build_properties(cli: &Cli) -> Result<Properties, Error> {
    let mut props = Properties::new();
    props.set(properties::PROP_DB, cli.database.clone());
    for file in &cli.property_files {
        let loaded = Properties::load_file(file)?;
        props.merge(loaded);
    }
    for pair in &cli.property_overrides {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::Config(format!("invalid property: {}", pair)));
        };
        props.set(key.trim(), value.trim());
    }
    if let Some(db) = &cli.db {
        props.set(properties::PROP_DB, db.clone());
    }
    if let Some(table) = &cli.table {
        props.set(properties::PROP_TABLE_NAME, table.clone());
    }
    Ok(props)
}

/// The `dotransactions` property must agree with the chosen command.
fn check_transactions_conflict(props: &Properties, command: Command) -> Result<(), Error> {
    if let Some(raw) = props.get(properties::PROP_TRANSACTIONS) {
        let wanted: bool = raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid property dotransactions={:?}", raw)))?;
        let is_run = command == Command::Run;
        if wanted != is_run {
            return Err(Error::Config(format!(
                "property dotransactions={} conflicts with command {:?}",
                raw, command
            )));
        }
    }
    Ok(())
}

/// A missing required property exits with a distinct code (2); everything
/// else fatal exits 1.
enum CliError {
    MissingProperty(&'static str),
    Other(Error),
}

impl From<Error> for CliError {
    fn from(e: Error) -> Self {
        CliError::Other(e)
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let props = build_properties(&cli)?;

    match cli.command {
        Command::Shell => {
            let db_name = props
                .get_default(properties::PROP_DB, properties::PROP_DB_DEFAULT)
                .to_string();
            shell::run(&db_name, &props).map_err(CliError::from)
        }
        Command::Load | Command::Run => {
            check_transactions_conflict(&props, cli.command)?;
            if props.get(properties::PROP_WORKLOAD).is_none() {
                return Err(CliError::MissingProperty(properties::PROP_WORKLOAD));
            }
            let do_transactions = cli.command == Command::Run;

            eprintln!("{} {}", "kvbench".bold(), env!("CARGO_PKG_VERSION"));
            eprintln!("Loading workload...");
            let summary = client::run_benchmark(&props, do_transactions, cli.status, &cli.label)?;
            eprintln!(
                "{} {} operations in {:.3} s",
                "Finished:".bold().green(),
                summary.total_ops,
                summary.runtime.as_secs_f64()
            );
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cli.log_level.filter()))
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::MissingProperty(key)) => {
            eprintln!("Missing property: {}", key);
            ExitCode::from(2)
        }
        Err(CliError::Other(e)) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
