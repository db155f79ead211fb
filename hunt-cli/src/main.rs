mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{describe, list, run, status, validate};

/// Run and inspect OSINT hunts
#[derive(Parser, Debug)]
#[command(name = "hunt", version, about)]
struct Cli {
    /// Engine config file (default: $HUNT_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log engine activity to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available hunts
    List,

    /// Show a hunt's parameters and step graph
    Describe(describe::DescribeArgs),

    /// Validate the hunt catalog against the configured plugins
    Validate(validate::ValidateArgs),

    /// Run a hunt and follow its progress
    Run(run::RunArgs),

    /// Inspect recorded executions
    Status(status::StatusArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Command::List => list::execute(),
        Command::Describe(args) => describe::execute(args),
        Command::Validate(args) => validate::execute(args, config),
        Command::Run(args) => run::execute(args, config).await,
        Command::Status(args) => status::execute(args).await,
    }
}
