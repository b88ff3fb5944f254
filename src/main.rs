//! kinclust main executable

pub mod cluster;
pub mod common;
pub mod db;
pub mod err;
pub mod ingest;
pub mod negative;

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Cluster DNA matches into family tree branches",
    long_about = "This tool ingests pairwise match and triangulation exports and \
                  partitions the kits into a user-specified family tree structure"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize a new project database.
    Init(db::init::Args),
    /// Import data files into a project database.
    Import(Import),
    /// Cluster kits to predict family tree structure.
    Cluster(cluster::Args),
}

/// Parsing of "import *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Import {
    /// The sub command to run
    #[command(subcommand)]
    command: ImportCommands,
}

/// Enum supporting the parsing of "import *" sub commands.
#[derive(Debug, Subcommand)]
enum ImportCommands {
    Matches(ingest::cli::MatchesArgs),
    Triangles(ingest::cli::TrianglesArgs),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Init(args) => {
                db::init::run(&cli.common, args)?;
            }
            Commands::Import(import) => match &import.command {
                ImportCommands::Matches(args) => {
                    ingest::cli::run_matches(&cli.common, args)?;
                }
                ImportCommands::Triangles(args) => {
                    ingest::cli::run_triangles(&cli.common, args)?;
                }
            },
            Commands::Cluster(args) => {
                cluster::run(&cli.common, args)?;
            }
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
