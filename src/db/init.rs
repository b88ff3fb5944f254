//! Implementation of the `init` sub command.

use std::path::PathBuf;

use clap::Parser;
use rusqlite::Connection;
use tracing::info;

use crate::common;
use crate::db::schema;

/// Command line arguments for the `init` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Initialize a new project database", long_about = None)]
pub struct Args {
    /// Path to the project database.
    #[arg(long, short = 'p', default_value = "kinclust.db")]
    pub project: PathBuf,
    /// Force reinitialization of an existing project database.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

/// Run the `init` sub command.
pub fn run(_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    if args.project.exists() && !args.force {
        anyhow::bail!(
            "project database {:?} already exists; use --force to reinitialize",
            args.project
        );
    }

    let mut conn = Connection::open(&args.project)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::initialize(&mut conn)?;
    info!("initialized project database {:?}", args.project);

    Ok(())
}
