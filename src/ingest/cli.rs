//! Implementation of the `import` sub commands.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::common;
use crate::db;
use crate::err::InvalidInput;
use crate::ingest::{self, gedmatch};

/// Command line arguments for the `import matches` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Import GEDmatch pairwise match files", long_about = None)]
pub struct MatchesArgs {
    /// Path to the project database.
    #[arg(long, short = 'p', default_value = "kinclust.db")]
    pub project: PathBuf,
    /// Paths to GEDmatch segment match CSV files.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Run the `import matches` sub command.
pub fn run_matches(_common: &common::Args, args: &MatchesArgs) -> Result<(), anyhow::Error> {
    let mut conn = db::open(&args.project)?;

    for path in &args.paths {
        if !gedmatch::is_match_file(path) {
            return Err(InvalidInput::UnrecognizedFile(path.display().to_string()).into());
        }
        let rows = gedmatch::read_matches(path)?;
        let batch = ingest::import_matches(&mut conn, &rows)?;
        info!(
            "imported {} match rows from {:?} as batch {}",
            rows.len(),
            path,
            batch
        );
    }

    Ok(())
}

/// Command line arguments for the `import triangles` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Import GEDmatch triangulation files", long_about = None)]
pub struct TrianglesArgs {
    /// Path to the project database.
    #[arg(long, short = 'p', default_value = "kinclust.db")]
    pub project: PathBuf,
    /// The source kit number the triangulations were exported for.
    #[arg(long)]
    pub source: String,
    /// Paths to GEDmatch triangulation CSV files.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Run the `import triangles` sub command.
pub fn run_triangles(_common: &common::Args, args: &TrianglesArgs) -> Result<(), anyhow::Error> {
    let mut conn = db::open(&args.project)?;

    for path in &args.paths {
        if !gedmatch::is_triangle_file(path) {
            return Err(InvalidInput::UnrecognizedFile(path.display().to_string()).into());
        }
        let rows = gedmatch::read_triangles(path, &args.source)?;
        let batch = ingest::import_triangles(&mut conn, &rows)?;
        info!(
            "imported {} triangle rows from {:?} as batch {}",
            rows.len(),
            path,
            batch
        );
    }

    Ok(())
}
