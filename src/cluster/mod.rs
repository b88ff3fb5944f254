//! Implementation of the `cluster` sub command.

pub mod config;
pub mod engine;
pub mod graph;
pub mod output;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use clap::Parser;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::common;
use crate::db;
use crate::err::InvalidInput;
use crate::negative;

use self::config::{ClusterConfig, ConfigNode};
use self::engine::{Seed, SeedTree};
use self::graph::Graph;
use self::output::ResultRow;

/// Command line arguments for the `cluster` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Cluster kits to predict family tree structure", long_about = None)]
pub struct Args {
    /// Path to the project database.
    #[arg(long, short = 'p', default_value = "kinclust.db")]
    pub project: PathBuf,
    /// Path to the output CSV file.
    #[arg(long, short = 'o', default_value = "kinclust_results.csv")]
    pub output: PathBuf,
    /// The YAML configuration describing the desired tree structure.
    pub config: PathBuf,
}

/// Run the `cluster` sub command.
pub fn run(_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let mut conn = db::open(&args.project)?;
    let config = config::load(&args.config)?;

    let (depth, rows) = cluster_data(&mut conn, &config)?;
    output::write_clusters_path(&args.output, depth, &rows)?;
    info!("wrote {} cluster rows to {:?}", rows.len(), args.output);

    Ok(())
}

fn resolve_kit(conn: &Connection, kitid: &str) -> Result<i64, anyhow::Error> {
    db::kit_id(conn, kitid)?
        .ok_or_else(|| InvalidInput::UnknownKit(kitid.to_owned()).into())
}

/// Kits matching `kit` on the X chromosome with at least `min_length` cM.
fn x_match_kits(
    conn: &Connection,
    kit: i64,
    min_length: f64,
) -> Result<Vec<i64>, anyhow::Error> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT m.kit2 FROM \"match\" m JOIN segment s ON m.segment = s.id \
         WHERE m.kit1 = ?1 AND s.chromosome = 'X' AND s.length >= ?2 ORDER BY m.kit2",
    )?;
    let kits = stmt
        .query_map(rusqlite::params![kit, min_length], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(kits)
}

/// Kits matching `kit` anywhere with at least `threshold` cM.
fn match_neighbors(
    conn: &Connection,
    kit: i64,
    threshold: f64,
) -> Result<Vec<i64>, anyhow::Error> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT m.kit2 FROM \"match\" m JOIN segment s ON m.segment = s.id \
         WHERE m.kit1 = ?1 AND s.length >= ?2",
    )?;
    let kits = stmt
        .query_map(rusqlite::params![kit, threshold], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(kits)
}

/// Kits in any triangulation with `kit` of at least `threshold` cM.
fn triangle_neighbors(
    conn: &Connection,
    kit: i64,
    threshold: f64,
) -> Result<Vec<i64>, anyhow::Error> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT t.kit2 FROM triangle t JOIN segment s ON t.segment = s.id \
         WHERE t.kit1 = ?1 AND s.length >= ?2",
    )?;
    let kits = stmt
        .query_map(rusqlite::params![kit, threshold], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(kits)
}

/// Resolve every seed id declared anywhere in the tree.
fn declared_seeds(
    conn: &Connection,
    node: &ConfigNode,
    seen: &mut BTreeSet<i64>,
) -> Result<(), anyhow::Error> {
    for spec in &node.kits {
        seen.insert(resolve_kit(conn, &spec.id)?);
    }
    for child in [&node.paternal, &node.maternal].into_iter().flatten() {
        declared_seeds(conn, child, seen)?;
    }
    Ok(())
}

/// Build the seed tree for one config node, applying floating defaults
/// and auto-X expansion.
#[allow(clippy::too_many_arguments)]
fn build_tree(
    conn: &Connection,
    node: &ConfigNode,
    ahnentafel: u64,
    min_length: f64,
    exclude: &BTreeSet<i64>,
    seen: &mut BTreeSet<i64>,
    seed_nodes: &mut BTreeMap<i64, u64>,
) -> Result<SeedTree, anyhow::Error> {
    let mut seeds = Vec::new();
    let mut autox_kits = Vec::new();
    for spec in &node.kits {
        let kit = resolve_kit(conn, &spec.id)?;
        // an explicit float setting is authoritative; otherwise seeds
        // without triangulation data float into the branches
        let floating = match spec.float {
            Some(floating) => floating,
            None => !db::is_triangle_source(conn, kit)?,
        };
        seeds.push(Seed {
            kit,
            floating,
            negative: spec.negative,
        });
        seed_nodes.insert(kit, ahnentafel);
        if spec.autox {
            autox_kits.push(kit);
        }
    }

    let paternal = node
        .paternal
        .as_ref()
        .map(|child| {
            build_tree(
                conn,
                child,
                2 * ahnentafel,
                min_length,
                exclude,
                seen,
                seed_nodes,
            )
        })
        .transpose()?
        .map(Box::new);
    let mut maternal = node
        .maternal
        .as_ref()
        .map(|child| {
            build_tree(
                conn,
                child,
                2 * ahnentafel + 1,
                min_length,
                exclude,
                seen,
                seed_nodes,
            )
        })
        .transpose()?
        .map(Box::new);

    // kits sharing X-chromosome DNA with an autox seed must descend from
    // the node's maternal side
    for kit in autox_kits {
        for target in x_match_kits(conn, kit, min_length)? {
            if exclude.contains(&target) || !seen.insert(target) {
                continue;
            }
            let child = maternal.get_or_insert_with(|| {
                Box::new(SeedTree {
                    ahnentafel: 2 * ahnentafel + 1,
                    ..SeedTree::default()
                })
            });
            child.seeds.push(Seed {
                kit: target,
                floating: true,
                negative: false,
            });
            seed_nodes.insert(target, child.ahnentafel);
        }
    }

    Ok(SeedTree {
        ahnentafel,
        seeds,
        paternal,
        maternal,
    })
}

/// The initial kit universe: the include list with its neighbor
/// expansions plus all seeds, or every known kit; excluded kits removed.
fn population(
    conn: &Connection,
    config: &ClusterConfig,
    seed_nodes: &BTreeMap<i64, u64>,
    exclude: &BTreeSet<i64>,
) -> Result<BTreeSet<i64>, anyhow::Error> {
    let mut kits = if config.include.is_empty() {
        db::all_kits(conn)?.into_iter().collect::<BTreeSet<_>>()
    } else {
        let mut kits = BTreeSet::new();
        for spec in &config.include {
            let kit = resolve_kit(conn, &spec.id)?;
            kits.insert(kit);
            if let Some(threshold) = spec.matches {
                kits.extend(match_neighbors(conn, kit, threshold)?);
            }
            if let Some(threshold) = spec.triangles {
                kits.extend(triangle_neighbors(conn, kit, threshold)?);
            }
        }
        kits.extend(seed_nodes.keys().copied());
        kits
    };
    kits.retain(|kit| !exclude.contains(kit));
    Ok(kits)
}

/// Partition the kit population along the configured tree.
///
/// Returns the tree depth and one row per kit, sorted by external kit id.
pub fn cluster_data(
    conn: &mut Connection,
    config: &ClusterConfig,
) -> Result<(u32, Vec<ResultRow>), anyhow::Error> {
    let mut exclude = BTreeSet::new();
    for kitid in &config.exclude {
        exclude.insert(resolve_kit(conn, kitid)?);
    }

    let mut seen = BTreeSet::new();
    declared_seeds(conn, &config.tree, &mut seen)?;

    let mut seed_nodes = BTreeMap::new();
    let tree = build_tree(
        conn,
        &config.tree,
        1,
        config.min_length,
        &exclude,
        &mut seen,
        &mut seed_nodes,
    )?;

    let kits = population(conn, config, &seed_nodes, &exclude)?;
    let base = graph::base_graph(conn, config.min_length, &exclude)?;
    info!(
        "clustering {} kits over {} half-edges",
        kits.len(),
        base.edges().count()
    );

    let min_length = config.min_length;
    let mut source_neg = |kit: i64| -> Result<Graph, anyhow::Error> {
        if negative::build_negative(conn, kit)? {
            graph::negative_edges(conn, min_length, kit)
        } else {
            warn!(
                "kit {} has insufficient data for negative triangulations",
                kit
            );
            Ok(Graph::default())
        }
    };
    let rows = engine::recursive_cluster(&kits, &tree, &base, &mut source_neg)?;

    let kitids = db::kitid_map(conn)?;
    let mut result = rows
        .into_iter()
        .map(|row| ResultRow {
            kit: kitids.get(&row.kit).cloned().unwrap_or_default(),
            ahnentafel: Some(row.ahnentafel),
            seed: seed_nodes.get(&row.kit).copied(),
            labels: row.labels,
        })
        .collect::<Vec<_>>();
    result.sort_by(|a, b| a.kit.cmp(&b.kit));

    Ok((tree.depth(), result))
}
