//! Genetic map interpolation of segment centimorgan lengths.

use std::collections::HashMap;

use rusqlite::{params, Connection};
use serde::Deserialize;

/// Coarse genetic map shipped with the tool, loaded into the `genetmap`
/// table at project initialization.
const GENETMAP_CSV: &str = include_str!("../../data/genetmap.csv");

/// One anchor point of the shipped genetic map CSV.
#[derive(Debug, Deserialize)]
struct MapRecord {
    pub chromosome: String,
    pub position: i64,
    pub cm: f64,
}

/// Load the embedded genetic map into the `genetmap` table.
pub fn load_embedded(conn: &Connection) -> Result<usize, anyhow::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(GENETMAP_CSV.as_bytes());
    let mut stmt =
        conn.prepare("INSERT INTO genetmap (chromosome, position, cm) VALUES (?1, ?2, ?3)")?;
    let mut count = 0;
    for record in reader.deserialize() {
        let record: MapRecord = record?;
        stmt.execute(params![record.chromosome, record.position, record.cm])?;
        count += 1;
    }
    Ok(count)
}

/// In-memory view of the `genetmap` table, anchors sorted by position per
/// chromosome.
#[derive(Debug)]
pub struct GeneticMap {
    anchors: HashMap<String, Vec<(i64, f64)>>,
}

impl GeneticMap {
    /// Read the genetic map back from the project database.
    pub fn load(conn: &Connection) -> Result<Self, anyhow::Error> {
        let mut stmt =
            conn.prepare("SELECT chromosome, position, cm FROM genetmap ORDER BY chromosome, position")?;
        let mut anchors: HashMap<String, Vec<(i64, f64)>> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;
        for row in rows {
            let (chromosome, position, cm) = row?;
            anchors.entry(chromosome).or_default().push((position, cm));
        }
        Ok(Self { anchors })
    }

    /// Interpolated cM position at `pos`, or `None` for a chromosome the
    /// map has no anchors for.
    ///
    /// Positions outside the anchored range use the single nearest anchor
    /// on both sides, so the 0/0 interpolation degenerates to that
    /// anchor's cM value.
    pub fn cm_at(&self, chromosome: &str, pos: i64) -> Option<f64> {
        let anchors = self.anchors.get(chromosome)?;
        let idx = anchors.partition_point(|(p, _)| *p <= pos);
        let (p1, c1) = if idx == 0 {
            anchors[0]
        } else {
            anchors[idx - 1]
        };
        let (p2, c2) = if idx == anchors.len() {
            anchors[anchors.len() - 1]
        } else {
            anchors[idx]
        };
        if p1 == p2 {
            Some(c1)
        } else {
            Some(c1 + (pos - p1) as f64 / (p2 - p1) as f64 * (c2 - c1))
        }
    }

    /// Fill in the cM length of every segment that does not have one yet.
    ///
    /// Segments with a non-null length are not touched. Returns the number
    /// of segments updated.
    pub fn fill_segment_lengths(&self, conn: &Connection) -> Result<usize, anyhow::Error> {
        let mut stmt =
            conn.prepare("SELECT id, chromosome, start_bp, end_bp FROM segment WHERE length IS NULL")?;
        let segments = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut update = conn.prepare("UPDATE segment SET length = ?2 WHERE id = ?1")?;
        for (id, chromosome, start_bp, end_bp) in &segments {
            let length = match (self.cm_at(chromosome, *start_bp), self.cm_at(chromosome, *end_bp)) {
                (Some(cm_start), Some(cm_end)) => cm_end - cm_start,
                _ => {
                    tracing::warn!(
                        "no genetic map anchors for chromosome {:?}, segment {} gets length 0",
                        chromosome,
                        id
                    );
                    0.0
                }
            };
            update.execute(params![id, length])?;
        }
        Ok(segments.len())
    }
}
