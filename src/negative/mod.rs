//! Negative triangulations: segment intervals where three kits should
//! triangulate but do not.
//!
//! For a source kit `s`, wherever two of its match segments (to targets
//! `t1` and `t2`) overlap, the three kits share DNA pairwise on the
//! overlap interval. The parts of that interval not covered by a positive
//! triangulation `(s, t1, t2)` are evidence that the three kits do *not*
//! descend from a common ancestor there. These intervals are materialized
//! per source and cached under a batch watermark.

use itertools::iproduct;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use crate::db;
use crate::db::genetmap::GeneticMap;

/// One match segment of the source, in base-pair coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MatchSegment {
    target: i64,
    chromosome: String,
    start_bp: i64,
    end_bp: i64,
}

/// Subintervals of `[start, end)` not covered by any of `positives`.
///
/// Walks a cursor from `start`, emitting a gap before each positive that
/// begins past the cursor. Positives may overlap each other and may extend
/// beyond the enclosing interval.
fn uncovered_intervals(start: i64, end: i64, positives: &mut Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    positives.sort_unstable();
    let mut intervals = Vec::new();
    let mut cursor = start;
    for &(p_start, p_end) in positives.iter() {
        if p_start > cursor {
            intervals.push((cursor, p_start));
        }
        cursor = cursor.max(p_end);
    }
    if cursor < end {
        intervals.push((cursor, end));
    }
    intervals
}

/// Idempotently refresh the negative-triangulation cache for `source`.
///
/// Returns `false` when the source lacks match or triangle data, `true`
/// otherwise. The cache is only rebuilt when the `negative` watermark lags
/// behind the match/triangle watermarks; the rebuild and the watermark
/// advance happen in one transaction, so partial progress is never
/// observable.
pub fn build_negative(conn: &mut Connection, source: i64) -> Result<bool, anyhow::Error> {
    let watermarks = conn
        .query_row(
            "SELECT match_batch, triangle_batch, negative_batch FROM source WHERE kit = ?1",
            [source],
            |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((match_batch, triangle_batch, negative_batch)) = watermarks else {
        return Ok(false);
    };
    let (Some(match_batch), Some(triangle_batch)) = (match_batch, triangle_batch) else {
        return Ok(false);
    };

    let target_batch = match_batch.max(triangle_batch);
    if negative_batch.map_or(false, |b| b >= target_batch) {
        debug!("negative triangulations of kit {} are up to date", source);
        return Ok(true);
    }

    let tx = conn.transaction()?;
    rebuild(&tx, source)?;
    tx.execute(
        "UPDATE source SET negative_batch = ?2 WHERE kit = ?1",
        params![source, target_batch],
    )?;
    tx.commit()?;
    debug!(
        "rebuilt negative triangulations of kit {} up to batch {}",
        source, target_batch
    );
    Ok(true)
}

/// Recompute all overlap and negative rows of the source.
fn rebuild(tx: &Transaction<'_>, source: i64) -> Result<(), anyhow::Error> {
    // negative evidence is only meaningful among kits the source has
    // positive triangulations with
    let segments = {
        let mut stmt = tx.prepare(
            "SELECT m.kit2, s.chromosome, s.start_bp, s.end_bp \
             FROM \"match\" m JOIN segment s ON m.segment = s.id \
             WHERE m.kit1 = ?1 \
               AND m.kit2 IN (SELECT DISTINCT kit2 FROM triangle WHERE kit1 = ?1)",
        )?;
        let segments = stmt
            .query_map([source], |row| {
                Ok(MatchSegment {
                    target: row.get(0)?,
                    chromosome: row.get(1)?,
                    start_bp: row.get(2)?,
                    end_bp: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        segments
    };

    // attached negative rows go with the cascade
    tx.execute("DELETE FROM overlap WHERE source = ?1", [source])?;

    let mut insert_overlap = tx.prepare(
        "INSERT OR IGNORE INTO overlap (source, target1, target2, segment) \
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (a, b) in iproduct!(&segments, &segments) {
        if a.target == b.target || a.chromosome != b.chromosome {
            continue;
        }
        if a.start_bp < b.end_bp && b.start_bp < a.end_bp {
            let start_bp = a.start_bp.max(b.start_bp);
            let end_bp = a.end_bp.min(b.end_bp);
            let segment = db::ensure_segment(tx, &a.chromosome, start_bp, end_bp, None)?;
            insert_overlap.execute(params![source, a.target, b.target, segment])?;
        }
    }
    drop(insert_overlap);

    let overlaps = {
        let mut stmt = tx.prepare(
            "SELECT o.id, o.target1, o.target2, s.chromosome, s.start_bp, s.end_bp \
             FROM overlap o JOIN segment s ON o.segment = s.id \
             WHERE o.source = ?1",
        )?;
        let overlaps = stmt
            .query_map([source], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        overlaps
    };

    let mut select_positives = tx.prepare(
        "SELECT s.start_bp, s.end_bp \
         FROM triangle t JOIN segment s ON t.segment = s.id \
         WHERE t.kit1 = ?1 AND t.kit2 = ?2 AND t.kit3 = ?3 \
           AND s.chromosome = ?4 AND s.start_bp < ?6 AND s.end_bp > ?5",
    )?;
    let mut insert_negative =
        tx.prepare("INSERT OR IGNORE INTO negative (overlap, neg_segment) VALUES (?1, ?2)")?;
    for (overlap, target1, target2, chromosome, start_bp, end_bp) in overlaps {
        let mut positives = select_positives
            .query_map(
                params![source, target1, target2, chromosome, start_bp, end_bp],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        for (neg_start, neg_end) in uncovered_intervals(start_bp, end_bp, &mut positives) {
            let segment = db::ensure_segment(tx, &chromosome, neg_start, neg_end, None)?;
            insert_negative.execute(params![overlap, segment])?;
        }
    }
    drop(select_positives);
    drop(insert_negative);

    // synthetic overlap/negative segments need cM lengths too
    GeneticMap::load(tx)?.fill_segment_lengths(tx)?;

    Ok(())
}
