//! Import of match and triangulation data into a project database.

pub mod cli;
pub mod gedmatch;

use indexmap::IndexMap;
use indexmap::IndexSet;
use rusqlite::{params, Connection, Transaction};
use tracing::debug;

use crate::db;
use crate::db::genetmap::GeneticMap;

/// A normalized pairwise match row ready for import.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchRow {
    pub kit1: String,
    pub kit2: String,
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
    pub length: Option<f64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub sex: Option<String>,
}

/// A normalized triangulation row ready for import.
///
/// `kit1` is the source kit from whose perspective the triangulation was
/// exported.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TriangleRow {
    pub kit1: String,
    pub kit2: String,
    pub kit3: String,
    pub chromosome: String,
    pub start: i64,
    pub end: i64,
    pub length: Option<f64>,
    pub name2: Option<String>,
    pub email2: Option<String>,
    pub name3: Option<String>,
    pub email3: Option<String>,
}

/// Map every external kit id appearing in `kitids` to an internal id,
/// creating kits as needed.
fn internal_kit_ids<'a>(
    tx: &Transaction<'_>,
    kitids: impl Iterator<Item = &'a str>,
) -> Result<IndexMap<String, i64>, anyhow::Error> {
    let mut ids = IndexMap::new();
    for kitid in kitids {
        if !ids.contains_key(kitid) {
            let id = db::ensure_kit(tx, kitid)?;
            ids.insert(kitid.to_owned(), id);
        }
    }
    Ok(ids)
}

/// Fill in kit name/email/sex, but only while the kit's sex is still
/// unknown (first observation wins).
fn update_kit_profile(
    tx: &Transaction<'_>,
    kit: i64,
    name: Option<&str>,
    email: Option<&str>,
    sex: Option<&str>,
) -> Result<(), anyhow::Error> {
    tx.execute(
        "UPDATE kit SET name = ?2, email = ?3, sex = ?4 WHERE id = ?1 AND sex IS NULL",
        params![kit, name, email, sex],
    )?;
    Ok(())
}

/// Import pairwise matches into the project database.
///
/// All effects happen in a single transaction: kits and segments are
/// created as needed, kit metadata is filled first-observation-wins, every
/// row is stored in both orderings of `(kit1, kit2)` stamped with a fresh
/// batch number, and the `match` watermark of every source kit in the
/// batch is advanced. Returns the batch number.
pub fn import_matches(conn: &mut Connection, rows: &[MatchRow]) -> Result<i64, anyhow::Error> {
    let tx = conn.transaction()?;

    let ids = internal_kit_ids(
        &tx,
        rows.iter()
            .flat_map(|row| [row.kit1.as_str(), row.kit2.as_str()]),
    )?;

    // kit metadata from the first row mentioning each matched kit
    let mut seen = IndexSet::new();
    for row in rows {
        let kit2 = ids[row.kit2.as_str()];
        if seen.insert(kit2) {
            update_kit_profile(
                &tx,
                kit2,
                row.name.as_deref(),
                row.email.as_deref(),
                row.sex.as_deref(),
            )?;
        }
    }

    for row in rows {
        db::ensure_source(&tx, ids[row.kit1.as_str()])?;
    }

    let segments = rows
        .iter()
        .map(|row| db::ensure_segment(&tx, &row.chromosome, row.start, row.end, row.length))
        .collect::<Result<Vec<_>, _>>()?;
    GeneticMap::load(&tx)?.fill_segment_lengths(&tx)?;

    let batch = db::next_batch(&tx)?;
    let mut insert = tx.prepare(
        "INSERT OR IGNORE INTO \"match\" (segment, kit1, kit2, batch) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (row, segment) in rows.iter().zip(&segments) {
        let kit1 = ids[row.kit1.as_str()];
        let kit2 = ids[row.kit2.as_str()];
        insert.execute(params![segment, kit1, kit2, batch])?;
        insert.execute(params![segment, kit2, kit1, batch])?;
    }
    drop(insert);

    // advance the watermark for every source of this call, including
    // sources whose rows were all already known
    let mut watermark =
        tx.prepare("UPDATE source SET match_batch = ?2 WHERE kit = ?1")?;
    for kit1 in rows
        .iter()
        .map(|row| ids[row.kit1.as_str()])
        .collect::<IndexSet<_>>()
    {
        watermark.execute(params![kit1, batch])?;
    }
    drop(watermark);

    tx.commit()?;
    debug!("imported {} match rows as batch {}", rows.len(), batch);
    Ok(batch)
}

/// Import triangulations into the project database.
///
/// Like [`import_matches`], but rows are stored in all six permutations of
/// `(kit1, kit2, kit3)`, metadata is filled for `kit2`/`kit3` only, and
/// the `triangle` watermark is advanced. Returns the batch number.
pub fn import_triangles(conn: &mut Connection, rows: &[TriangleRow]) -> Result<i64, anyhow::Error> {
    let tx = conn.transaction()?;

    let ids = internal_kit_ids(
        &tx,
        rows.iter()
            .flat_map(|row| [row.kit1.as_str(), row.kit2.as_str(), row.kit3.as_str()]),
    )?;

    let mut seen = IndexSet::new();
    for row in rows {
        for (kit, name, email) in [
            (ids[row.kit2.as_str()], &row.name2, &row.email2),
            (ids[row.kit3.as_str()], &row.name3, &row.email3),
        ] {
            if name.is_none() && email.is_none() {
                continue;
            }
            if seen.insert(kit) {
                update_kit_profile(&tx, kit, name.as_deref(), email.as_deref(), None)?;
            }
        }
    }

    for row in rows {
        db::ensure_source(&tx, ids[row.kit1.as_str()])?;
    }

    let segments = rows
        .iter()
        .map(|row| db::ensure_segment(&tx, &row.chromosome, row.start, row.end, row.length))
        .collect::<Result<Vec<_>, _>>()?;
    GeneticMap::load(&tx)?.fill_segment_lengths(&tx)?;

    let batch = db::next_batch(&tx)?;
    let mut insert = tx.prepare(
        "INSERT OR IGNORE INTO triangle (segment, kit1, kit2, kit3, batch) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (row, segment) in rows.iter().zip(&segments) {
        let k1 = ids[row.kit1.as_str()];
        let k2 = ids[row.kit2.as_str()];
        let k3 = ids[row.kit3.as_str()];
        for (a, b, c) in [
            (k1, k2, k3),
            (k1, k3, k2),
            (k2, k1, k3),
            (k2, k3, k1),
            (k3, k1, k2),
            (k3, k2, k1),
        ] {
            insert.execute(params![segment, a, b, c, batch])?;
        }
    }
    drop(insert);

    let mut watermark =
        tx.prepare("UPDATE source SET triangle_batch = ?2 WHERE kit = ?1")?;
    for kit1 in rows
        .iter()
        .map(|row| ids[row.kit1.as_str()])
        .collect::<IndexSet<_>>()
    {
        watermark.execute(params![kit1, batch])?;
    }
    drop(watermark);

    tx.commit()?;
    debug!("imported {} triangle rows as batch {}", rows.len(), batch);
    Ok(batch)
}

#[cfg(test)]
pub(crate) mod testdata {
    use super::{MatchRow, TriangleRow};

    /// Match row with the given endpoints on chromosome 1 and a fixed
    /// length.
    pub fn match_row(kit1: &str, kit2: &str, start: i64, end: i64, length: f64) -> MatchRow {
        MatchRow {
            kit1: kit1.into(),
            kit2: kit2.into(),
            chromosome: "1".into(),
            start,
            end,
            length: Some(length),
            ..MatchRow::default()
        }
    }

    /// Triangle row with the given endpoints on chromosome 1 and a fixed
    /// length.
    pub fn triangle_row(
        kit1: &str,
        kit2: &str,
        kit3: &str,
        start: i64,
        end: i64,
        length: f64,
    ) -> TriangleRow {
        TriangleRow {
            kit1: kit1.into(),
            kit2: kit2.into(),
            kit3: kit3.into(),
            chromosome: "1".into(),
            start,
            end,
            length: Some(length),
            ..TriangleRow::default()
        }
    }
}
