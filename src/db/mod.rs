//! Project database plumbing.

pub mod genetmap;
pub mod init;
pub mod schema;

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

/// Open an existing project database.
///
/// Fails if the file does not exist; `init` creates project databases.
pub fn open<P>(path: P) -> Result<Connection, anyhow::Error>
where
    P: AsRef<Path>,
{
    let conn = Connection::open_with_flags(
        path.as_ref(),
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("could not open project database {:?}", path.as_ref()))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    let version = meta_get(&conn, "schema_version")?
        .ok_or_else(|| anyhow::anyhow!("project database has no schema_version"))?;
    if version != schema::SCHEMA_VERSION {
        anyhow::bail!(
            "project database has schema version {} but this build expects {}",
            version,
            schema::SCHEMA_VERSION
        );
    }

    Ok(conn)
}

/// Open a fresh, initialized in-memory database.
pub fn open_in_memory() -> Result<Connection, anyhow::Error> {
    let mut conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::initialize(&mut conn)?;
    Ok(conn)
}

/// Read a value from the `meta` table.
pub fn meta_get(conn: &Connection, key: &str) -> Result<Option<String>, anyhow::Error> {
    let value = conn
        .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

/// Write a value to the `meta` table.
pub fn meta_set(conn: &Connection, key: &str, value: &str) -> Result<(), anyhow::Error> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2) \
         ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Increment the batch counter in the `meta` table and return the new value.
///
/// Callers run this inside the transaction that inserts the batch rows, so
/// the counter only advances when that transaction commits.
pub fn next_batch(conn: &Connection) -> Result<i64, anyhow::Error> {
    let batch: i64 = meta_get(conn, "batch")?
        .ok_or_else(|| anyhow::anyhow!("project database has no batch counter"))?
        .parse()?;
    let batch = batch + 1;
    meta_set(conn, "batch", &batch.to_string())?;
    Ok(batch)
}

/// Look up the internal id of an external kit id.
pub fn kit_id(conn: &Connection, kitid: &str) -> Result<Option<i64>, anyhow::Error> {
    let id = conn
        .query_row("SELECT id FROM kit WHERE kitid = ?1", [kitid], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}

/// Insert a kit if not yet known and return its internal id.
///
/// Pre-existing kits are left unchanged.
pub fn ensure_kit(conn: &Connection, kitid: &str) -> Result<i64, anyhow::Error> {
    conn.execute("INSERT OR IGNORE INTO kit (kitid) VALUES (?1)", [kitid])?;
    kit_id(conn, kitid)?.ok_or_else(|| anyhow::anyhow!("kit {:?} not found after insert", kitid))
}

/// Insert a segment if not yet known and return its internal id.
///
/// A length supplied for a pre-existing segment is ignored; the stored
/// segment stays unchanged.
pub fn ensure_segment(
    conn: &Connection,
    chromosome: &str,
    start_bp: i64,
    end_bp: i64,
    length: Option<f64>,
) -> Result<i64, anyhow::Error> {
    conn.execute(
        "INSERT OR IGNORE INTO segment (chromosome, start_bp, end_bp, length) \
         VALUES (?1, ?2, ?3, ?4)",
        params![chromosome, start_bp, end_bp, length],
    )?;
    let id = conn.query_row(
        "SELECT id FROM segment WHERE chromosome = ?1 AND start_bp = ?2 AND end_bp = ?3",
        params![chromosome, start_bp, end_bp],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Register a kit as a source, if not already registered.
pub fn ensure_source(conn: &Connection, kit: i64) -> Result<(), anyhow::Error> {
    conn.execute("INSERT OR IGNORE INTO source (kit) VALUES (?1)", [kit])?;
    Ok(())
}

/// Whether the kit has any triangulation data as the exporting source.
pub fn is_triangle_source(conn: &Connection, kit: i64) -> Result<bool, anyhow::Error> {
    let found = conn
        .query_row(
            "SELECT 1 FROM triangle WHERE kit1 = ?1 LIMIT 1",
            [kit],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// All internal kit ids.
pub fn all_kits(conn: &Connection) -> Result<Vec<i64>, anyhow::Error> {
    let mut stmt = conn.prepare("SELECT id FROM kit ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Map of internal kit id to external kit id.
pub fn kitid_map(conn: &Connection) -> Result<HashMap<i64, String>, anyhow::Error> {
    let mut stmt = conn.prepare("SELECT id, kitid FROM kit")?;
    let map = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(map)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    #[test]
    fn next_batch_is_monotonic() -> Result<(), anyhow::Error> {
        let conn = super::open_in_memory()?;

        assert_eq!(super::next_batch(&conn)?, 1);
        assert_eq!(super::next_batch(&conn)?, 2);
        assert_eq!(super::meta_get(&conn, "batch")?.as_deref(), Some("2"));

        Ok(())
    }

    #[test]
    fn ensure_kit_is_idempotent() -> Result<(), anyhow::Error> {
        let conn = super::open_in_memory()?;

        let a = super::ensure_kit(&conn, "A123")?;
        let b = super::ensure_kit(&conn, "B456")?;
        assert_ne!(a, b);
        assert_eq!(super::ensure_kit(&conn, "A123")?, a);
        assert_eq!(super::kit_id(&conn, "A123")?, Some(a));
        assert_eq!(super::kit_id(&conn, "missing")?, None);

        Ok(())
    }

    #[test]
    fn ensure_segment_keeps_existing_length() -> Result<(), anyhow::Error> {
        let conn = super::open_in_memory()?;

        let id = super::ensure_segment(&conn, "1", 100, 200, Some(12.5))?;
        // same triple with a different length must not overwrite
        let id2 = super::ensure_segment(&conn, "1", 100, 200, Some(99.0))?;
        assert_eq!(id, id2);
        let length: Option<f64> = conn.query_row(
            "SELECT length FROM segment WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        assert_eq!(length, Some(12.5));

        Ok(())
    }

    #[test]
    fn open_rejects_missing_file() {
        let tmp_dir = tempfile::TempDir::new().unwrap();
        let path = tmp_dir.path().join("no-such-project.db");
        assert!(super::open(path).is_err());
    }
}
