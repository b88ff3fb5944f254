//! Relational schema of project databases.

use rusqlite::Connection;

use crate::db::genetmap;

/// Version of the schema written by [`initialize`].
pub const SCHEMA_VERSION: &str = "0.3";

/// DDL for all project tables.
///
/// Pairwise matches are stored with both permutations of `(kit1, kit2)` and
/// triangulations with all six permutations of `(kit1, kit2, kit3)`, so
/// queries never have to symmetrize at read time.
const DDL: &str = r#"
DROP TABLE IF EXISTS negative;
DROP TABLE IF EXISTS overlap;
DROP TABLE IF EXISTS triangle;
DROP TABLE IF EXISTS "match";
DROP TABLE IF EXISTS segment;
DROP TABLE IF EXISTS source;
DROP TABLE IF EXISTS genetmap;
DROP TABLE IF EXISTS kit;
DROP TABLE IF EXISTS meta;

CREATE TABLE meta (
    key TEXT NOT NULL PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE kit (
    id INTEGER NOT NULL PRIMARY KEY,
    kitid TEXT NOT NULL UNIQUE,
    name TEXT,
    email TEXT,
    sex TEXT
);

CREATE TABLE genetmap (
    chromosome TEXT NOT NULL,
    position INTEGER NOT NULL,
    cm REAL NOT NULL,
    UNIQUE (chromosome, position)
);
CREATE INDEX genetmap_chromosome ON genetmap (chromosome);

CREATE TABLE source (
    kit INTEGER NOT NULL PRIMARY KEY REFERENCES kit (id),
    match_batch INTEGER,
    triangle_batch INTEGER,
    negative_batch INTEGER
);

CREATE TABLE segment (
    id INTEGER NOT NULL PRIMARY KEY,
    chromosome TEXT NOT NULL,
    start_bp INTEGER NOT NULL,
    end_bp INTEGER NOT NULL,
    length REAL,
    UNIQUE (chromosome, start_bp, end_bp)
);
CREATE INDEX segment_chromosome ON segment (chromosome);
CREATE INDEX segment_length ON segment (length);

CREATE TABLE "match" (
    segment INTEGER NOT NULL REFERENCES segment (id),
    kit1 INTEGER NOT NULL REFERENCES kit (id),
    kit2 INTEGER NOT NULL REFERENCES kit (id),
    batch INTEGER NOT NULL,
    UNIQUE (segment, kit1, kit2)
);
CREATE INDEX match_kit1 ON "match" (kit1);
CREATE INDEX match_kit2 ON "match" (kit2);
CREATE INDEX match_batch ON "match" (batch);

CREATE TABLE triangle (
    segment INTEGER NOT NULL REFERENCES segment (id),
    kit1 INTEGER NOT NULL REFERENCES kit (id),
    kit2 INTEGER NOT NULL REFERENCES kit (id),
    kit3 INTEGER NOT NULL REFERENCES kit (id),
    batch INTEGER NOT NULL,
    UNIQUE (segment, kit1, kit2, kit3)
);
CREATE INDEX triangle_kit1 ON triangle (kit1);
CREATE INDEX triangle_kit3 ON triangle (kit3);
CREATE INDEX triangle_batch ON triangle (batch);

CREATE TABLE overlap (
    id INTEGER NOT NULL PRIMARY KEY,
    source INTEGER NOT NULL REFERENCES source (kit),
    target1 INTEGER NOT NULL REFERENCES kit (id),
    target2 INTEGER NOT NULL REFERENCES kit (id),
    segment INTEGER NOT NULL REFERENCES segment (id),
    UNIQUE (source, target1, target2, segment)
);
CREATE INDEX overlap_source ON overlap (source);

CREATE TABLE negative (
    overlap INTEGER NOT NULL REFERENCES overlap (id) ON DELETE CASCADE,
    neg_segment INTEGER NOT NULL REFERENCES segment (id) ON DELETE CASCADE,
    UNIQUE (overlap, neg_segment)
);
CREATE INDEX negative_overlap ON negative (overlap);
"#;

/// Create all tables and seed the `meta` and `genetmap` tables.
///
/// Any pre-existing tables are dropped first.
pub fn initialize(conn: &mut Connection) -> Result<(), anyhow::Error> {
    let tx = conn.transaction()?;
    tx.execute_batch(DDL)?;
    tx.execute(
        "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION],
    )?;
    tx.execute("INSERT INTO meta (key, value) VALUES ('batch', '0')", [])?;
    let n_anchors = genetmap::load_embedded(&tx)?;
    tx.commit()?;
    tracing::debug!("initialized schema {} with {} genetic map anchors", SCHEMA_VERSION, n_anchors);
    Ok(())
}
