//! Assembly of the signed weighted kit graph.

use std::collections::BTreeSet;

use rusqlite::{params, Connection};

/// Weight factor for pairwise matches relative to triangulations.
pub const PAIRWISE_FACTOR: f64 = 0.25;

/// Undirected weighted graph over kits, stored as directed half-edges in
/// both orientations.
///
/// Weights are signed: match and triangle evidence contributes positive
/// weight, negative triangulations contribute negative weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    edges: std::collections::BTreeMap<(i64, i64), f64>,
}

impl Graph {
    /// Add `weight` onto the half-edge `(kit1, kit2)`.
    pub fn add(&mut self, kit1: i64, kit2: i64, weight: f64) {
        *self.edges.entry((kit1, kit2)).or_insert(0.0) += weight;
    }

    /// Add all half-edges of `other` into this graph.
    pub fn merge(&mut self, other: &Graph) {
        for (&(kit1, kit2), &weight) in &other.edges {
            self.add(kit1, kit2, weight);
        }
    }

    /// The subgraph with both endpoints in `kits`.
    pub fn restrict(&self, kits: &BTreeSet<i64>) -> Graph {
        Graph {
            edges: self
                .edges
                .iter()
                .filter(|((kit1, kit2), _)| kits.contains(kit1) && kits.contains(kit2))
                .map(|(&key, &weight)| (key, weight))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// All half-edges as `(kit1, kit2, weight)`.
    pub fn edges(&self) -> impl Iterator<Item = (i64, i64, f64)> + '_ {
        self.edges
            .iter()
            .map(|(&(kit1, kit2), &weight)| (kit1, kit2, weight))
    }

    /// Weight of the half-edge `(kit1, kit2)`, zero when absent.
    pub fn weight(&self, kit1: i64, kit2: i64) -> f64 {
        self.edges.get(&(kit1, kit2)).copied().unwrap_or(0.0)
    }
}

/// Build the unsigned base graph from matches and positive triangulations.
///
/// Pairwise match weight is `PAIRWISE_FACTOR` times the summed segment
/// lengths; each triangle row adds its segment length onto the edge
/// `(kit1, kit2)` unless `kit3` is excluded. Only segments of at least
/// `min_length` cM count.
pub fn base_graph(
    conn: &Connection,
    min_length: f64,
    exclude: &BTreeSet<i64>,
) -> Result<Graph, anyhow::Error> {
    let mut graph = Graph::default();

    let mut stmt = conn.prepare(
        "SELECT m.kit1, m.kit2, SUM(s.length) \
         FROM \"match\" m JOIN segment s ON m.segment = s.id \
         WHERE s.length >= ?1 AND m.kit1 != m.kit2 \
         GROUP BY m.kit1, m.kit2",
    )?;
    let rows = stmt.query_map([min_length], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;
    for row in rows {
        let (kit1, kit2, weight) = row?;
        graph.add(kit1, kit2, PAIRWISE_FACTOR * weight);
    }

    let mut stmt = conn.prepare(
        "SELECT t.kit1, t.kit2, t.kit3, s.length \
         FROM triangle t JOIN segment s ON t.segment = s.id \
         WHERE s.length >= ?1 AND t.kit1 != t.kit2",
    )?;
    let rows = stmt.query_map([min_length], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, f64>(3)?,
        ))
    })?;
    for row in rows {
        let (kit1, kit2, kit3, length) = row?;
        if !exclude.contains(&kit3) {
            graph.add(kit1, kit2, length);
        }
    }

    Ok(graph)
}

/// Negative edges derived from the source's negative triangulations.
///
/// Each `(target1, target2)` pair gets minus the summed lengths of the
/// source's negative segments between them, thresholded at `min_length`.
pub fn negative_edges(
    conn: &Connection,
    min_length: f64,
    source: i64,
) -> Result<Graph, anyhow::Error> {
    let mut graph = Graph::default();

    let mut stmt = conn.prepare(
        "SELECT o.target1, o.target2, SUM(s.length) \
         FROM negative n \
         JOIN overlap o ON n.overlap = o.id \
         JOIN segment s ON n.neg_segment = s.id \
         WHERE o.source = ?1 AND s.length >= ?2 AND o.target1 != o.target2 \
         GROUP BY o.target1, o.target2",
    )?;
    let rows = stmt.query_map(params![source, min_length], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;
    for row in rows {
        let (target1, target2, weight) = row?;
        graph.add(target1, target2, -weight);
    }

    Ok(graph)
}
