//! Recursive seeded bipartitioning of the kit graph.

use std::collections::{BTreeMap, BTreeSet};

use strum_macros::{Display, EnumString};

use crate::cluster::graph::Graph;

/// The two sides of a split, named after the parent they descend from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
pub enum Branch {
    #[strum(serialize = "P")]
    Paternal,
    #[strum(serialize = "M")]
    Maternal,
}

impl Branch {
    /// Ahnentafel number of this branch under parent `ahnentafel`.
    pub fn child_ahnentafel(&self, ahnentafel: u64) -> u64 {
        match self {
            Branch::Paternal => 2 * ahnentafel,
            Branch::Maternal => 2 * ahnentafel + 1,
        }
    }
}

/// A seed kit anchoring part of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    /// Internal kit id.
    pub kit: i64,
    /// Whether the seed may migrate into descendant nodes or stays pinned
    /// at the node it is declared on.
    pub floating: bool,
    /// Whether to bring the kit's negative triangulations into the split
    /// at this node.
    pub negative: bool,
}

/// A node of the user-configured family tree, carrying its seeds and up to
/// two child branches.
#[derive(Debug, Default)]
pub struct SeedTree {
    /// Ahnentafel number of this node; the root is 1.
    pub ahnentafel: u64,
    /// Seeds declared at this node.
    pub seeds: Vec<Seed>,
    /// Paternal child branch, if configured.
    pub paternal: Option<Box<SeedTree>>,
    /// Maternal child branch, if configured.
    pub maternal: Option<Box<SeedTree>>,
}

impl SeedTree {
    /// The configured children together with their branch labels.
    pub fn children(&self) -> impl Iterator<Item = (Branch, &SeedTree)> {
        [
            (Branch::Paternal, &self.paternal),
            (Branch::Maternal, &self.maternal),
        ]
        .into_iter()
        .filter_map(|(branch, child)| child.as_deref().map(|child| (branch, child)))
    }

    /// Depth of the subtree: number of split levels below this node.
    pub fn depth(&self) -> u32 {
        self.children()
            .map(|(_, child)| 1 + child.depth())
            .max()
            .unwrap_or(0)
    }

    /// All seeds of this subtree, this node's included.
    pub fn flatten(&self) -> Vec<&Seed> {
        let mut seeds = Vec::new();
        self.collect_seeds(&mut seeds);
        seeds
    }

    fn collect_seeds<'a>(&'a self, seeds: &mut Vec<&'a Seed>) {
        for (_, child) in self.children() {
            child.collect_seeds(seeds);
        }
        seeds.extend(self.seeds.iter());
    }
}

/// Label assignment for one kit after propagation.
#[derive(Debug, Clone, PartialEq)]
pub struct KitLabel {
    pub kit: i64,
    pub label: Option<Branch>,
    pub confidence: f64,
}

/// Per-vertex signed sums against the current labels.
fn branch_pull(
    adjacency: &BTreeMap<i64, Vec<(i64, f64)>>,
    labels: &BTreeMap<i64, Option<Branch>>,
    kit: i64,
) -> f64 {
    let mut paternal = 0.0;
    for &(target, weight) in adjacency.get(&kit).into_iter().flatten() {
        match labels.get(&target) {
            Some(Some(Branch::Paternal)) => paternal += weight,
            Some(Some(Branch::Maternal)) => paternal -= weight,
            _ => {}
        }
    }
    paternal
}

/// Assign a branch to every vertex reachable from the seeds by constrained
/// label propagation over signed weights.
///
/// Each round recomputes, for every vertex, the difference `paternal`
/// between the weight pulling it paternal and maternal and the confidence
/// `|paternal| / Σ|w|`; the unlabeled-or-contradicted vertex with the
/// highest positive confidence flips. The loop stops when no vertex
/// qualifies, or after `max_rounds` rounds (default `2·|vertices|`; the
/// greedy relaxation has no convergence proof). With `fix_seeds`, seed
/// vertices never flip.
pub fn get_clusters(
    graph: &Graph,
    seeds: &BTreeMap<i64, Branch>,
    fix_seeds: bool,
    max_rounds: Option<usize>,
) -> Vec<KitLabel> {
    let mut weights: BTreeMap<i64, f64> = BTreeMap::new();
    let mut adjacency: BTreeMap<i64, Vec<(i64, f64)>> = BTreeMap::new();
    for (kit1, kit2, weight) in graph.edges() {
        if weight != 0.0 {
            *weights.entry(kit1).or_insert(0.0) += weight.abs();
            adjacency.entry(kit1).or_default().push((kit2, weight));
        }
    }

    let mut labels: BTreeMap<i64, Option<Branch>> = weights
        .keys()
        .map(|&kit| (kit, seeds.get(&kit).copied()))
        .collect();

    let max_rounds = max_rounds.unwrap_or(2 * labels.len());
    for _ in 0..max_rounds {
        let mut best: Option<(f64, i64, Branch)> = None;
        for (&kit, &label) in &labels {
            if fix_seeds && seeds.contains_key(&kit) {
                continue;
            }
            let paternal = branch_pull(&adjacency, &labels, kit);
            let contradicted = match label {
                None => true,
                Some(Branch::Paternal) => paternal < 0.0,
                Some(Branch::Maternal) => paternal > 0.0,
            };
            let confidence = paternal.abs() / weights[&kit];
            if contradicted && confidence > 0.0 && best.map_or(true, |(c, _, _)| confidence > c) {
                let side = if paternal > 0.0 {
                    Branch::Paternal
                } else {
                    Branch::Maternal
                };
                best = Some((confidence, kit, side));
            }
        }
        let Some((_, kit, side)) = best else {
            break;
        };
        labels.insert(kit, Some(side));
    }

    let mut result: Vec<KitLabel> = labels
        .iter()
        .map(|(&kit, &label)| {
            let paternal = branch_pull(&adjacency, &labels, kit);
            KitLabel {
                kit,
                label,
                confidence: paternal.abs() / weights[&kit],
            }
        })
        .collect();
    // seeds with no qualifying edges still carry their label
    for (&kit, &branch) in seeds {
        if !labels.contains_key(&kit) {
            result.push(KitLabel {
                kit,
                label: Some(branch),
                confidence: 0.0,
            });
        }
    }
    result
}

/// One output row of the cluster engine, in internal kit ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRow {
    pub kit: i64,
    /// Ahnentafel number of the node the kit ended up on.
    pub ahnentafel: u64,
    /// Per-depth label and confidence; `None` for a kit that stayed
    /// unlabeled at that depth.
    pub labels: BTreeMap<u32, (Option<Branch>, f64)>,
}

impl ClusterRow {
    fn pinned(kit: i64, ahnentafel: u64) -> Self {
        Self {
            kit,
            ahnentafel,
            labels: BTreeMap::new(),
        }
    }
}

/// Recursively split `kits` along the seed tree.
///
/// `graph` is the unsigned base graph restricted to the current
/// population; `source_neg` produces the negative edges of a seed kit on
/// demand. Every kit of `kits` gets exactly one row.
pub fn recursive_cluster(
    kits: &BTreeSet<i64>,
    tree: &SeedTree,
    graph: &Graph,
    source_neg: &mut dyn FnMut(i64) -> Result<Graph, anyhow::Error>,
) -> Result<Vec<ClusterRow>, anyhow::Error> {
    let depth = tree.ahnentafel.ilog2();
    let mut rows = Vec::new();

    // negative evidence of this node's seeds only applies at this node
    // and below, never to the graph handed back to siblings
    let mut signed = graph.clone();
    for seed in &tree.seeds {
        if seed.negative {
            signed.merge(&source_neg(seed.kit)?);
        }
    }

    let pinned: BTreeSet<i64> = tree
        .seeds
        .iter()
        .filter(|seed| !seed.floating)
        .map(|seed| seed.kit)
        .collect();
    for &kit in pinned.intersection(kits) {
        rows.push(ClusterRow::pinned(kit, tree.ahnentafel));
    }

    let remaining: BTreeSet<i64> = kits.difference(&pinned).copied().collect();
    let graph = graph.restrict(&remaining);
    let signed = signed.restrict(&remaining);

    if tree.children().next().is_none() || remaining.is_empty() || signed.is_empty() {
        for &kit in &remaining {
            rows.push(ClusterRow::pinned(kit, tree.ahnentafel));
        }
        return Ok(rows);
    }

    let mut seed_labels: BTreeMap<i64, Branch> = BTreeMap::new();
    for (branch, child) in tree.children() {
        for seed in child.flatten() {
            if remaining.contains(&seed.kit) {
                seed_labels.insert(seed.kit, branch);
            }
        }
    }

    let assignments: BTreeMap<i64, (Option<Branch>, f64)> =
        get_clusters(&signed, &seed_labels, true, None)
            .into_iter()
            .map(|label| (label.kit, (label.label, label.confidence)))
            .collect();

    let mut sides: BTreeMap<Branch, BTreeSet<i64>> = BTreeMap::new();
    for &kit in &remaining {
        match assignments.get(&kit) {
            Some(&(Some(branch), _)) => {
                sides.entry(branch).or_default().insert(kit);
            }
            Some(&(None, confidence)) => {
                let mut row = ClusterRow::pinned(kit, tree.ahnentafel);
                row.labels.insert(depth, (None, confidence));
                rows.push(row);
            }
            None => {
                // vertex without edges: stays at this node
                let mut row = ClusterRow::pinned(kit, tree.ahnentafel);
                row.labels.insert(depth, (None, 0.0));
                rows.push(row);
            }
        }
    }

    for (branch, members) in sides {
        let confidence_of = |kit: i64| assignments.get(&kit).map_or(0.0, |&(_, c)| c);
        match tree.children().find(|(b, _)| *b == branch) {
            Some((_, child)) => {
                for mut row in recursive_cluster(&members, child, &graph, source_neg)? {
                    row.labels
                        .insert(depth, (Some(branch), confidence_of(row.kit)));
                    rows.push(row);
                }
            }
            None => {
                // labeled toward a branch the tree does not descend into
                // (possible with negative weights); park the kit there
                for &kit in &members {
                    let mut row =
                        ClusterRow::pinned(kit, branch.child_ahnentafel(tree.ahnentafel));
                    row.labels.insert(depth, (Some(branch), confidence_of(kit)));
                    rows.push(row);
                }
            }
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod test {
    use std::collections::{BTreeMap, BTreeSet};

    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    use super::{Branch, ClusterRow, Seed, SeedTree};
    use crate::cluster::graph::Graph;

    fn seed(kit: i64) -> Seed {
        Seed {
            kit,
            floating: true,
            negative: false,
        }
    }

    fn leaf(ahnentafel: u64, seeds: Vec<Seed>) -> SeedTree {
        SeedTree {
            ahnentafel,
            seeds,
            ..SeedTree::default()
        }
    }

    /// Symmetric helper: adds both half-edges.
    fn edge(graph: &mut Graph, a: i64, b: i64, weight: f64) {
        graph.add(a, b, weight);
        graph.add(b, a, weight);
    }

    fn no_negatives(_: i64) -> Result<Graph, anyhow::Error> {
        Ok(Graph::default())
    }

    #[test]
    fn branch_formatting_round_trips() {
        assert_eq!(Branch::Paternal.to_string(), "P");
        assert_eq!("M".parse::<Branch>().unwrap(), Branch::Maternal);
        assert_eq!(Branch::Paternal.child_ahnentafel(3), 6);
        assert_eq!(Branch::Maternal.child_ahnentafel(3), 7);
    }

    #[test]
    fn get_clusters_propagates_from_seeds() {
        let mut graph = Graph::default();
        edge(&mut graph, 1, 3, 10.0);
        edge(&mut graph, 2, 4, 10.0);
        edge(&mut graph, 3, 4, 1.0);
        let seeds = BTreeMap::from([(1, Branch::Paternal), (2, Branch::Maternal)]);

        let labels: BTreeMap<i64, Option<Branch>> =
            super::get_clusters(&graph, &seeds, true, None)
                .into_iter()
                .map(|label| (label.kit, label.label))
                .collect();

        assert_eq!(labels[&1], Some(Branch::Paternal));
        assert_eq!(labels[&2], Some(Branch::Maternal));
        assert_eq!(labels[&3], Some(Branch::Paternal));
        assert_eq!(labels[&4], Some(Branch::Maternal));
    }

    #[test]
    fn get_clusters_balanced_ties_stay_unlabeled() {
        // kits 3 and 4 are pulled equally to both sides
        let mut graph = Graph::default();
        for kit in [3, 4] {
            edge(&mut graph, 1, kit, 10.0);
            edge(&mut graph, 2, kit, 10.0);
        }
        edge(&mut graph, 3, 4, 10.0);
        let seeds = BTreeMap::from([(1, Branch::Paternal), (2, Branch::Maternal)]);

        let labels = super::get_clusters(&graph, &seeds, true, None);

        for label in labels {
            match label.kit {
                1 => assert_eq!(label.label, Some(Branch::Paternal)),
                2 => assert_eq!(label.label, Some(Branch::Maternal)),
                _ => assert!(approx_eq!(f64, label.confidence, 0.0, ulps = 2)),
            }
        }
    }

    #[test]
    fn get_clusters_negative_weight_repels() {
        // kit 3 is connected to the paternal seed but repelled from it by
        // a stronger negative edge
        let mut graph = Graph::default();
        edge(&mut graph, 1, 3, 2.0);
        edge(&mut graph, 1, 3, -10.0);
        edge(&mut graph, 2, 5, 1.0);
        let seeds = BTreeMap::from([(1, Branch::Paternal), (2, Branch::Maternal)]);

        let labels: BTreeMap<i64, Option<Branch>> =
            super::get_clusters(&graph, &seeds, true, None)
                .into_iter()
                .map(|label| (label.kit, label.label))
                .collect();

        assert_eq!(labels[&3], Some(Branch::Maternal));
        assert_eq!(labels[&5], Some(Branch::Maternal));
    }

    #[test]
    fn get_clusters_isolated_seed_keeps_label() {
        let mut graph = Graph::default();
        edge(&mut graph, 1, 3, 5.0);
        let seeds = BTreeMap::from([(1, Branch::Paternal), (9, Branch::Maternal)]);

        let labels = super::get_clusters(&graph, &seeds, true, None);

        let isolated = labels.iter().find(|label| label.kit == 9).unwrap();
        assert_eq!(isolated.label, Some(Branch::Maternal));
        assert!(approx_eq!(f64, isolated.confidence, 0.0, ulps = 2));
    }

    #[test]
    fn get_clusters_respects_round_cap() {
        let mut graph = Graph::default();
        edge(&mut graph, 1, 3, 5.0);
        edge(&mut graph, 3, 4, 5.0);
        let seeds = BTreeMap::from([(1, Branch::Paternal)]);

        // one round: only the strongest-pulled vertex gets its label
        let labels: BTreeMap<i64, Option<Branch>> =
            super::get_clusters(&graph, &seeds, true, Some(1))
                .into_iter()
                .map(|label| (label.kit, label.label))
                .collect();

        assert_eq!(labels.values().filter(|label| label.is_some()).count(), 2);
        assert_eq!(labels[&4], None);
    }

    #[test]
    fn two_kit_split_preserves_seeds() -> Result<(), anyhow::Error> {
        // scenario: four kits, seeds 1 -> P and 2 -> M at the root
        let mut graph = Graph::default();
        edge(&mut graph, 1, 3, 2.5);
        edge(&mut graph, 1, 4, 2.5);
        edge(&mut graph, 2, 3, 2.5);
        edge(&mut graph, 2, 4, 2.5);
        edge(&mut graph, 3, 4, 2.5);
        let tree = SeedTree {
            ahnentafel: 1,
            seeds: vec![],
            paternal: Some(Box::new(leaf(2, vec![seed(1)]))),
            maternal: Some(Box::new(leaf(3, vec![seed(2)]))),
        };
        let kits = BTreeSet::from([1, 2, 3, 4]);

        let rows = super::recursive_cluster(&kits, &tree, &graph, &mut no_negatives)?;

        assert_eq!(rows.len(), 4);
        let by_kit: BTreeMap<i64, &ClusterRow> =
            rows.iter().map(|row| (row.kit, row)).collect();
        assert_eq!(by_kit[&1].ahnentafel, 2);
        assert_eq!(by_kit[&1].labels[&0].0, Some(Branch::Paternal));
        assert_eq!(by_kit[&2].ahnentafel, 3);
        assert_eq!(by_kit[&2].labels[&0].0, Some(Branch::Maternal));
        // kits 3 and 4 are balanced between both sides; wherever they
        // land, they carry a depth-0 entry
        for kit in [3, 4] {
            assert!(by_kit[&kit].labels.contains_key(&0));
        }

        Ok(())
    }

    #[test]
    fn nonfloat_seed_is_pinned() -> Result<(), anyhow::Error> {
        let mut graph = Graph::default();
        edge(&mut graph, 1, 3, 5.0);
        edge(&mut graph, 2, 4, 5.0);
        edge(&mut graph, 5, 1, 5.0);
        let tree = SeedTree {
            ahnentafel: 1,
            seeds: vec![Seed {
                kit: 5,
                floating: false,
                negative: false,
            }],
            paternal: Some(Box::new(leaf(2, vec![seed(1)]))),
            maternal: Some(Box::new(leaf(3, vec![seed(2)]))),
        };
        let kits = BTreeSet::from([1, 2, 3, 4, 5]);

        let rows = super::recursive_cluster(&kits, &tree, &graph, &mut no_negatives)?;

        let by_kit: BTreeMap<i64, &ClusterRow> =
            rows.iter().map(|row| (row.kit, row)).collect();
        // pinned at the root, no depth-0 label, despite its strong edge
        // toward the paternal side
        assert_eq!(by_kit[&5].ahnentafel, 1);
        assert!(by_kit[&5].labels.is_empty());
        assert_eq!(by_kit[&3].ahnentafel, 2);
        assert_eq!(by_kit[&4].ahnentafel, 3);

        Ok(())
    }

    #[test]
    fn floating_seed_migrates() -> Result<(), anyhow::Error> {
        let mut graph = Graph::default();
        edge(&mut graph, 1, 5, 5.0);
        edge(&mut graph, 2, 6, 5.0);
        let tree = SeedTree {
            ahnentafel: 1,
            seeds: vec![seed(5)],
            paternal: Some(Box::new(leaf(2, vec![seed(1)]))),
            maternal: Some(Box::new(leaf(3, vec![seed(2)]))),
        };
        let kits = BTreeSet::from([1, 2, 5, 6]);

        let rows = super::recursive_cluster(&kits, &tree, &graph, &mut no_negatives)?;

        let by_kit: BTreeMap<i64, &ClusterRow> =
            rows.iter().map(|row| (row.kit, row)).collect();
        // the floating root seed participates as an ordinary vertex and
        // migrates into the paternal branch
        assert_eq!(by_kit[&5].ahnentafel, 2);
        assert_eq!(by_kit[&5].labels[&0].0, Some(Branch::Paternal));

        Ok(())
    }

    #[test]
    fn two_level_tree_yields_depth_columns() -> Result<(), anyhow::Error> {
        let mut graph = Graph::default();
        // paternal side splits again between kits 1 (PP) and 5 (PM)
        edge(&mut graph, 1, 3, 10.0);
        edge(&mut graph, 5, 3, 1.0);
        edge(&mut graph, 2, 4, 10.0);
        let tree = SeedTree {
            ahnentafel: 1,
            seeds: vec![],
            paternal: Some(Box::new(SeedTree {
                ahnentafel: 2,
                seeds: vec![],
                paternal: Some(Box::new(leaf(4, vec![seed(1)]))),
                maternal: Some(Box::new(leaf(5, vec![seed(5)]))),
            })),
            maternal: Some(Box::new(leaf(3, vec![seed(2)]))),
        };
        assert_eq!(tree.depth(), 2);
        let kits = BTreeSet::from([1, 2, 3, 4, 5]);

        let rows = super::recursive_cluster(&kits, &tree, &graph, &mut no_negatives)?;

        let by_kit: BTreeMap<i64, &ClusterRow> =
            rows.iter().map(|row| (row.kit, row)).collect();
        assert_eq!(by_kit[&3].ahnentafel, 4);
        assert_eq!(by_kit[&3].labels[&0].0, Some(Branch::Paternal));
        assert_eq!(by_kit[&3].labels[&1].0, Some(Branch::Paternal));
        assert_eq!(by_kit[&4].ahnentafel, 3);
        assert_eq!(by_kit[&4].labels[&0].0, Some(Branch::Maternal));
        assert!(!by_kit[&4].labels.contains_key(&1));

        Ok(())
    }

    #[test]
    fn negative_seed_changes_partition() -> Result<(), anyhow::Error> {
        // without negatives kit 3 leans paternal; the negative evidence
        // of root seed 9 overturns that
        let mut graph = Graph::default();
        edge(&mut graph, 1, 3, 4.0);
        edge(&mut graph, 2, 3, 3.0);
        let tree = SeedTree {
            ahnentafel: 1,
            seeds: vec![Seed {
                kit: 9,
                floating: true,
                negative: true,
            }],
            paternal: Some(Box::new(leaf(2, vec![seed(1)]))),
            maternal: Some(Box::new(leaf(3, vec![seed(2)]))),
        };
        let kits = BTreeSet::from([1, 2, 3]);

        let mut source_neg = |kit: i64| {
            assert_eq!(kit, 9);
            let mut negatives = Graph::default();
            edge(&mut negatives, 1, 3, -8.0);
            Ok(negatives)
        };
        let rows = super::recursive_cluster(&kits, &tree, &graph, &mut source_neg)?;

        let by_kit: BTreeMap<i64, &ClusterRow> =
            rows.iter().map(|row| (row.kit, row)).collect();
        assert_eq!(by_kit[&3].labels[&0].0, Some(Branch::Maternal));
        assert_eq!(by_kit[&3].ahnentafel, 3);

        Ok(())
    }
}
