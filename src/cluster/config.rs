//! Parsing and validation of the cluster configuration file.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::err::InvalidInput;

/// Default minimum segment length in cM.
pub const DEFAULT_MIN_LENGTH: f64 = 7.0;

/// An `include` list entry: a bare kit id, or a kit id with neighbor
/// expansion thresholds.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IncludeEntry {
    Id(String),
    Full(IncludeSpec),
}

/// A kit to include, optionally pulling in its match/triangle neighbors
/// above the given cM thresholds.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IncludeSpec {
    pub id: String,
    #[serde(default)]
    pub matches: Option<f64>,
    #[serde(default)]
    pub triangles: Option<f64>,
}

/// A `kits` list entry of a tree node: a bare kit id, or a kit id with
/// seed options.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedEntry {
    Id(String),
    Full(SeedSpec),
}

/// A seed kit declared at a tree node.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SeedSpec {
    pub id: String,
    /// Treat X-chromosome matches of this kit as maternal seeds.
    #[serde(default)]
    pub autox: bool,
    /// Whether the seed floats into the branches; `None` defers to the
    /// default derived from available triangulation data.
    #[serde(default, rename = "float")]
    pub float: Option<bool>,
    /// Whether to use this kit's negative triangulations.
    #[serde(default)]
    pub negative: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawNode {
    #[serde(default)]
    kits: Vec<SeedEntry>,
    #[serde(default)]
    paternal: Option<Box<RawNode>>,
    #[serde(default)]
    maternal: Option<Box<RawNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    min_length: Option<f64>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    include: Vec<IncludeEntry>,
    tree: RawNode,
}

/// One node of the configured family tree, seed entries normalized.
#[derive(Debug, Default, PartialEq)]
pub struct ConfigNode {
    pub kits: Vec<SeedSpec>,
    pub paternal: Option<Box<ConfigNode>>,
    pub maternal: Option<Box<ConfigNode>>,
}

/// Validated cluster configuration.
#[derive(Debug, PartialEq)]
pub struct ClusterConfig {
    pub min_length: f64,
    pub exclude: Vec<String>,
    pub include: Vec<IncludeSpec>,
    pub tree: ConfigNode,
}

fn normalize_seed(entry: SeedEntry) -> SeedSpec {
    match entry {
        SeedEntry::Id(id) => SeedSpec {
            id,
            autox: false,
            float: None,
            negative: false,
        },
        SeedEntry::Full(spec) => spec,
    }
}

fn normalize_node(raw: RawNode, seeds: &mut Vec<String>) -> ConfigNode {
    let kits = raw.kits.into_iter().map(normalize_seed).collect::<Vec<_>>();
    seeds.extend(kits.iter().map(|seed| seed.id.clone()));
    ConfigNode {
        kits,
        paternal: raw
            .paternal
            .map(|node| Box::new(normalize_node(*node, seeds))),
        maternal: raw
            .maternal
            .map(|node| Box::new(normalize_node(*node, seeds))),
    }
}

/// Parse and validate a cluster configuration file.
pub fn load<P>(path: P) -> Result<ClusterConfig, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    let raw: RawConfig = serde_yaml::from_reader(file)
        .map_err(|e| InvalidInput::MalformedConfig(e.to_string()))?;
    validate(raw)
}

fn validate(raw: RawConfig) -> Result<ClusterConfig, anyhow::Error> {
    let mut seeds = Vec::new();
    let tree = normalize_node(raw.tree, &mut seeds);

    let mut unique = BTreeSet::new();
    for id in &seeds {
        if !unique.insert(id.as_str()) {
            return Err(InvalidInput::DuplicateSeed(id.clone()).into());
        }
    }
    for id in &raw.exclude {
        if unique.contains(id.as_str()) {
            return Err(InvalidInput::ExcludedSeed(id.clone()).into());
        }
    }

    let include = raw
        .include
        .into_iter()
        .map(|entry| match entry {
            IncludeEntry::Id(id) => IncludeSpec {
                id,
                matches: None,
                triangles: None,
            },
            IncludeEntry::Full(spec) => spec,
        })
        .collect();

    Ok(ClusterConfig {
        min_length: raw.min_length.unwrap_or(DEFAULT_MIN_LENGTH),
        exclude: raw.exclude,
        include,
        tree,
    })
}
