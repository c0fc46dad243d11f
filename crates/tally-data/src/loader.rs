//! Data loaders: read named properties of one tree from a set of locators.
//!
//! A locator names one data source (a file path for [`JsonLoader`], an
//! arbitrary key for [`MemoryLoader`]). Each source may carry a tree weight,
//! a per-source normalization factor exposed as an extra column when
//! [`LoadOptions::tree_weight_property`] is set.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use tally_core::{Error, Result};

use crate::table::Table;

/// Per-load options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Tree to read within every source.
    pub tree: String,
    /// If set, append a column with this name holding each source's tree weight.
    pub tree_weight_property: Option<String>,
}

impl LoadOptions {
    /// Options reading `tree` without a tree-weight column.
    pub fn new(tree: impl Into<String>) -> Self {
        Self { tree: tree.into(), tree_weight_property: None }
    }

    /// Request a tree-weight column.
    pub fn with_tree_weight(mut self, property: impl Into<String>) -> Self {
        self.tree_weight_property = Some(property.into());
        self
    }
}

/// Reads event tables.
pub trait DataLoader: Send + Sync {
    /// Load `properties` of `options.tree` from every locator, concatenated
    /// in locator order. Missing sources, trees or properties are errors.
    fn load(
        &self,
        locators: &[String],
        properties: &BTreeSet<String>,
        options: &LoadOptions,
    ) -> Result<Table>;

    /// Loader name (for logs).
    fn name(&self) -> &str;
}

/// One source's trees and weight.
#[derive(Debug, Clone, Deserialize)]
struct Source {
    #[serde(default = "unit_weight")]
    tree_weight: f64,
    trees: HashMap<String, BTreeMap<String, Vec<f64>>>,
}

fn unit_weight() -> f64 {
    1.0
}

/// Project one tree of a source onto the requested properties.
fn project(
    locator: &str,
    source: &Source,
    properties: &BTreeSet<String>,
    options: &LoadOptions,
) -> Result<Table> {
    let tree = source.trees.get(&options.tree).ok_or_else(|| {
        Error::Data(format!("source '{}' has no tree '{}'", locator, options.tree))
    })?;
    let n_rows = tree.values().next().map(Vec::len).unwrap_or(0);
    let mut table = Table::new();
    let mut needed = properties.clone();
    if let Some(tw) = &options.tree_weight_property {
        needed.remove(tw);
    }
    for p in &needed {
        let col = tree.get(p).ok_or_else(|| {
            Error::Data(format!(
                "source '{}' tree '{}' has no property '{}'",
                locator, options.tree, p
            ))
        })?;
        table.insert_column(p.clone(), col.clone())?;
    }
    if let Some(tw) = &options.tree_weight_property {
        table.insert_column(tw.clone(), vec![source.tree_weight; n_rows])?;
    }
    Ok(table)
}

fn concat(
    locators: &[String],
    properties: &BTreeSet<String>,
    options: &LoadOptions,
    mut source: impl FnMut(&str) -> Result<Source>,
) -> Result<Table> {
    let mut out = Table::new();
    for locator in locators {
        let src = source(locator)?;
        out.append(project(locator, &src, properties, options)?)?;
    }
    Ok(out)
}

// ── In-memory loader ───────────────────────────────────────────

/// Loader over tables registered in memory. Counts its loads.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    sources: HashMap<String, Source>,
    loads: AtomicUsize,
}

impl MemoryLoader {
    /// Empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `table` as tree `tree` of source `locator`.
    pub fn with_tree(mut self, locator: impl Into<String>, tree: impl Into<String>, table: Table) -> Self {
        let columns: BTreeMap<String, Vec<f64>> = table
            .column_names()
            .map(|n| (n.to_string(), table.column(n).map(<[f64]>::to_vec).unwrap_or_default()))
            .collect();
        self.sources
            .entry(locator.into())
            .or_insert_with(|| Source { tree_weight: 1.0, trees: HashMap::new() })
            .trees
            .insert(tree.into(), columns);
        self
    }

    /// Set the tree weight of source `locator`.
    pub fn with_tree_weight(mut self, locator: impl Into<String>, weight: f64) -> Self {
        self.sources
            .entry(locator.into())
            .or_insert_with(|| Source { tree_weight: 1.0, trees: HashMap::new() })
            .tree_weight = weight;
        self
    }

    /// Number of `load` calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DataLoader for MemoryLoader {
    fn load(
        &self,
        locators: &[String],
        properties: &BTreeSet<String>,
        options: &LoadOptions,
    ) -> Result<Table> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            loader = "memory",
            sources = locators.len(),
            properties = properties.len(),
            tree = %options.tree,
            "loading"
        );
        concat(locators, properties, options, |locator| {
            self.sources
                .get(locator)
                .cloned()
                .ok_or_else(|| Error::Data(format!("unknown source '{}'", locator)))
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ── JSON file loader ───────────────────────────────────────────

/// Loader over JSON files of the form
/// `{"tree_weight": 1.0, "trees": {"<tree>": {"<property>": [..]}}}`.
///
/// Relative locators resolve against the base directory.
#[derive(Debug, Clone, Default)]
pub struct JsonLoader {
    base_dir: Option<PathBuf>,
}

impl JsonLoader {
    /// Loader resolving relative locators against the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative locators against `dir`.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl DataLoader for JsonLoader {
    fn load(
        &self,
        locators: &[String],
        properties: &BTreeSet<String>,
        options: &LoadOptions,
    ) -> Result<Table> {
        tracing::debug!(
            loader = "json",
            sources = locators.len(),
            properties = properties.len(),
            tree = %options.tree,
            "loading"
        );
        concat(locators, properties, options, |locator| {
            let path = self.resolve(locator);
            let bytes = std::fs::read(&path).map_err(|e| {
                Error::Data(format!("cannot read source '{}': {}", path.display(), e))
            })?;
            Ok(serde_json::from_slice(&bytes)?)
        })
    }

    fn name(&self) -> &str {
        "json"
    }
}
