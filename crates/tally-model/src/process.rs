//! Processes and process patches.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tally_core::{FingerprintBuilder, Fingerprinted, Result};
use tally_data::expr::{normalized, properties};
use tally_data::{CompiledExpr, DataLoader, LoadOptions, Table, TransientCache};

/// Column holding each source's tree weight in loaded tables.
pub const TREE_WEIGHT_PROPERTY: &str = "tree_weight";

/// A transform applied to a process' loaded data.
pub trait Patch: Send + Sync + fmt::Debug {
    /// Stable type name, part of the process fingerprint.
    fn kind(&self) -> &str;

    /// Output-affecting state.
    fn state(&self) -> Vec<String>;

    /// Columns the patch reads.
    fn properties(&self) -> BTreeSet<String>;

    /// Columns the patch creates (never loaded from the sources).
    fn defines(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Apply the patch.
    fn apply(&self, table: Table) -> Result<Table>;
}

/// Defines (or overwrites) a column from an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defined {
    name: String,
    expression: String,
}

impl Defined {
    /// Define column `name` as `expression`.
    pub fn new(name: impl Into<String>, expression: impl AsRef<str>) -> Self {
        Self { name: name.into(), expression: normalized(expression.as_ref()) }
    }
}

impl Patch for Defined {
    fn kind(&self) -> &str {
        "defined"
    }

    fn state(&self) -> Vec<String> {
        vec![self.name.clone(), self.expression.clone()]
    }

    fn properties(&self) -> BTreeSet<String> {
        properties(&self.expression)
    }

    fn defines(&self) -> BTreeSet<String> {
        BTreeSet::from([self.name.clone()])
    }

    fn apply(&self, mut table: Table) -> Result<Table> {
        let values = CompiledExpr::compile(&self.expression)?.eval_table(&table)?;
        table.insert_column(self.name.clone(), values)?;
        Ok(table)
    }
}

/// A physical process: data sources, a tree, patches and display style.
///
/// Identity (equality, hashing, fingerprint) covers files, tree and patches
/// only.
#[derive(Debug, Clone)]
pub struct Process {
    name: String,
    files: Vec<String>,
    tree: String,
    label: String,
    line_color: Option<String>,
    fill_color: Option<String>,
    marker_style: Option<u32>,
    patches: Vec<Arc<dyn Patch>>,
}

impl Process {
    /// Create a process reading `tree` from `files`.
    pub fn new<I, S>(name: impl Into<String>, files: I, tree: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            files: files.into_iter().map(Into::into).collect(),
            tree: tree.into(),
            line_color: None,
            fill_color: None,
            marker_style: None,
            patches: Vec::new(),
        }
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the line color.
    pub fn with_line_color(mut self, color: impl Into<String>) -> Self {
        self.line_color = Some(color.into());
        self
    }

    /// Set the fill color.
    pub fn with_fill_color(mut self, color: impl Into<String>) -> Self {
        self.fill_color = Some(color.into());
        self
    }

    /// Set the marker style.
    pub fn with_marker_style(mut self, style: u32) -> Self {
        self.marker_style = Some(style);
        self
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data source locators.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Tree read from every source.
    pub fn tree(&self) -> &str {
        &self.tree
    }

    /// Display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Line color, if styled.
    pub fn line_color(&self) -> Option<&str> {
        self.line_color.as_deref()
    }

    /// Fill color, if styled.
    pub fn fill_color(&self) -> Option<&str> {
        self.fill_color.as_deref()
    }

    /// Marker style, if styled.
    pub fn marker_style(&self) -> Option<u32> {
        self.marker_style
    }

    /// Applied patches, in order.
    pub fn patches(&self) -> &[Arc<dyn Patch>] {
        &self.patches
    }

    /// A copy with `patch` appended.
    pub fn patched(&self, patch: impl Patch + 'static) -> Self {
        self.patched_arc(Arc::new(patch))
    }

    /// A copy with a shared patch appended.
    pub fn patched_arc(&self, patch: Arc<dyn Patch>) -> Self {
        let mut out = self.clone();
        out.patches.push(patch);
        out
    }

    /// A copy reading a different tree.
    pub fn retreed(&self, tree: impl Into<String>) -> Self {
        let mut out = self.clone();
        out.tree = tree.into();
        out
    }

    /// Properties to read from the sources for a request: requested and
    /// patch-read columns, minus patch-defined ones.
    pub fn source_properties(&self, requested: &BTreeSet<String>) -> BTreeSet<String> {
        let mut out = requested.clone();
        for p in &self.patches {
            out.extend(p.properties());
        }
        for p in &self.patches {
            for d in p.defines() {
                out.remove(&d);
            }
        }
        out
    }

    /// Load `properties` (plus the tree-weight column) and apply patches in
    /// order. With a transient cache, tables are shared per
    /// (process, property set).
    pub fn load(
        &self,
        loader: &dyn DataLoader,
        properties: &BTreeSet<String>,
        transient: Option<&TransientCache>,
    ) -> Result<Arc<Table>> {
        let produce = || -> Result<Table> {
            let options = LoadOptions::new(&self.tree).with_tree_weight(TREE_WEIGHT_PROPERTY);
            let mut table = loader.load(&self.files, &self.source_properties(properties), &options)?;
            for patch in &self.patches {
                table = patch.apply(table)?;
            }
            Ok(table)
        };
        match transient {
            Some(cache) => {
                let mut key = FingerprintBuilder::new("load");
                key.nested(self);
                key.strs(&properties.iter().collect::<Vec<_>>());
                cache.get_or_insert(&key.finish(), produce)
            }
            None => produce().map(Arc::new),
        }
    }
}

impl Fingerprinted for Process {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("process").strs(&self.files).str(&self.tree);
        fp.u64(self.patches.len() as u64);
        for p in &self.patches {
            fp.str(p.kind()).strs(&p.state());
        }
    }
}

impl PartialEq for Process {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for Process {}

impl Hash for Process {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint().hash(state);
    }
}
