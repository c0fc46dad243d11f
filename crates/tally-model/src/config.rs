//! YAML analysis configuration.
//!
//! [`load_config`] reads a YAML mapping and, if a sibling
//! `<stem>.local.yml` exists, overwrites its top-level keys with the local
//! file's. This lets analysts share a configuration while keeping personal
//! paths out of it.
//!
//! ```yaml
//! processes:
//!   ttbar:
//!     files: [ttbar_a.json, ttbar_b.json]
//!     tree: nominal
//!     label: "t#bar{t}"
//!     defines:
//!       - {name: ht, expression: "jet_pt_0 + jet_pt_1"}
//! regions:
//!   signal:
//!     selection: "njet >= 4 && ht > 300"
//!     weight: "weight_mc * tree_weight"
//! distributions:
//!   ht:
//!     expressions: [ht]
//!     binnings: [{low: 0, high: 1000, n_bins: 20}]
//! estimations:
//!   ttbar_from_control:
//!     process: ttbar
//!     method: linear
//!     terms:
//!       - {coefficient: 1.0, region: control, reweights: ["tf"]}
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tally_core::{Binning, Error, Result};

use crate::distribution::Distribution;
use crate::process::{Defined, Process};
use crate::region::{Filtered, Region, Reweighted};

/// Path of the local override for `path` (`a/b.yml` → `a/b.local.yml`).
pub fn local_override_path(path: &Path) -> PathBuf {
    path.with_extension("local.yml")
}

fn read_yaml(path: &Path) -> Result<serde_yaml_ng::Value> {
    let bytes = std::fs::read(path)?;
    serde_yaml_ng::from_slice(&bytes)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Load a YAML configuration with its optional `.local.yml` override.
///
/// A missing (or non-file) base path is an error; a missing override is not.
pub fn load_config<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::Config(format!("invalid configuration path: {}", path.display())));
    }
    let mut value = read_yaml(path)?;

    let local = local_override_path(path);
    if local.is_file() {
        let overrides = read_yaml(&local)?;
        match (&mut value, overrides) {
            (serde_yaml_ng::Value::Mapping(base), serde_yaml_ng::Value::Mapping(over)) => {
                for (k, v) in over {
                    base.insert(k, v);
                }
            }
            (_, serde_yaml_ng::Value::Null) => {}
            _ => {
                return Err(Error::Config(format!(
                    "{} and {} must both be mappings",
                    path.display(),
                    local.display()
                )));
            }
        }
        tracing::debug!(path = %path.display(), local = %local.display(), "merged local configuration");
    }

    serde_yaml_ng::from_value(value)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

// ── Records ────────────────────────────────────────────────────

fn default_tree() -> String {
    "nominal".to_string()
}

fn yes() -> bool {
    true
}

/// A column definition patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefineConfig {
    /// Column name.
    pub name: String,
    /// Defining expression.
    pub expression: String,
}

/// A process record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    /// Data source locators.
    pub files: Vec<String>,
    /// Tree name.
    #[serde(default = "default_tree")]
    pub tree: String,
    /// Display label (defaults to the process name).
    #[serde(default)]
    pub label: Option<String>,
    /// Line color.
    #[serde(default)]
    pub line_color: Option<String>,
    /// Fill color.
    #[serde(default)]
    pub fill_color: Option<String>,
    /// Marker style.
    #[serde(default)]
    pub marker_style: Option<u32>,
    /// Column definitions applied in order.
    #[serde(default)]
    pub defines: Vec<DefineConfig>,
}

/// A region record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    /// Selection expression (empty: all events).
    #[serde(default)]
    pub selection: String,
    /// Weight expression (empty: unit weight).
    #[serde(default)]
    pub weight: String,
    /// Display label (defaults to the region name).
    #[serde(default)]
    pub label: Option<String>,
    /// Hide data in this region.
    #[serde(default)]
    pub blinded: bool,
    /// Apply the weight.
    #[serde(default = "yes")]
    pub weighted: bool,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Extra cuts, applied in order as variations.
    #[serde(default)]
    pub filters: Vec<String>,
    /// Extra weights, applied in order after the filters.
    #[serde(default)]
    pub reweights: Vec<String>,
}

/// A distribution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionConfig {
    /// Axis expressions.
    pub expressions: Vec<String>,
    /// Axis binnings.
    pub binnings: Vec<Binning>,
    /// Axis labels (default: the expressions).
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    /// Plot title.
    #[serde(default)]
    pub title: String,
}

/// How an estimation record combines its terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    /// The target process in the requested region, unchanged.
    #[default]
    Direct,
    /// A weighted sum of the configured terms.
    Linear,
}

/// One term of a linear estimation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TermConfig {
    /// Multiplier of the term's result.
    pub coefficient: f64,
    /// Process to evaluate (default: the estimation's process).
    #[serde(default)]
    pub process: Option<String>,
    /// Region to evaluate (default: the requested region).
    #[serde(default)]
    pub region: Option<String>,
    /// Extra cuts applied to the term's region, in order.
    #[serde(default)]
    pub filters: Vec<String>,
    /// Extra weights applied to the term's region after the filters.
    #[serde(default)]
    pub reweights: Vec<String>,
    /// In uncertainty estimates, contribute the nominal result instead.
    #[serde(default)]
    pub nominal: bool,
}

/// An estimation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EstimationConfig {
    /// The process being estimated.
    pub process: String,
    /// Combination method.
    #[serde(default)]
    pub method: EstimationMethod,
    /// Terms of a linear estimation.
    #[serde(default)]
    pub terms: Vec<TermConfig>,
}

/// Immutable snapshot of an analysis configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Processes by name.
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessConfig>,
    /// Regions by name.
    #[serde(default)]
    pub regions: BTreeMap<String, RegionConfig>,
    /// Distributions by name.
    #[serde(default)]
    pub distributions: BTreeMap<String, DistributionConfig>,
    /// Estimations by name.
    #[serde(default)]
    pub estimations: BTreeMap<String, EstimationConfig>,
}

impl AnalysisConfig {
    /// Load from YAML (with local override).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_config(path)
    }

    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| Error::Config(e.to_string()))
    }
}

fn lookup<'a, T>(map: &'a BTreeMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name).ok_or_else(|| Error::Config(format!("unknown {} '{}'", kind, name)))
}

// ── Loaders ────────────────────────────────────────────────────

/// Builds [`Process`]es from a configuration snapshot.
#[derive(Debug, Clone)]
pub struct ProcessLoader {
    config: Arc<AnalysisConfig>,
}

impl ProcessLoader {
    /// Loader over `config`.
    pub fn new(config: Arc<AnalysisConfig>) -> Self {
        Self { config }
    }

    /// Configured names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.config.processes.keys().map(String::as_str)
    }

    /// Build the named process.
    pub fn load(&self, name: &str) -> Result<Process> {
        let c = lookup(&self.config.processes, "process", name)?;
        let mut p = Process::new(name, c.files.iter().cloned(), c.tree.clone());
        if let Some(label) = &c.label {
            p = p.with_label(label.clone());
        }
        if let Some(color) = &c.line_color {
            p = p.with_line_color(color.clone());
        }
        if let Some(color) = &c.fill_color {
            p = p.with_fill_color(color.clone());
        }
        if let Some(style) = c.marker_style {
            p = p.with_marker_style(style);
        }
        for d in &c.defines {
            p = p.patched(Defined::new(d.name.clone(), &d.expression));
        }
        Ok(p)
    }
}

/// Builds [`Region`]s from a configuration snapshot.
#[derive(Debug, Clone)]
pub struct RegionLoader {
    config: Arc<AnalysisConfig>,
}

impl RegionLoader {
    /// Loader over `config`.
    pub fn new(config: Arc<AnalysisConfig>) -> Self {
        Self { config }
    }

    /// Configured names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.config.regions.keys().map(String::as_str)
    }

    /// Build the named region.
    pub fn load(&self, name: &str) -> Result<Region> {
        let c = lookup(&self.config.regions, "region", name)?;
        let mut r = Region::new(&c.selection, &c.weight, c.label.clone().unwrap_or_else(|| name.to_string()))
            .with_blinded(c.blinded);
        for (k, v) in &c.metadata {
            r = r.with_metadata(k.clone(), v.clone());
        }
        for f in &c.filters {
            r = r.varied(Filtered::new(f));
        }
        for w in &c.reweights {
            r = r.varied(Reweighted::new(w));
        }
        Ok(r.weighted(c.weighted))
    }
}

/// Builds [`Distribution`]s from a configuration snapshot.
#[derive(Debug, Clone)]
pub struct DistributionLoader {
    config: Arc<AnalysisConfig>,
}

impl DistributionLoader {
    /// Loader over `config`.
    pub fn new(config: Arc<AnalysisConfig>) -> Self {
        Self { config }
    }

    /// Configured names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.config.distributions.keys().map(String::as_str)
    }

    /// Build the named distribution.
    pub fn load(&self, name: &str) -> Result<Distribution> {
        let c = lookup(&self.config.distributions, "distribution", name)?;
        let mut d = Distribution::new(name, &c.expressions, c.binnings.clone())?
            .with_title(c.title.clone());
        if let Some(labels) = &c.labels {
            d = d.with_labels(labels.clone())?;
        }
        Ok(d)
    }
}
