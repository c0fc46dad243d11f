//! Distributions: what to histogram and how to bin it.

use std::collections::BTreeSet;

use tally_core::binning::Binning;
use tally_core::measurement::MAX_DIMENSIONS;
use tally_core::{Error, FingerprintBuilder, Fingerprinted, Result};
use tally_data::expr::{normalized, properties};

/// One to three expressions, each with a binning and an axis label.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    name: String,
    expressions: Vec<String>,
    binnings: Vec<Binning>,
    labels: Vec<String>,
    title: String,
}

impl Distribution {
    /// Validate and build a distribution. Axis labels default to the
    /// expressions.
    pub fn new<S: AsRef<str>>(
        name: impl Into<String>,
        expressions: &[S],
        binnings: Vec<Binning>,
    ) -> Result<Self> {
        if expressions.is_empty() || expressions.len() > MAX_DIMENSIONS {
            return Err(Error::Binning(format!(
                "distributions support 1 to {} axes, got {}",
                MAX_DIMENSIONS,
                expressions.len()
            )));
        }
        if expressions.len() != binnings.len() {
            return Err(Error::Binning(format!(
                "{} expressions but {} binnings",
                expressions.len(),
                binnings.len()
            )));
        }
        for b in &binnings {
            b.validate()?;
        }
        let expressions: Vec<String> = expressions.iter().map(|e| normalized(e.as_ref())).collect();
        Ok(Self {
            name: name.into(),
            labels: expressions.clone(),
            expressions,
            binnings,
            title: String::new(),
        })
    }

    /// Replace the axis labels (one per axis).
    pub fn with_labels<S: Into<String>>(mut self, labels: Vec<S>) -> Result<Self> {
        if labels.len() != self.expressions.len() {
            return Err(Error::Config(format!(
                "distribution '{}' has {} axes but {} labels",
                self.name,
                self.expressions.len(),
                labels.len()
            )));
        }
        self.labels = labels.into_iter().map(Into::into).collect();
        Ok(self)
    }

    /// Set the plot title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Axis expressions.
    pub fn expressions(&self) -> &[String] {
        &self.expressions
    }

    /// Axis binnings.
    pub fn binnings(&self) -> &[Binning] {
        &self.binnings
    }

    /// Axis labels.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Plot title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of axes.
    pub fn dimensions(&self) -> usize {
        self.expressions.len()
    }

    /// Columns read by the axis expressions.
    pub fn properties(&self) -> BTreeSet<String> {
        self.expressions.iter().flat_map(|e| properties(e)).collect()
    }
}

impl Fingerprinted for Distribution {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("distribution").strs(&self.expressions).strs(&self.labels);
        for b in &self.binnings {
            fp.nested(b);
        }
    }
}
