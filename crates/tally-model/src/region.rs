//! Regions and region variations.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tally_core::{FingerprintBuilder, Fingerprinted};
use tally_data::expr::{anded, multiplied, normalized, properties};

/// A pure transform of a region's `(selection, weight)` pair.
///
/// Two variations with the same [`kind`](Variation::kind) and
/// [`state`](Variation::state) must apply identically.
pub trait Variation: Send + Sync + fmt::Debug {
    /// Stable type name, part of the region fingerprint.
    fn kind(&self) -> &str;

    /// Output-affecting state.
    fn state(&self) -> Vec<String>;

    /// Return the varied `(selection, weight)`.
    fn apply(&self, selection: &str, weight: &str) -> (String, String);
}

/// Multiplies an expression into the region weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reweighted {
    weight: String,
}

impl Reweighted {
    /// Multiply `weight` into the region weight.
    pub fn new(weight: impl AsRef<str>) -> Self {
        Self { weight: normalized(weight.as_ref()) }
    }
}

impl Variation for Reweighted {
    fn kind(&self) -> &str {
        "reweighted"
    }

    fn state(&self) -> Vec<String> {
        vec![self.weight.clone()]
    }

    fn apply(&self, selection: &str, weight: &str) -> (String, String) {
        let weight = if weight.trim().is_empty() {
            self.weight.clone()
        } else {
            multiplied(&[weight, self.weight.as_str()])
        };
        (selection.to_string(), weight)
    }
}

/// Ands an extra cut into the region selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    selection: String,
}

impl Filtered {
    /// And `selection` into the region selection.
    pub fn new(selection: impl AsRef<str>) -> Self {
        Self { selection: normalized(selection.as_ref()) }
    }
}

impl Variation for Filtered {
    fn kind(&self) -> &str {
        "filtered"
    }

    fn state(&self) -> Vec<String> {
        vec![self.selection.clone()]
    }

    fn apply(&self, selection: &str, weight: &str) -> (String, String) {
        let selection = if selection.trim().is_empty() {
            self.selection.clone()
        } else {
            anded(&[selection, self.selection.as_str()])
        };
        (selection, weight.to_string())
    }
}

/// A selection and weight in which processes are evaluated.
///
/// Equality and hashing go through the fingerprint, which covers selection,
/// weight, the weighted flag and the ordered variations. Label, blinding and
/// metadata are cosmetic.
#[derive(Debug, Clone)]
pub struct Region {
    selection: String,
    weight: String,
    label: String,
    blinded: bool,
    weighted: bool,
    metadata: BTreeMap<String, String>,
    variations: Vec<Arc<dyn Variation>>,
}

impl Region {
    /// A weighted, unblinded region. Empty strings mean "no selection" and
    /// "no weight".
    pub fn new(selection: impl AsRef<str>, weight: impl AsRef<str>, label: impl Into<String>) -> Self {
        Self {
            selection: normalized(selection.as_ref()),
            weight: normalized(weight.as_ref()),
            label: label.into(),
            blinded: false,
            weighted: true,
            metadata: BTreeMap::new(),
            variations: Vec::new(),
        }
    }

    /// Set the blinding flag.
    pub fn with_blinded(mut self, blinded: bool) -> Self {
        self.blinded = blinded;
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Base selection (before variations).
    pub fn selection(&self) -> &str {
        &self.selection
    }

    /// Base weight (before variations).
    pub fn weight(&self) -> &str {
        &self.weight
    }

    /// Display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether data in this region should be hidden.
    pub fn is_blinded(&self) -> bool {
        self.blinded
    }

    /// Whether the weight is applied.
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    /// Free-form metadata.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Applied variations, in order.
    pub fn variations(&self) -> &[Arc<dyn Variation>] {
        &self.variations
    }

    /// A copy with `variation` appended.
    pub fn varied(&self, variation: impl Variation + 'static) -> Self {
        self.varied_arc(Arc::new(variation))
    }

    /// A copy with a shared variation appended.
    pub fn varied_arc(&self, variation: Arc<dyn Variation>) -> Self {
        let mut out = self.clone();
        out.variations.push(variation);
        out
    }

    /// A copy with weighting switched on or off.
    pub fn weighted(&self, enabled: bool) -> Self {
        let mut out = self.clone();
        out.weighted = enabled;
        out
    }

    /// `(selection, weight)` with all variations folded in order.
    ///
    /// The weight is empty when weighting is disabled.
    pub fn selection_weight(&self) -> (String, String) {
        let (selection, weight) = self
            .variations
            .iter()
            .fold((self.selection.clone(), self.weight.clone()), |(s, w), v| v.apply(&s, &w));
        if self.weighted { (selection, weight) } else { (selection, String::new()) }
    }

    /// `(selection) * (weight)`, dropping empty parts.
    pub fn weighted_selection(&self) -> String {
        let (s, w) = self.selection_weight();
        match (s.trim().is_empty(), w.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => s,
            (true, false) => w,
            (false, false) => multiplied(&[s, w]),
        }
    }

    /// Columns read by the varied selection and weight.
    pub fn properties(&self) -> BTreeSet<String> {
        let (s, w) = self.selection_weight();
        let mut out = properties(&s);
        out.extend(properties(&w));
        out
    }
}

impl Fingerprinted for Region {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        fp.str("region").str(&self.selection).str(&self.weight).bool(self.weighted);
        fp.u64(self.variations.len() as u64);
        for v in &self.variations {
            fp.str(v.kind()).strs(&v.state());
        }
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for Region {}

impl Hash for Region {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Region {
        Region::new("x > 0", "w", "Signal region")
    }

    #[test]
    fn variations_fold_in_order() {
        let r = base().varied(Reweighted::new("a")).varied(Filtered::new("y < 2"));
        let (s, w) = r.selection_weight();
        assert_eq!(s, "((x > 0) && (y < 2))");
        assert_eq!(w, "((w) * (a))");
    }

    /// Adds a constant to the weight; does not commute with [`Reweighted`].
    #[derive(Debug)]
    struct Offset(f64);

    impl Variation for Offset {
        fn kind(&self) -> &str {
            "offset"
        }

        fn state(&self) -> Vec<String> {
            vec![self.0.to_string()]
        }

        fn apply(&self, selection: &str, weight: &str) -> (String, String) {
            (selection.to_string(), format!("({weight}) + {}", self.0))
        }
    }

    #[test]
    fn order_is_significant() {
        let a = base().varied(Reweighted::new("2")).varied(Offset(1.0));
        let b = base().varied(Offset(1.0)).varied(Reweighted::new("2"));
        assert_eq!(a.selection_weight().1, "(((w) * (2))) + 1");
        assert_eq!(b.selection_weight().1, "(((w) + 1) * (2))");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a, b);
    }

    #[test]
    fn weight_multiplications_reorder_but_keep_identity_by_order() {
        let a = base().varied(Reweighted::new("a")).varied(Reweighted::new("b"));
        let b = base().varied(Reweighted::new("b")).varied(Reweighted::new("a"));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn variation_kind_is_part_of_the_fingerprint() {
        let a = base().varied(Reweighted::new("z"));
        let b = base().varied(Filtered::new("z"));
        assert_ne!(a, b);
    }

    #[test]
    fn unweighted_drops_the_weight() {
        let r = base().varied(Reweighted::new("a")).weighted(false);
        assert_eq!(r.selection_weight(), ("x > 0".to_string(), String::new()));
        assert_eq!(r.weighted_selection(), "x > 0");
        assert_ne!(r, base().varied(Reweighted::new("a")));
    }

    #[test]
    fn cosmetic_fields_do_not_change_identity() {
        let a = base();
        let b = Region::new("x > 0", "w", "Other label").with_blinded(true).with_metadata("k", "v");
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn modifiers_are_copy_on_write() {
        let a = base();
        let _ = a.varied(Reweighted::new("q")).weighted(false);
        assert!(a.variations().is_empty());
        assert!(a.is_weighted());
    }

    #[test]
    fn weighted_selection_and_properties() {
        assert_eq!(base().weighted_selection(), "((x > 0) * (w))");
        assert_eq!(Region::new("", "", "all").weighted_selection(), "");
        let props = base().varied(Reweighted::new("sf_e & 1")).properties();
        assert_eq!(props, ["sf_e", "w", "x"].iter().map(|s| s.to_string()).collect());
    }

    #[test]
    fn reweighting_an_unweighted_region() {
        let r = Region::new("", "", "all").varied(Reweighted::new("w2"));
        assert_eq!(r.selection_weight().1, "w2");
    }
}
