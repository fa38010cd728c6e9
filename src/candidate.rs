//! Parameter vectors and their deduplication keys.
//!
//! A [`Candidate`] maps parameter names to real values. The coordinator
//! rounds every suggestion to a fixed number of decimal places before it
//! is issued, and identifies it by its [`Fingerprint`]: two candidates are
//! the same point iff their rounded `(name, value)` sets are equal,
//! regardless of insertion order.

use std::collections::{BTreeMap, HashSet};

/// Largest supported rounding precision (decimal places).
///
/// Beyond this `f64` cannot represent the scaled value exactly.
pub const MAX_PRECISION: u32 = 15;

/// Round `value` to `precision` decimal places (half away from zero).
#[must_use]
pub fn round_to(value: f64, precision: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    #[allow(clippy::cast_possible_wrap)]
    let scale = 10f64.powi(precision.min(MAX_PRECISION) as i32);
    let scaled = value * scale;
    if !scaled.is_finite() {
        // Too large to scale; already integral at this magnitude.
        return value;
    }
    let rounded = scaled.round() / scale;
    // Normalize -0.0 so it cannot produce a second fingerprint for zero.
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// An immutable mapping from parameter name to value.
///
/// Iteration order is by parameter name, so equality and hashing of the
/// underlying map never depend on the order values were inserted in.
///
/// # Examples
///
/// ```
/// use calibrate::Candidate;
///
/// let c = Candidate::from_iter([("car_acc", 1.234_56), ("car_sigma", 0.5)]);
/// let r = c.rounded(2);
/// assert_eq!(r.get("car_acc"), Some(1.23));
/// assert_eq!(r.fingerprint(), Candidate::from_iter([("car_sigma", 0.5), ("car_acc", 1.23)]).fingerprint());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Candidate {
    values: BTreeMap<String, f64>,
}

impl Candidate {
    /// Creates a candidate from an existing map.
    #[must_use]
    pub fn new(values: BTreeMap<String, f64>) -> Self {
        Self { values }
    }

    /// Returns the value of the named parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Iterates `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the candidate has no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns a copy with every value rounded to `precision` decimal places.
    #[must_use]
    pub fn rounded(&self, precision: u32) -> Self {
        Self {
            values: self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), round_to(*v, precision)))
                .collect(),
        }
    }

    /// Returns a copy with `name` set to `value`.
    #[must_use]
    pub fn with_value(&self, name: &str, value: f64) -> Self {
        let mut values = self.values.clone();
        values.insert(name.to_owned(), value);
        Self { values }
    }

    /// Canonical identity key of this candidate's current values.
    ///
    /// Callers are expected to round first; the fingerprint itself does
    /// no rounding.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(
            self.values
                .iter()
                .map(|(k, v)| {
                    let v = if *v == 0.0 { 0.0 } else { *v };
                    (k.clone(), v.to_bits())
                })
                .collect(),
        )
    }

    /// Consumes the candidate and returns the underlying map.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, f64> {
        self.values
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Candidate {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl From<BTreeMap<String, f64>> for Candidate {
    fn from(values: BTreeMap<String, f64>) -> Self {
        Self::new(values)
    }
}

/// Order-independent identity key of a rounded [`Candidate`].
///
/// Values are compared bit-for-bit after zero normalization.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(Box<[(String, u64)]>);

/// Set of fingerprints of every candidate issued during a run.
///
/// The store only grows; entries are never removed.
#[derive(Debug, Default)]
pub struct FingerprintStore {
    seen: HashSet<Fingerprint>,
}

impl FingerprintStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `fingerprint` was inserted before.
    #[must_use]
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Records `fingerprint`. Returns `false` if it was already present.
    pub fn insert(&mut self, fingerprint: Fingerprint) -> bool {
        self.seen.insert(fingerprint)
    }

    /// Number of distinct fingerprints recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns `true` if nothing was recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
