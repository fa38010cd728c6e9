//! Per-parameter bounds of the calibration search space.

use std::collections::BTreeMap;

use crate::candidate::{Candidate, MAX_PRECISION, round_to};

/// Closed interval `[low, high]` for one parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    /// Lower bound (inclusive).
    pub low: f64,
    /// Upper bound (inclusive).
    pub high: f64,
}

impl Bounds {
    /// Returns `true` if `value` lies inside the interval.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        (self.low..=self.high).contains(&value)
    }

    /// Clamps `value` into the interval. Never panics, even for bounds
    /// that were not validated.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.low).min(self.high)
    }

    /// Narrows the interval to its outermost points on the grid of
    /// `precision` decimal places, or `None` if no grid point lies inside.
    ///
    /// ```
    /// use calibrate::Bounds;
    ///
    /// let b = Bounds { low: 0.000_04, high: 0.123_46 };
    /// assert_eq!(b.on_grid(4), Some(Bounds { low: 0.0001, high: 0.1234 }));
    /// assert_eq!(Bounds { low: 0.000_04, high: 0.000_06 }.on_grid(4), None);
    /// ```
    #[must_use]
    pub fn on_grid(&self, precision: u32) -> Option<Bounds> {
        #[allow(clippy::cast_possible_wrap)]
        let step = 10f64.powi(-(precision.min(MAX_PRECISION) as i32));
        let mut low = round_to(self.low, precision);
        if low < self.low {
            low = round_to(low + step, precision);
        }
        let mut high = round_to(self.high, precision);
        if high > self.high {
            high = round_to(high - step, precision);
        }
        (low.is_finite() && high.is_finite() && low <= high).then_some(Bounds { low, high })
    }
}

/// Named parameter bounds, iterated in name order.
///
/// The scheduler never checks bounds itself; decision models use the
/// space to keep their suggestions inside it.
///
/// # Examples
///
/// ```
/// use calibrate::SearchSpace;
///
/// let space = SearchSpace::builder()
///     .param("car_tau_mean", 0.5, 4.0)
///     .param("car_sigma", 0.0, 1.0)
///     .build()
///     .unwrap();
/// assert_eq!(space.len(), 2);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(
        try_from = "BTreeMap<String, Bounds>",
        into = "BTreeMap<String, Bounds>"
    )
)]
pub struct SearchSpace {
    params: BTreeMap<String, Bounds>,
}

/// Validates deserialized or hand-assembled bounds the same way
/// [`SearchSpaceBuilder::build`] does.
impl TryFrom<BTreeMap<String, Bounds>> for SearchSpace {
    type Error = crate::Error;

    fn try_from(params: BTreeMap<String, Bounds>) -> crate::Result<Self> {
        params
            .into_iter()
            .fold(SearchSpace::builder(), |b, (name, Bounds { low, high })| {
                b.param(name, low, high)
            })
            .build()
    }
}

impl From<SearchSpace> for BTreeMap<String, Bounds> {
    fn from(space: SearchSpace) -> Self {
        space.params
    }
}

impl SearchSpace {
    /// Starts building a search space.
    #[must_use]
    pub fn builder() -> SearchSpaceBuilder {
        SearchSpaceBuilder::default()
    }

    /// Returns the bounds of the named parameter.
    #[must_use]
    pub fn bounds(&self, name: &str) -> Option<Bounds> {
        self.params.get(name).copied()
    }

    /// Iterates `(name, bounds)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Bounds)> {
        self.params.iter().map(|(k, b)| (k.as_str(), *b))
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Always `false` for a built space.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns `true` if `candidate` names exactly this space's parameters
    /// and every value lies within its bounds.
    #[must_use]
    pub fn contains(&self, candidate: &Candidate) -> bool {
        candidate.len() == self.params.len()
            && candidate
                .iter()
                .all(|(name, v)| self.bounds(name).is_some_and(|b| b.contains(v)))
    }
}

/// Builder for [`SearchSpace`].
#[derive(Debug, Default)]
pub struct SearchSpaceBuilder {
    params: Vec<(String, f64, f64)>,
}

impl SearchSpaceBuilder {
    /// Adds a parameter with inclusive bounds. A repeated name replaces
    /// the earlier bounds.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.params.push((name.into(), low, high));
        self
    }

    /// Validates and builds the space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptySearchSpace`](crate::Error::EmptySearchSpace)
    /// if no parameter was added, or
    /// [`Error::InvalidBounds`](crate::Error::InvalidBounds) if a bound is
    /// not finite or `low > high`.
    pub fn build(self) -> crate::Result<SearchSpace> {
        if self.params.is_empty() {
            return Err(crate::Error::EmptySearchSpace);
        }
        let mut params = BTreeMap::new();
        for (name, low, high) in self.params {
            if !(low.is_finite() && high.is_finite()) || low > high {
                return Err(crate::Error::InvalidBounds { name, low, high });
            }
            params.insert(name, Bounds { low, high });
        }
        Ok(SearchSpace { params })
    }
}
