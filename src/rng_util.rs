/// Generate a random `f64` in the range `[low, high]`.
///
/// A degenerate interval always yields `low`.
#[inline]
pub(crate) fn f64_range(rng: &mut fastrand::Rng, low: f64, high: f64) -> f64 {
    (low + rng.f64() * (high - low)).min(high)
}

/// Pick a uniformly random element of a non-empty slice.
#[inline]
pub(crate) fn choose<'a, T>(rng: &mut fastrand::Rng, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        None
    } else {
        items.get(rng.usize(..items.len()))
    }
}
