//! Deterministic fan-out sampling
//!
//! Fleet-wide aggregates would need one upstream call per vehicle. Instead
//! they fetch a fixed-size sample, chosen by sorting on a stable id, and
//! extrapolate summed metrics to the whole fleet with [`KpiRollup`].

mod kpi;

pub use kpi::*;

/// Picks the first `size` items by ascending id.
///
/// # Example
///
/// ```
/// use fleetdash_lib::sampling::SamplePolicy;
///
/// let ids = ["b3", "b1", "b2"];
/// let sample = SamplePolicy::new(2).select(&ids, |id| *id);
/// assert_eq!(sample, [&"b1", &"b2"]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePolicy {
    size: usize,
}

impl Default for SamplePolicy {
    fn default() -> Self {
        Self { size: 5 }
    }
}

impl SamplePolicy {
    /// Creates a policy sampling `size` items.
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// Returns the sample size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the sampled items, ordered by `id`.
    ///
    /// Items with equal ids keep their input order.
    pub fn select<'a, T, K, F>(&self, items: &'a [T], id: F) -> Vec<&'a T>
    where
        K: Ord,
        F: Fn(&'a T) -> K,
    {
        let mut sorted: Vec<&'a T> = items.iter().collect();
        sorted.sort_by_key(|item| id(*item));
        sorted.truncate(self.size);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("e{i}")).collect()
    }

    #[test]
    fn test_same_input_same_sample() {
        let entities = fleet(50);
        let policy = SamplePolicy::default();

        let first = policy.select(&entities, |e| e.as_str());
        let second = policy.select(&entities, |e| e.as_str());

        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_sample_ignores_input_order() {
        let entities = fleet(50);
        let mut shuffled = entities.clone();
        shuffled.reverse();
        shuffled.swap(3, 41);

        let policy = SamplePolicy::default();
        assert_eq!(
            policy.select(&entities, |e| e.as_str()),
            policy.select(&shuffled, |e| e.as_str())
        );
    }

    #[test]
    fn test_sample_is_sorted_by_id() {
        let entities = fleet(50);
        let sample = SamplePolicy::default().select(&entities, |e| e.as_str());
        // String order, not numeric
        assert_eq!(sample, ["e1", "e10", "e11", "e12", "e13"].iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_small_population() {
        let entities = fleet(3);
        let sample = SamplePolicy::new(5).select(&entities, |e| e.as_str());
        assert_eq!(sample.len(), 3);

        let none = SamplePolicy::new(0).select(&entities, |e| e.as_str());
        assert!(none.is_empty());
    }
}
