//! Randomness port.

#[cfg(test)]
use mockall::automock;

/// Injectable, seedable source of randomness.
///
/// Used for backoff jitter and by randomized test doubles. Implementations
/// use interior mutability so a single instance can be shared across workers.
#[cfg_attr(test, automock)]
pub trait RandomSource: Send + Sync {
    /// Re-seed the generator.
    fn seed(&self, value: u64);

    /// Uniform sample in `[0, 1)`.
    fn uniform01(&self) -> f64;

    /// Uniform integer in `[low, high]` (inclusive on both ends).
    fn int_in_range(&self, low: i64, high: i64) -> i64;
}

impl dyn RandomSource {
    /// Pick one element uniformly, `None` for an empty slice.
    pub fn choice<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.int_in_range(0, items.len() as i64 - 1);
        items.get(index as usize)
    }
}
