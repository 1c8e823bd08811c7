//! Randomness adapters.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ports::RandomSource;

/// Map a `[0, 1)` sample onto the inclusive integer range `[low, high]`.
fn scale_to_range(sample: f64, low: i64, high: i64) -> i64 {
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    let (low, high) = (i128::from(low), i128::from(high));
    let span = (high - low) as f64 + 1.0;
    let offset = (sample.clamp(0.0, 1.0) * span).floor() as i128;
    // Both ends lie in i64, so the clamped sum does too.
    (low + offset).min(high) as i64
}

/// Real PRNG backed by [`StdRng`].
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Reproducible generator.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Generator seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }
}

impl RandomSource for SeededRandom {
    fn seed(&self, value: u64) {
        *self.rng.lock() = StdRng::seed_from_u64(value);
    }

    fn uniform01(&self) -> f64 {
        self.rng.lock().random::<f64>()
    }

    fn int_in_range(&self, low: i64, high: i64) -> i64 {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        self.rng.lock().random_range(low..=high)
    }
}

/// Always yields the same sample.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom {
    value: f64,
}

impl FixedRandom {
    /// `value` is clamped into `[0, 1]`.
    pub fn new(value: f64) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
        }
    }
}

impl RandomSource for FixedRandom {
    fn seed(&self, _value: u64) {}

    fn uniform01(&self) -> f64 {
        self.value
    }

    fn int_in_range(&self, low: i64, high: i64) -> i64 {
        scale_to_range(self.value, low, high)
    }
}

/// Cycles through a fixed list of samples; `seed` rewinds to `value % len`.
#[derive(Debug)]
pub struct SequenceRandom {
    values: Vec<f64>,
    cursor: AtomicUsize,
}

impl SequenceRandom {
    /// An empty list behaves like `FixedRandom::new(0.0)`.
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        let values: Vec<f64> = values.into().into_iter().map(|v| v.clamp(0.0, 1.0)).collect();
        Self {
            values,
            cursor: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.values.len();
        self.values[index]
    }
}

impl RandomSource for SequenceRandom {
    fn seed(&self, value: u64) {
        let len = self.values.len().max(1) as u64;
        self.cursor.store((value % len) as usize, Ordering::Relaxed);
    }

    fn uniform01(&self) -> f64 {
        self.next()
    }

    fn int_in_range(&self, low: i64, high: i64) -> i64 {
        scale_to_range(self.next(), low, high)
    }
}
