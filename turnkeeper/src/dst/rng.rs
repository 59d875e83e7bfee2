//! Seeded randomness for simulations and property runs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// ChaCha20 stream that replays exactly from its seed.
#[derive(Debug)]
pub struct DeterministicRng {
    inner: ChaCha20Rng,
    seed: u64,
}

impl DeterministicRng {
    /// Stream for `seed`.
    ///
    /// ```
    /// use turnkeeper::dst::DeterministicRng;
    ///
    /// let mut a = DeterministicRng::new(7);
    /// let mut b = DeterministicRng::new(7);
    /// assert_eq!(a.next_u64(), b.next_u64());
    /// ```
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha20Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed this stream started from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform `u64`.
    pub fn next_u64(&mut self) -> u64 {
        self.inner.gen()
    }

    /// Uniform `usize` in `[min, max]`.
    ///
    /// # Panics
    /// Panics if `min > max`.
    pub fn next_usize(&mut self, min: usize, max: usize) -> usize {
        assert!(min <= max, "empty range [{min}, {max}]");
        self.inner.gen_range(min..=max)
    }

    /// Uniform `u64` in `[min, max]`.
    ///
    /// # Panics
    /// Panics if `min > max`.
    pub fn next_u64_in(&mut self, min: u64, max: u64) -> u64 {
        assert!(min <= max, "empty range [{min}, {max}]");
        self.inner.gen_range(min..=max)
    }

    /// `true` with the given probability.
    ///
    /// # Panics
    /// Panics if `probability` is outside [0, 1].
    pub fn next_bool(&mut self, probability: f64) -> bool {
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1], got {probability}"
        );
        self.inner.gen_bool(probability)
    }

    /// Uniformly chosen element of `items`.
    ///
    /// # Panics
    /// Panics if `items` is empty.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        assert!(!items.is_empty(), "cannot choose from an empty slice");
        &items[self.inner.gen_range(0..items.len())]
    }

    /// Child stream seeded from this one.
    ///
    /// The parent advances by one draw, so successive children differ while
    /// the whole family still replays from the root seed.
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u64())
    }
}
