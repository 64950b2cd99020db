//! The random source consumed by the generator.
//!
//! [`Random`] wraps any [`rand::Rng`] and exposes the handful of draws the generator is written
//! in terms of. The conventions matter: [`Random::one_in`] treats a zero denominator as a
//! certain hit, which callers rely on to collapse empty-candidate cases into their fallback
//! branch, and [`Random::up_to_squared`] keeps the smaller of two draws to bias sizes downward.
use rand::Rng;

use crate::features::FeatureSet;

pub struct Random<R> {
    rng: R,
}

impl<R: Rng> Random<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Bernoulli with probability `1/n`. `one_in(0)` is defined as `true`.
    pub fn one_in(&mut self, n: usize) -> bool {
        n == 0 || self.rng.gen_range(0..n) == 0
    }

    /// Uniform over `[0, n)`. `up_to(0)` is defined as `0`.
    pub fn up_to(&mut self, n: usize) -> usize {
        if n == 0 { 0 } else { self.rng.gen_range(0..n) }
    }

    /// The smaller of two independent `up_to(n)` draws, biasing toward small values.
    pub fn up_to_squared(&mut self, n: usize) -> usize {
        let first = self.up_to(n);
        let second = self.up_to(n);
        first.min(second)
    }

    /// A uniformly chosen element. `options` must be non-empty.
    pub fn pick<'a, T>(&mut self, options: &'a [T]) -> &'a T {
        &options[self.up_to(options.len())]
    }

    /// A uniformly chosen element among the entries whose feature guard is satisfied. At least
    /// one entry must be enabled.
    pub fn pick_features<T: Clone>(
        &mut self,
        features: FeatureSet,
        options: &FeatureOptions<T>,
    ) -> T {
        let enabled: Vec<&T> = options
            .entries
            .iter()
            .filter(|(guard, _)| features.contains(*guard))
            .map(|(_, item)| item)
            .collect();
        (*self.pick(&enabled)).clone()
    }
}

/// A list of candidate values, each guarded by the feature set required to produce it.
pub struct FeatureOptions<T> {
    entries: Vec<(FeatureSet, T)>,
}

impl<T: Clone> FeatureOptions<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(mut self, guard: FeatureSet, items: &[T]) -> Self {
        self.entries
            .extend(items.iter().map(|item| (guard, item.clone())));
        self
    }
}

impl<T: Clone> Default for FeatureOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}
