//! Injectable randomness for scheduling decisions.
//!
//! The scheduler draws every branching decision through [`Chance`] so tests
//! can force each branch.

use rand::prelude::*;

/// Source of random draws for the scheduler.
pub trait Chance: Send + Sync {
    /// Uniform value in `[0, 1)`.
    fn unit(&self) -> f64;

    /// Uniform index in `0..len`. `len` must be non-zero.
    fn index(&self, len: usize) -> usize;
}

/// [`Chance`] backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadChance;

impl Chance for ThreadChance {
    fn unit(&self) -> f64 {
        thread_rng().gen()
    }

    fn index(&self, len: usize) -> usize {
        thread_rng().gen_range(0..len)
    }
}
