//! RandomSource port - シャッフル用の乱数源
//!
//! 本番は毎回独立した thread-local RNG、テストでは seed 固定や
//! スクリプト化した乱数を差し込んで出力順を assert できるようにします。

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform integer source.
pub trait RandomSource: Send + Sync {
    /// A uniformly distributed index in `0..upper`. `upper` is never 0.
    fn below(&self, upper: usize) -> usize;
}

/// Unseeded; every call draws from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn below(&self, upper: usize) -> usize {
        rand::thread_rng().gen_range(0..upper)
    }
}

/// Reproducible RNG for tests and replays.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn below(&self, upper: usize) -> usize {
        self.rng.lock().gen_range(0..upper)
    }
}

/// Unbiased in-place Fisher-Yates shuffle.
pub fn fisher_yates<T>(items: &mut [T], random: &dyn RandomSource) {
    for i in (1..items.len()).rev() {
        let j = random.below(i + 1);
        items.swap(i, j);
    }
}
