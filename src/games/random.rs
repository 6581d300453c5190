use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;

/// Source of uniform samples in `[0, 1)` consumed by the settlement engine
pub trait RandomSource: Send {
    fn next_unit(&mut self) -> f64;
}

/// Entropy-seeded generator used for real plays
pub struct SystemRandom {
    rng: StdRng,
}

impl SystemRandom {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Reproducible generator for simulations and tests
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed list of samples, then repeats the last one
pub struct FixedSamples {
    samples: VecDeque<f64>,
    last: f64,
}

impl FixedSamples {
    pub fn new(samples: impl IntoIterator<Item = f64>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
            last: 0.0,
        }
    }

    pub fn single(sample: f64) -> Self {
        Self::new([sample])
    }
}

impl RandomSource for FixedSamples {
    fn next_unit(&mut self) -> f64 {
        if let Some(sample) = self.samples.pop_front() {
            self.last = sample;
        }
        self.last
    }
}
