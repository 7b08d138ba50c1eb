//! Probabilistic sampling
//!
//! Each record is kept independently with probability `rate`. A rate of
//! 1.0 keeps everything and 0.0 keeps nothing, without consulting the RNG.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

/// Independent per-record sampler
#[derive(Debug)]
pub struct Sampler {
    rate: f64,
    rng: Mutex<StdRng>,
}

impl Sampler {
    /// Creates a sampler seeded from OS entropy.
    pub fn new(rate: f64) -> Self {
        Self {
            rate: sanitize_rate(rate),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a deterministic sampler.
    pub fn with_seed(rate: f64, seed: u64) -> Self {
        Self {
            rate: sanitize_rate(rate),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Draw once; `true` means keep the record.
    pub fn should_sample(&self) -> bool {
        if self.rate >= 1.0 {
            return true;
        }
        if self.rate <= 0.0 {
            return false;
        }
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen::<f64>() < self.rate
    }
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        warn!("Sampling rate is NaN, keeping every record");
        return 1.0;
    }
    rate.clamp(0.0, 1.0)
}
