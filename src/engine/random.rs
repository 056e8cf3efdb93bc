// LINGR Engine: Randomness
// Every engine owns its own boxed RNG. Seeded runs derive one stream per
// engine from the configured seed so engines do not perturb each other's
// draws.

use chrono::Duration;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

pub type BoxRng = Box<dyn RngCore + Send>;

/// Per-engine stream ids mixed into the seed.
pub mod stream {
    pub const ENTITY: u64 = 1;
    pub const MESSAGES: u64 = 2;
    pub const EVENTS: u64 = 3;
    pub const APPARITIONS: u64 = 4;
    pub const AMBIENT: u64 = 5;
    pub const SUMMON: u64 = 6;
}

pub fn rng_for(seed: Option<u64>, stream: u64) -> BoxRng {
    match seed {
        Some(seed) => Box::new(StdRng::seed_from_u64(
            seed ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15),
        )),
        None => Box::new(StdRng::from_entropy()),
    }
}

/// Uniform draw in [0, 1).
pub fn roll(rng: &mut dyn RngCore) -> f64 {
    rng.gen::<f64>()
}

/// Uniform draw in [min, max).
pub fn uniform(rng: &mut dyn RngCore, min: f64, max: f64) -> f64 {
    min + roll(rng) * (max - min)
}

/// Uniform delay in [min_ms, max_ms).
pub fn delay_ms(rng: &mut dyn RngCore, min_ms: i64, max_ms: i64) -> Duration {
    Duration::milliseconds(uniform(rng, min_ms as f64, max_ms as f64) as i64)
}

/// Uniform index into a non-empty slice of length `len`.
pub fn index(rng: &mut dyn RngCore, len: usize) -> usize {
    ((roll(rng) * len as f64) as usize).min(len.saturating_sub(1))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::BoxRng;
    use rand::rngs::mock::StepRng;

    /// An RNG whose every `gen::<f64>()` returns `x` (for x in [0, 1)).
    pub fn fixed(x: f64) -> BoxRng {
        let bits = (x * (1u64 << 53) as f64) as u64;
        Box::new(StepRng::new(bits << 11, 0))
    }
}
