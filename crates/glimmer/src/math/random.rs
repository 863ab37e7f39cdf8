//! Random number sources.
//!
//! [`PseudoRandom`] is a tiny linear congruential generator whose sequence is
//! fixed for a given seed, which keeps particle layouts reproducible across
//! runs and in tests. Anything implementing [`RandomSource`] can be handed to
//! the particle system instead, including `rand`'s `StdRng`.

use rand::Rng;
use rand::rngs::StdRng;

const RANGE: f64 = 4_294_967_296.0; // 2^32

/// The largest `f32` strictly below 1.0.
const ONE_BELOW: f32 = 1.0 - f32::EPSILON / 2.0;

/// Uniform values in `[0, 1)`.
pub trait RandomSource {
    fn next_f32(&mut self) -> f32;

    /// Uniform value in `[-range, range)`.
    fn plus_minus(&mut self, range: f32) -> f32 {
        (self.next_f32() - 0.5) * range * 2.0
    }

    /// Uniform integer in `[0, range)`.
    fn next_int(&mut self, range: u32) -> u32 {
        ((self.next_f32() * range as f32) as u32).min(range.saturating_sub(1))
    }
}

/// Deterministic LCG: `seed = seed * 134775813 + 1 (mod 2^32)`.
#[derive(Debug, Clone, Default)]
pub struct PseudoRandom {
    seed: u32,
}

impl PseudoRandom {
    pub fn new() -> Self {
        Self { seed: 0 }
    }

    pub fn with_seed(seed: u32) -> Self {
        Self { seed }
    }

    /// Restart the sequence from seed zero.
    pub fn reset(&mut self) {
        self.seed = 0;
    }
}

impl RandomSource for PseudoRandom {
    fn next_f32(&mut self) -> f32 {
        self.seed = self.seed.wrapping_mul(134_775_813).wrapping_add(1);
        ((self.seed as f64 / RANGE) as f32).min(ONE_BELOW)
    }
}

impl RandomSource for StdRng {
    fn next_f32(&mut self) -> f32 {
        self.random::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn lcg_sequence_is_reproducible() {
        let mut a = PseudoRandom::new();
        let first: Vec<f32> = (0..5).map(|_| a.next_f32()).collect();
        // 134775813 * 0 + 1 = 1
        assert!((first[0] - (1.0 / RANGE) as f32).abs() < 1e-12);

        a.reset();
        let again: Vec<f32> = (0..5).map(|_| a.next_f32()).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn values_stay_in_unit_interval() {
        let mut r = PseudoRandom::with_seed(0xdead_beef);
        for _ in 0..10_000 {
            let v = r.next_f32();
            assert!((0.0..1.0).contains(&v));
            let pm = r.plus_minus(3.0);
            assert!((-3.0..3.0).contains(&pm));
            assert!(r.next_int(7) < 7);
        }
    }

    #[test]
    fn std_rng_is_a_source() {
        let mut rng = StdRng::seed_from_u64(7);
        let v = RandomSource::next_f32(&mut rng);
        assert!((0.0..1.0).contains(&v));
    }
}
