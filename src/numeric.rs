//! # Numeric primitives shared by all engines
//!
//! The [`Lcg`] generator is the single source of randomness in the simulator: every channel,
//! tracker and driver stream owns one, seeded deterministically so that runs with the same seed
//! are reproducible bit-for-bit. It also implements [`rand::RngCore`], so the usual `rand` and
//! `rand_distr` helpers draw from the same stream.
//!
//! The remaining functions convert between linear and logarithmic units and measure the power of
//! real and complex sample sequences.
//!
//! # Examples
//!
//! ```
//! use fsolink::numeric::{self, Lcg};
//!
//! let mut rng = Lcg::new(42);
//! let x = rng.gaussian(0.0, 1.0);
//! assert!(x.is_finite());
//! assert!((numeric::db_to_linear(numeric::linear_to_db(2.0)) - 2.0).abs() < 1e-12);
//! ```

use num_complex::Complex64;
use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Error;

/// Multiplier of the linear congruential recurrence
const LCG_MULTIPLIER: u32 = 1_103_515_245;

/// Increment of the linear congruential recurrence
const LCG_INCREMENT: u32 = 12345;

/// Number of distinct values produced per LCG step
const LCG_RANGE: u32 = 32768;

/// Linear congruential generator with a cached polar Box-Muller spare
#[derive(Clone, PartialEq, Debug)]
pub struct Lcg {
    /// Recurrence state
    seed: u32,
    /// Second Gaussian variate from the last polar draw
    spare: f64,
    /// Whether `spare` holds an unused variate
    has_spare: bool,
}

impl Lcg {
    /// Returns generator with given seed.
    ///
    /// # Parameters
    ///
    /// - `seed`: Initial state. A value of `0` requests a seed synthesized from the wall clock and
    ///   perturbed by the index of the current rayon worker thread, so that generators created in
    ///   parallel diverge.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let folded = fold_seed(seed);
        Self {
            seed: if folded == 0 { clock_seed() } else { folded },
            spare: 0.0,
            has_spare: false,
        }
    }

    /// Returns next raw output in `[0, 32768)`.
    fn next_raw(&mut self) -> u32 {
        self.seed = self
            .seed
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        (self.seed / 65536) % LCG_RANGE
    }

    /// Returns uniform variate in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        f64::from(self.next_raw()) / f64::from(LCG_RANGE)
    }

    /// Returns Gaussian variate with given mean and standard deviation.
    ///
    /// Uses the polar Box-Muller method; every second call is served from the cached spare.
    pub fn gaussian(&mut self, mean: f64, sigma: f64) -> f64 {
        if self.has_spare {
            self.has_spare = false;
            return mean + sigma * self.spare;
        }
        loop {
            let v1 = 2.0 * self.uniform() - 1.0;
            let v2 = 2.0 * self.uniform() - 1.0;
            let s = v1 * v1 + v2 * v2;
            if s > 0.0 && s < 1.0 {
                let factor = (-2.0 * s.ln() / s).sqrt();
                self.spare = v2 * factor;
                self.has_spare = true;
                return mean + sigma * v1 * factor;
            }
        }
    }

    /// Returns integer in the inclusive range `[lo, hi]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `lo > hi`.
    pub fn range(&mut self, lo: i64, hi: i64) -> Result<i64, Error> {
        if lo > hi {
            return Err(Error::InvalidParam(format!(
                "Empty integer range [{lo}, {hi}]"
            )));
        }
        let span = hi - lo + 1;
        Ok(i64::from(self.next_raw()) % span + lo)
    }
}

impl RngCore for Lcg {
    fn next_u32(&mut self) -> u32 {
        (self.next_raw() << 30) ^ (self.next_raw() << 15) ^ self.next_raw()
    }

    fn next_u64(&mut self) -> u64 {
        (u64::from(self.next_u32()) << 32) | u64::from(self.next_u32())
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for byte in dst {
            *byte = (self.next_raw() & 0xFF) as u8;
        }
    }
}

/// Returns seed for a sub-stream identified by `instance_id`.
///
/// A `global_seed` of `0` is passed through unchanged, so that every sub-stream synthesizes its
/// own clock-derived seed.
#[must_use]
pub fn derive_seed(global_seed: u64, instance_id: u64) -> u64 {
    if global_seed == 0 {
        return 0;
    }
    match global_seed ^ instance_id {
        0 => instance_id.rotate_left(17) | 1,
        seed => seed,
    }
}

/// Folds a 64-bit seed into the 32-bit recurrence state.
#[allow(clippy::cast_possible_truncation)]
fn fold_seed(seed: u64) -> u32 {
    (seed ^ (seed >> 32)) as u32
}

/// Returns nonzero seed derived from the wall clock and the current worker thread.
#[allow(clippy::cast_possible_truncation)]
fn clock_seed() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64);
    let thread = rayon::current_thread_index().map_or(0, |i| i as u64 + 1);
    match fold_seed(nanos ^ thread.wrapping_mul(0x9E37_79B9_7F4A_7C15)) {
        0 => 1,
        seed => seed,
    }
}

/// Returns `10 * log10(x)`, or negative infinity (with a warning) if `x <= 0`.
#[must_use]
pub fn linear_to_db(x: f64) -> f64 {
    if x <= 0.0 {
        tracing::warn!(value = x, "dB conversion of non-positive value");
        return f64::NEG_INFINITY;
    }
    10.0 * x.log10()
}

/// Returns `10^(x/10)`.
#[must_use]
pub fn db_to_linear(x_db: f64) -> f64 {
    10f64.powf(x_db / 10.0)
}

/// Returns power in dBm for given power in watts.
#[must_use]
pub fn watts_to_dbm(watts: f64) -> f64 {
    linear_to_db(watts) + 30.0
}

/// Returns power in watts for given power in dBm.
#[must_use]
pub fn dbm_to_watts(dbm: f64) -> f64 {
    db_to_linear(dbm - 30.0)
}

/// Returns `20 * log10(x)` for an amplitude ratio.
#[must_use]
pub fn amplitude_to_db(x: f64) -> f64 {
    2.0 * linear_to_db(x)
}

/// Returns amplitude ratio for given value in dB.
#[must_use]
pub fn db_to_amplitude(x_db: f64) -> f64 {
    10f64.powf(x_db / 20.0)
}

/// Returns mean of squares of a real signal.
///
/// # Errors
///
/// Returns an error if `samples` is empty.
pub fn signal_power(samples: &[f64]) -> Result<f64, Error> {
    if samples.is_empty() {
        return Err(Error::InvalidParam(
            "Cannot compute power of empty signal".to_string(),
        ));
    }
    Ok(samples.iter().map(|x| x * x).sum::<f64>() / samples.len() as f64)
}

/// Returns mean of squared magnitudes of a complex signal.
///
/// # Errors
///
/// Returns an error if `samples` is empty.
pub fn complex_signal_power(samples: &[Complex64]) -> Result<f64, Error> {
    if samples.is_empty() {
        return Err(Error::InvalidParam(
            "Cannot compute power of empty signal".to_string(),
        ));
    }
    Ok(samples.iter().map(Complex64::norm_sqr).sum::<f64>() / samples.len() as f64)
}

#[cfg(test)]
mod tests_of_lcg {
    use super::*;

    #[test]
    fn test_new() {
        let rng = Lcg::new(7);
        assert_eq!(rng.seed, 7);
        assert!(!rng.has_spare);
        assert_ne!(Lcg::new(0).seed, 0);
    }

    #[test]
    fn test_next_raw() {
        let mut rng = Lcg::new(1);
        // First step of the classic ANSI C rand(): 1103515245 + 12345 = 1103527590
        assert_eq!(rng.next_raw(), (1_103_527_590 / 65536) % 32768);
        for _ in 0 .. 1000 {
            assert!(rng.next_raw() < LCG_RANGE);
        }
    }

    #[test]
    fn test_uniform() {
        let mut rng = Lcg::new(12345);
        let num = 20000;
        let mut sum = 0.0;
        for _ in 0 .. num {
            let u = rng.uniform();
            assert!((0.0 .. 1.0).contains(&u));
            sum += u;
        }
        let mean = sum / f64::from(num);
        assert!((mean - 0.5).abs() < 0.02);
    }

    #[test]
    fn test_gaussian() {
        let mut rng = Lcg::new(99);
        let num = 20000;
        let draws: Vec<f64> = (0 .. num).map(|_| rng.gaussian(1.0, 2.0)).collect();
        let mean = draws.iter().sum::<f64>() / f64::from(num);
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / f64::from(num);
        assert!((mean - 1.0).abs() < 0.1);
        assert!((var - 4.0).abs() < 0.4);
    }

    #[test]
    fn test_gaussian_spare() {
        let mut rng = Lcg::new(5);
        rng.gaussian(0.0, 1.0);
        assert!(rng.has_spare);
        rng.gaussian(0.0, 1.0);
        assert!(!rng.has_spare);
    }

    #[test]
    fn test_range() {
        let mut rng = Lcg::new(3);
        assert!(rng.range(5, 4).is_err());
        for _ in 0 .. 1000 {
            let x = rng.range(-3, 3).unwrap();
            assert!((-3 ..= 3).contains(&x));
        }
        assert_eq!(rng.range(8, 8).unwrap(), 8);
    }

    #[test]
    fn test_determinism() {
        let mut rng1 = Lcg::new(2024);
        let mut rng2 = Lcg::new(2024);
        for _ in 0 .. 100 {
            assert_eq!(rng1.gaussian(0.0, 1.0).to_bits(), rng2.gaussian(0.0, 1.0).to_bits());
        }
        let mut bytes1 = [0u8; 32];
        let mut bytes2 = [0u8; 32];
        rng1.fill_bytes(&mut bytes1);
        rng2.fill_bytes(&mut bytes2);
        assert_eq!(bytes1, bytes2);
    }

    #[test]
    fn test_derive_seed() {
        assert_eq!(derive_seed(0, 3), 0);
        assert_eq!(derive_seed(8, 3), 11);
        assert_ne!(derive_seed(3, 3), 0);
    }
}
