//! # Some useful functions for simulating link performance
//!
//! The [`random_bytes`] function returns a given number of random payload bytes; the
//! [`bytes_to_bits`] and [`bits_to_bytes`] functions convert between packed bytes and one-bit-per-
//! element sequences (MSB first); the [`add_awgn`] and [`add_complex_awgn`] functions add white
//! Gaussian noise to real and complex sample streams; and the [`bit_error_count`] function counts
//! the bit errors in a byte sequence with respect to a reference.
//!
//! # Examples
//!
//! The code below illustrates the usage of the functions in this module.
//! ```
//! use fsolink::numeric::Lcg;
//! use fsolink::utils;
//!
//! let mut rng = Lcg::new(7);
//! let payload = utils::random_bytes(16, &mut rng);
//! let mut samples: Vec<f64> = utils::bytes_to_bits(&payload)
//!     .into_iter()
//!     .map(f64::from)
//!     .collect();
//! utils::add_awgn(&mut samples, 0.01, &mut rng);
//! let bits_hat: Vec<u8> = samples.iter().map(|&x| u8::from(x > 0.5)).collect();
//! let err_count = utils::bit_error_count(&utils::bits_to_bytes(&bits_hat), &payload);
//! ```

use num_complex::Complex64;
use rand::Rng;
use rand_distr::StandardNormal;

/// Returns given number of random bytes drawn from a random number generator.
///
/// # Parameters
///
/// - `num_bytes`: Number of random bytes to be generated.
///
/// - `rng`: Random number generator to be used.
///
/// # Returns
///
/// - `bytes`: Random bytes.
pub fn random_bytes<R: Rng + ?Sized>(num_bytes: usize, rng: &mut R) -> Vec<u8> {
    let mut bytes = vec![0u8; num_bytes];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Returns bits of given bytes, most significant bit first, one bit per element.
#[must_use]
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .flat_map(|&byte| (0 .. 8).rev().map(move |i| (byte >> i) & 1))
        .collect()
}

/// Returns bytes packed from given bits, most significant bit first.
///
/// # Parameters
///
/// - `bits`: Bits to be packed (only the least significant bit of each element is used). If the
///   number of bits is not a multiple of 8, the last byte is padded with zeros.
#[must_use]
pub fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &bit)| acc | ((bit & 1) << (7 - i)))
        })
        .collect()
}

/// Adds zero-mean white Gaussian noise of given variance to real samples.
///
/// # Parameters
///
/// - `samples`: Samples to which noise is added in place.
///
/// - `noise_var`: Noise variance (nonpositive values leave the samples unchanged).
///
/// - `rng`: Random number generator to be used.
pub fn add_awgn<R: Rng + ?Sized>(samples: &mut [f64], noise_var: f64, rng: &mut R) {
    if noise_var <= 0.0 {
        return;
    }
    let sigma = noise_var.sqrt();
    for x in samples {
        *x += sigma * rng.sample::<f64, _>(StandardNormal);
    }
}

/// Adds circularly symmetric complex white Gaussian noise of given total variance to complex
/// samples (half of the variance in each of the real and imaginary parts).
pub fn add_complex_awgn<R: Rng + ?Sized>(samples: &mut [Complex64], noise_var: f64, rng: &mut R) {
    if noise_var <= 0.0 {
        return;
    }
    let sigma = (0.5 * noise_var).sqrt();
    for x in samples {
        let re: f64 = rng.sample(StandardNormal);
        let im: f64 = rng.sample(StandardNormal);
        *x += Complex64::new(sigma * re, sigma * im);
    }
}

/// Returns number of bit errors between two byte sequences.
///
/// Bytes missing from the shorter sequence count as eight errors each.
#[must_use]
pub fn bit_error_count(bytes: &[u8], ref_bytes: &[u8]) -> usize {
    let common: usize = bytes
        .iter()
        .zip(ref_bytes)
        .map(|(&x, &y)| (x ^ y).count_ones() as usize)
        .sum();
    common + 8 * bytes.len().abs_diff(ref_bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::Lcg;

    #[test]
    fn test_random_bytes() {
        let mut rng = Lcg::new(1);
        assert!(random_bytes(0, &mut rng).is_empty());
        let num_bytes = 10000;
        let bytes = random_bytes(num_bytes, &mut rng);
        let num_ones: usize = bytes.iter().map(|b| b.count_ones() as usize).sum();
        assert!(num_ones > 9 * 8 * num_bytes / 20 && num_ones < 11 * 8 * num_bytes / 20);
        // Same seed, same payload
        assert_eq!(random_bytes(64, &mut Lcg::new(5)), random_bytes(64, &mut Lcg::new(5)));
    }

    #[test]
    fn test_bytes_to_bits() {
        assert!(bytes_to_bits(&[]).is_empty());
        assert_eq!(bytes_to_bits(&[0xA5]), [1, 0, 1, 0, 0, 1, 0, 1]);
        assert_eq!(bytes_to_bits(&[0x80, 0x01]).len(), 16);
    }

    #[test]
    fn test_bits_to_bytes() {
        assert!(bits_to_bytes(&[]).is_empty());
        assert_eq!(bits_to_bytes(&[1, 0, 1, 0, 0, 1, 0, 1]), [0xA5]);
        assert_eq!(bits_to_bytes(&[1, 1, 1]), [0xE0]);
        let bytes = [0x00, 0xFF, 0x3C, 0x81];
        assert_eq!(bits_to_bytes(&bytes_to_bits(&bytes)), bytes);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_add_awgn() {
        let mut rng = Lcg::new(3);
        let mut samples = vec![1.0; 20000];
        add_awgn(&mut samples, 0.0, &mut rng);
        assert!(samples.iter().all(|&x| x == 1.0));
        add_awgn(&mut samples, 0.25, &mut rng);
        let var_est =
            samples.iter().map(|x| (x - 1.0) * (x - 1.0)).sum::<f64>() / samples.len() as f64;
        assert!(var_est > 0.22 && var_est < 0.28);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_add_complex_awgn() {
        let mut rng = Lcg::new(4);
        let mut samples = vec![Complex64::new(1.0, 0.0); 20000];
        add_complex_awgn(&mut samples, 0.5, &mut rng);
        let var_est = samples
            .iter()
            .map(|x| (x - Complex64::new(1.0, 0.0)).norm_sqr())
            .sum::<f64>()
            / samples.len() as f64;
        assert!(var_est > 0.45 && var_est < 0.55);
    }

    #[test]
    fn test_bit_error_count() {
        assert_eq!(bit_error_count(&[], &[]), 0);
        assert_eq!(bit_error_count(&[0xFF], &[0xFE]), 1);
        assert_eq!(bit_error_count(&[0x0F, 0x00], &[0xF0]), 16);
        assert_eq!(bit_error_count(&[0x81], &[0x81, 0x00, 0x00]), 16);
    }
}
