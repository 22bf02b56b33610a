//! Systematic Reed-Solomon encoder and decoder over GF(2^m)
//!
//! A codeword of length `n` holds the `k` data symbols followed by `n - k` parity symbols.
//! Symbol `j` of a codeword is the coefficient of `x^(n-1-j)` in the codeword polynomial, so the
//! data symbols are the high-order coefficients of `d(x) * x^(n-k)` and the parity symbols are the
//! remainder of its division by the generator polynomial
//! `g(x) = (x - alpha^fcr) (x - alpha^(fcr+1)) ... (x - alpha^(fcr+n-k-1))`.
//!
//! Decoding computes the `n - k` syndromes, finds the error locator with Berlekamp-Massey, the
//! error positions with a Chien search and the error values with Forney's formula. Up to
//! `(n - k) / 2` symbol errors are corrected.

use serde::{Deserialize, Serialize};

use crate::galois::{GaloisField, MAX_SYMBOL_SIZE, MIN_SYMBOL_SIZE};
use crate::Error;

/// Parameters of a Reed-Solomon code
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct RsConfig {
    /// Codeword length in symbols (at most `2^m - 1`)
    pub n: usize,
    /// Number of data symbols per codeword
    pub k: usize,
    /// Bits per symbol `m`
    pub symbol_size: u32,
    /// Logarithm of the first consecutive root of the generator polynomial
    pub first_root: u32,
    /// Primitive polynomial of the symbol field
    pub primpoly: u32,
}

impl RsConfig {
    /// Returns RS(255, 223) over GF(2^8), correcting up to 16 symbol errors.
    #[must_use]
    pub fn ccsds() -> Self {
        Self::byte_code(255, 223)
    }

    /// Returns RS(255, 239) over GF(2^8), correcting up to 8 symbol errors.
    #[must_use]
    pub fn dvb() -> Self {
        Self::byte_code(255, 239)
    }

    /// Returns byte-oriented RS(n, k) code over GF(2^8) with primitive polynomial `0x11D`.
    #[must_use]
    pub fn byte_code(n: usize, k: usize) -> Self {
        Self {
            n,
            k,
            symbol_size: 8,
            first_root: 1,
            primpoly: 0x11D,
        }
    }

    /// Returns number of parity symbols (roots of the generator polynomial).
    #[must_use]
    pub fn num_roots(&self) -> usize {
        self.n.saturating_sub(self.k)
    }

    /// Returns number of correctable symbol errors per codeword.
    #[must_use]
    pub fn t(&self) -> usize {
        self.num_roots() / 2
    }

    /// Checks validity of the parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol size is outside `[3, 16]`, if `n > 2^m - 1`, or if
    /// `n > k > 0` does not hold. The primitive polynomial is checked when the field is built.
    pub fn validate(&self) -> Result<(), Error> {
        if !(MIN_SYMBOL_SIZE ..= MAX_SYMBOL_SIZE).contains(&self.symbol_size) {
            return Err(Error::InvalidParam(format!(
                "RS symbol size must be in [{MIN_SYMBOL_SIZE}, {MAX_SYMBOL_SIZE}] (found {})",
                self.symbol_size
            )));
        }
        let max_len = (1usize << self.symbol_size) - 1;
        if self.n > max_len {
            return Err(Error::InvalidParam(format!(
                "RS codeword length {} exceeds {max_len} for {}-bit symbols",
                self.n, self.symbol_size
            )));
        }
        if self.k == 0 || self.k >= self.n {
            return Err(Error::InvalidParam(format!(
                "RS parameters must satisfy n > k > 0 (found n = {}, k = {})",
                self.n, self.k
            )));
        }
        Ok(())
    }
}

/// Outcome of decoding one Reed-Solomon codeword
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RsDecoded {
    /// Decoded data symbols (the received data symbols if the codeword is uncorrectable)
    pub data: Vec<u16>,
    /// Whether any syndrome was nonzero
    pub errors_detected: bool,
    /// Number of symbol errors corrected
    pub errors_corrected: usize,
    /// Whether the codeword could not be corrected
    pub uncorrectable: bool,
}

/// Reed-Solomon codec
#[derive(Clone, Debug)]
pub struct ReedSolomon {
    /// Code parameters
    config: RsConfig,
    /// Symbol field
    gf: GaloisField,
    /// Generator polynomial coefficients in ascending powers (monic, degree `n - k`)
    generator: Vec<u16>,
}

impl ReedSolomon {
    /// Returns Reed-Solomon codec for given parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid (see [`RsConfig::validate`]) or the
    /// polynomial is not primitive of degree `symbol_size`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fsolink::reed_solomon::{ReedSolomon, RsConfig};
    ///
    /// let rs = ReedSolomon::new(RsConfig::ccsds())?;
    /// let data: Vec<u16> = (0 .. 223).collect();
    /// let mut codeword = rs.encode(&data)?;
    /// codeword[5] ^= 0x42;
    /// let decoded = rs.decode(&codeword)?;
    /// assert_eq!(decoded.data, data);
    /// assert_eq!(decoded.errors_corrected, 1);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(config: RsConfig) -> Result<Self, Error> {
        config.validate()?;
        let gf = GaloisField::new(config.symbol_size, config.primpoly)?;
        let generator = generator_polynomial(&gf, &config);
        Ok(Self {
            config,
            gf,
            generator,
        })
    }

    /// Returns code parameters.
    #[must_use]
    pub fn config(&self) -> &RsConfig {
        &self.config
    }

    /// Returns generator polynomial coefficients in ascending powers.
    #[must_use]
    pub fn generator(&self) -> &[u16] {
        &self.generator
    }

    /// Returns systematic codeword for given data symbols.
    ///
    /// # Errors
    ///
    /// Returns an error if `data.len()` is not `k` or a symbol does not fit in `m` bits.
    pub fn encode(&self, data: &[u16]) -> Result<Vec<u16>, Error> {
        self.check_symbols(data, self.config.k, "data")?;
        let num_roots = self.config.num_roots();
        let mut remainder = vec![0u16; num_roots];
        for &symbol in data {
            let feedback = symbol ^ remainder[num_roots - 1];
            remainder.copy_within(0 .. num_roots - 1, 1);
            remainder[0] = 0;
            if feedback != 0 {
                for (r, &g) in remainder.iter_mut().zip(&self.generator) {
                    *r ^= self.gf.mul(feedback, g);
                }
            }
        }
        let mut codeword = Vec::with_capacity(self.config.n);
        codeword.extend_from_slice(data);
        codeword.extend(remainder.iter().rev());
        Ok(codeword)
    }

    /// Returns decoded data symbols and correction statistics for a received codeword.
    ///
    /// A codeword that cannot be corrected is not an error: its received data symbols are
    /// returned with `uncorrectable` set.
    ///
    /// # Errors
    ///
    /// Returns an error if `received.len()` is not `n` or a symbol does not fit in `m` bits.
    pub fn decode(&self, received: &[u16]) -> Result<RsDecoded, Error> {
        self.check_symbols(received, self.config.n, "received")?;
        let k = self.config.k;
        let syndromes = self.syndromes(received);
        if syndromes.iter().all(|&s| s == 0) {
            return Ok(RsDecoded {
                data: received[.. k].to_vec(),
                errors_detected: false,
                errors_corrected: 0,
                uncorrectable: false,
            });
        }
        let failure = RsDecoded {
            data: received[.. k].to_vec(),
            errors_detected: true,
            errors_corrected: 0,
            uncorrectable: true,
        };
        let Some(locator) = self.berlekamp_massey(&syndromes) else {
            return Ok(failure);
        };
        let Some(powers) = self.chien_search(&locator) else {
            return Ok(failure);
        };
        let Some(magnitudes) = self.forney(&syndromes, &locator, &powers) else {
            return Ok(failure);
        };
        let mut corrected = received.to_vec();
        for (&p, &e) in powers.iter().zip(&magnitudes) {
            corrected[self.config.n - 1 - p] ^= e;
        }
        if self.syndromes(&corrected).iter().any(|&s| s != 0) {
            return Ok(failure);
        }
        corrected.truncate(k);
        Ok(RsDecoded {
            data: corrected,
            errors_detected: true,
            errors_corrected: powers.len(),
            uncorrectable: false,
        })
    }

    /// Returns syndromes `S_i = r(alpha^(fcr+i))` for `i` in `[0, n-k)`.
    fn syndromes(&self, received: &[u16]) -> Vec<u16> {
        (0 .. self.config.num_roots())
            .map(|i| {
                let root = self.gf.alpha_pow(i64::from(self.config.first_root) + as_i64(i));
                received
                    .iter()
                    .fold(0, |acc, &r| self.gf.mul(acc, root) ^ r)
            })
            .collect()
    }

    /// Returns error locator polynomial (ascending powers, constant term `1`), or `None` if it
    /// declares more errors than the code can correct.
    fn berlekamp_massey(&self, syndromes: &[u16]) -> Option<Vec<u16>> {
        let num_roots = syndromes.len();
        let mut locator = vec![0u16; num_roots + 1];
        locator[0] = 1;
        let mut prev = locator.clone();
        let mut num_errors = 0;
        let mut shift = 1;
        let mut prev_discrepancy = 1u16;
        for step in 0 .. num_roots {
            let mut discrepancy = syndromes[step];
            for i in 1 ..= num_errors {
                discrepancy ^= self.gf.mul(locator[i], syndromes[step - i]);
            }
            if discrepancy == 0 {
                shift += 1;
                continue;
            }
            let coeff = self.gf.div(discrepancy, prev_discrepancy);
            let saved = (2 * num_errors <= step).then(|| locator.clone());
            for i in 0 ..= num_roots - shift {
                locator[i + shift] ^= self.gf.mul(coeff, prev[i]);
            }
            if let Some(saved) = saved {
                num_errors = step + 1 - num_errors;
                prev = saved;
                prev_discrepancy = discrepancy;
                shift = 1;
            } else {
                shift += 1;
            }
        }
        let degree = locator.iter().rposition(|&c| c != 0).unwrap_or(0);
        if degree > self.config.t() || degree != num_errors {
            return None;
        }
        locator.truncate(degree + 1);
        Some(locator)
    }

    /// Returns powers `p` (in `[0, n)`) with `alpha^(-p)` a root of the locator, or `None` if the
    /// number of roots found differs from the locator degree.
    fn chien_search(&self, locator: &[u16]) -> Option<Vec<usize>> {
        let powers: Vec<usize> = (0 .. self.config.n)
            .filter(|&p| self.gf.poly_eval(locator, self.gf.alpha_pow(-as_i64(p))) == 0)
            .collect();
        (powers.len() == locator.len() - 1).then_some(powers)
    }

    /// Returns error values at given error powers, or `None` if the locator derivative vanishes.
    fn forney(&self, syndromes: &[u16], locator: &[u16], powers: &[usize]) -> Option<Vec<u16>> {
        let num_roots = syndromes.len();
        // Error evaluator: S(x) * locator(x) mod x^(n-k)
        let mut evaluator = vec![0u16; num_roots];
        for (i, slot) in evaluator.iter_mut().enumerate() {
            for (j, &l) in locator.iter().enumerate().take(i + 1) {
                *slot ^= self.gf.mul(l, syndromes[i - j]);
            }
        }
        // Formal derivative keeps only odd powers in characteristic 2
        let derivative: Vec<u16> = locator
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, &l)| if i % 2 == 1 { l } else { 0 })
            .collect();
        let fcr = i64::from(self.config.first_root);
        powers
            .iter()
            .map(|&p| {
                let x_inv = self.gf.alpha_pow(-as_i64(p));
                let denom = self.gf.poly_eval(&derivative, x_inv);
                if denom == 0 {
                    return None;
                }
                let scale = self.gf.alpha_pow(as_i64(p) * (1 - fcr));
                let numer = self.gf.mul(scale, self.gf.poly_eval(&evaluator, x_inv));
                Some(self.gf.div(numer, denom))
            })
            .collect()
    }

    /// Checks length and range of a symbol sequence.
    fn check_symbols(&self, symbols: &[u16], expected_len: usize, what: &str) -> Result<(), Error> {
        if symbols.len() != expected_len {
            return Err(Error::InvalidParam(format!(
                "Invalid RS {what} length (expected {expected_len}, found {})",
                symbols.len()
            )));
        }
        let field_size = self.gf.size();
        if let Some(&bad) = symbols.iter().find(|&&s| usize::from(s) >= field_size) {
            return Err(Error::InvalidParam(format!(
                "Symbol {bad} does not fit in {} bits",
                self.config.symbol_size
            )));
        }
        Ok(())
    }
}

/// Returns generator polynomial `prod_{i=0}^{n-k-1} (x - alpha^(fcr+i))` in ascending powers.
fn generator_polynomial(gf: &GaloisField, config: &RsConfig) -> Vec<u16> {
    let num_roots = config.num_roots();
    let mut generator = vec![0u16; num_roots + 1];
    generator[0] = 1;
    for i in 0 .. num_roots {
        let root = gf.alpha_pow(i64::from(config.first_root) + as_i64(i));
        for j in (0 ..= i + 1).rev() {
            let shifted = if j > 0 { generator[j - 1] } else { 0 };
            generator[j] = shifted ^ gf.mul(generator[j], root);
        }
    }
    generator
}

/// Converts a symbol index into a signed exponent.
fn as_i64(x: usize) -> i64 {
    i64::try_from(x).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests_of_reed_solomon {
    use super::*;

    fn data_pattern(k: usize, salt: usize) -> Vec<u16> {
        (0 .. k)
            .map(|i| u16::try_from((i * 37 + salt * 11 + 5) % 256).unwrap())
            .collect()
    }

    #[test]
    fn test_validate() {
        assert!(RsConfig::ccsds().validate().is_ok());
        assert!(RsConfig::byte_code(256, 223).validate().is_err());
        assert!(RsConfig::byte_code(255, 255).validate().is_err());
        assert!(RsConfig::byte_code(255, 0).validate().is_err());
        let mut config = RsConfig::ccsds();
        config.symbol_size = 2;
        assert!(config.validate().is_err());
        config.symbol_size = 8;
        config.primpoly = 0x1D;
        assert!(ReedSolomon::new(config).is_err());
    }

    #[test]
    fn test_generator_polynomial() {
        let rs = ReedSolomon::new(RsConfig::byte_code(15, 11)).unwrap();
        let g = rs.generator();
        assert_eq!(g.len(), 5);
        assert_eq!(g[4], 1);
        for i in 0 .. 4 {
            assert_eq!(rs.gf.poly_eval(g, rs.gf.alpha_pow(1 + i)), 0);
        }
    }

    #[test]
    fn test_encode() {
        let rs = ReedSolomon::new(RsConfig::ccsds()).unwrap();
        assert!(rs.encode(&[0; 222]).is_err());
        let data = data_pattern(223, 0);
        let codeword = rs.encode(&data).unwrap();
        assert_eq!(codeword.len(), 255);
        assert_eq!(codeword[.. 223], data[..]);
        assert!(rs.syndromes(&codeword).iter().all(|&s| s == 0));
        assert!(rs.encode(&[0; 223]).unwrap().iter().all(|&s| s == 0));
    }

    #[test]
    fn test_encode_rejects_wide_symbols() {
        let config = RsConfig {
            n: 15,
            k: 11,
            symbol_size: 4,
            first_root: 0,
            primpoly: 0x13,
        };
        let rs = ReedSolomon::new(config).unwrap();
        assert!(rs.encode(&[16; 11]).is_err());
        let codeword = rs.encode(&[15; 11]).unwrap();
        assert!(codeword.iter().all(|&s| s < 16));
    }

    #[test]
    fn test_decode_clean() {
        let rs = ReedSolomon::new(RsConfig::ccsds()).unwrap();
        for salt in 0 .. 8 {
            let data = data_pattern(223, salt);
            let decoded = rs.decode(&rs.encode(&data).unwrap()).unwrap();
            assert_eq!(decoded.data, data);
            assert_eq!(decoded.errors_corrected, 0);
            assert!(!decoded.errors_detected);
            assert!(!decoded.uncorrectable);
        }
    }

    #[test]
    fn test_decode_corrects_up_to_t_errors() {
        let rs = ReedSolomon::new(RsConfig::ccsds()).unwrap();
        for num_errors in 1 ..= 16 {
            let data = data_pattern(223, num_errors);
            let mut codeword = rs.encode(&data).unwrap();
            for e in 0 .. num_errors {
                let pos = (e * 97 + num_errors * 13) % 255;
                codeword[pos] ^= u16::try_from(1 + (e * 29) % 255).unwrap();
            }
            let decoded = rs.decode(&codeword).unwrap();
            assert!(!decoded.uncorrectable, "{num_errors} errors");
            assert_eq!(decoded.data, data);
            assert_eq!(decoded.errors_corrected, num_errors);
        }
    }

    #[test]
    fn test_decode_parity_errors() {
        let rs = ReedSolomon::new(RsConfig::dvb()).unwrap();
        let data = data_pattern(239, 3);
        let mut codeword = rs.encode(&data).unwrap();
        codeword[240] ^= 1;
        codeword[254] ^= 0xFF;
        let decoded = rs.decode(&codeword).unwrap();
        assert_eq!(decoded.data, data);
        assert_eq!(decoded.errors_corrected, 2);
    }

    #[test]
    fn test_decode_general_first_root() {
        let config = RsConfig {
            n: 31,
            k: 23,
            symbol_size: 5,
            first_root: 0,
            primpoly: 0x25,
        };
        let rs = ReedSolomon::new(config).unwrap();
        let data: Vec<u16> = (0 .. 23).map(|i| (i * 7) % 32).collect();
        let mut codeword = rs.encode(&data).unwrap();
        codeword[0] ^= 3;
        codeword[17] ^= 31;
        codeword[30] ^= 8;
        let decoded = rs.decode(&codeword).unwrap();
        assert_eq!(decoded.data, data);
        assert_eq!(decoded.errors_corrected, 3);
    }

    #[test]
    fn test_decode_shortened() {
        let rs = ReedSolomon::new(RsConfig::byte_code(64, 48)).unwrap();
        let data = data_pattern(48, 1);
        let mut codeword = rs.encode(&data).unwrap();
        for pos in [0, 10, 20, 30, 40, 50, 60, 63] {
            codeword[pos] ^= 0x5A;
        }
        let decoded = rs.decode(&codeword).unwrap();
        assert_eq!(decoded.data, data);
        assert_eq!(decoded.errors_corrected, 8);
    }

    #[test]
    fn test_decode_uncorrectable() {
        let rs = ReedSolomon::new(RsConfig::byte_code(255, 247)).unwrap();
        let data = data_pattern(247, 2);
        let mut codeword = rs.encode(&data).unwrap();
        for pos in 0 .. 40 {
            codeword[pos * 6] ^= 0x33;
        }
        let decoded = rs.decode(&codeword).unwrap();
        assert!(decoded.errors_detected);
        assert!(decoded.uncorrectable || decoded.data != data);
        if decoded.uncorrectable {
            assert_eq!(decoded.data[..], codeword[.. 247]);
        }
        assert!(rs.decode(&codeword[.. 254]).is_err());
    }
}
