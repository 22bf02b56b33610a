//! Arithmetic in the Galois field GF(2^m)

use crate::Error;

/// Smallest supported field exponent
pub const MIN_SYMBOL_SIZE: u32 = 3;

/// Largest supported field exponent
pub const MAX_SYMBOL_SIZE: u32 = 16;

/// Table-driven Galois field GF(2^m) generated by a primitive polynomial
///
/// Field elements are the integers `0 .. 2^m`, with bit `i` holding the coefficient of `x^i`.
/// The primitive element is `alpha = 2`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct GaloisField {
    /// Field exponent `m`
    symbol_size: u32,
    /// Primitive polynomial including the `x^m` term
    primpoly: u32,
    /// Multiplicative order `2^m - 1`
    order: usize,
    /// Powers of alpha, duplicated so that sums of two logarithms index directly
    exp: Vec<u16>,
    /// Discrete logarithms (entry `0` is unused)
    log: Vec<u16>,
    /// Multiplicative inverses (entry `0` is `0`)
    inv: Vec<u16>,
}

impl GaloisField {
    /// Returns Galois field GF(2^m) for given exponent and primitive polynomial.
    ///
    /// # Parameters
    ///
    /// - `symbol_size`: Field exponent `m`, in the range `[3, 16]`.
    ///
    /// - `primpoly`: Integer representation of a primitive polynomial of degree exactly `m`
    ///   (e.g., `0x11D` for `x^8 + x^4 + x^3 + x^2 + 1`).
    ///
    /// # Errors
    ///
    /// Returns an error if `symbol_size` is out of range, if `primpoly` does not have degree `m`,
    /// or if `primpoly` is not primitive (the powers of `alpha` repeat early).
    ///
    /// # Examples
    ///
    /// ```
    /// use fsolink::galois::GaloisField;
    ///
    /// let gf = GaloisField::new(8, 0x11D)?;
    /// assert_eq!(gf.mul(2, gf.inv(2)), 1);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(symbol_size: u32, primpoly: u32) -> Result<Self, Error> {
        if !(MIN_SYMBOL_SIZE ..= MAX_SYMBOL_SIZE).contains(&symbol_size) {
            return Err(Error::InvalidParam(format!(
                "Symbol size must be in [{MIN_SYMBOL_SIZE}, {MAX_SYMBOL_SIZE}] (found {symbol_size})"
            )));
        }
        if primpoly >> symbol_size != 1 {
            return Err(Error::InvalidParam(format!(
                "Primitive polynomial {primpoly:#x} does not have degree {symbol_size}"
            )));
        }
        let field_size = 1usize << symbol_size;
        let order = field_size - 1;
        let mut exp = vec![0u16; 2 * order];
        let mut log = vec![0u16; field_size];
        let mut seen = vec![false; field_size];
        let mut x = 1usize;
        for (i, slot) in exp.iter_mut().take(order).enumerate() {
            if seen[x] {
                return Err(Error::InvalidParam(format!(
                    "Polynomial {primpoly:#x} is not primitive (alpha has order {i})"
                )));
            }
            seen[x] = true;
            *slot = as_element(x);
            log[x] = as_element(i);
            x <<= 1;
            if x >= field_size {
                x ^= primpoly as usize;
            }
        }
        exp.copy_within(0 .. order, order);
        let mut inv = vec![0u16; field_size];
        for a in 1 .. field_size {
            inv[a] = exp[order - usize::from(log[a])];
        }
        Ok(Self {
            symbol_size,
            primpoly,
            order,
            exp,
            log,
            inv,
        })
    }

    /// Returns field exponent `m`.
    #[must_use]
    pub fn symbol_size(&self) -> u32 {
        self.symbol_size
    }

    /// Returns primitive polynomial.
    #[must_use]
    pub fn primpoly(&self) -> u32 {
        self.primpoly
    }

    /// Returns number of field elements `2^m`.
    #[must_use]
    pub fn size(&self) -> usize {
        self.order + 1
    }

    /// Returns multiplicative order `2^m - 1` of the primitive element.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    /// Returns sum (and difference) of two elements.
    #[must_use]
    pub fn add(&self, a: u16, b: u16) -> u16 {
        a ^ b
    }

    /// Returns product of two elements.
    #[must_use]
    pub fn mul(&self, a: u16, b: u16) -> u16 {
        if a == 0 || b == 0 {
            return 0;
        }
        self.exp[usize::from(self.log[usize::from(a)]) + usize::from(self.log[usize::from(b)])]
    }

    /// Returns quotient `a / b`, with `0` returned if either input is `0`.
    #[must_use]
    pub fn div(&self, a: u16, b: u16) -> u16 {
        if a == 0 || b == 0 {
            return 0;
        }
        let la = usize::from(self.log[usize::from(a)]);
        let lb = usize::from(self.log[usize::from(b)]);
        self.exp[la + self.order - lb]
    }

    /// Returns `a` raised to the power `e` (with `a^0 = 1` and `0^e = 0` for `e > 0`).
    #[must_use]
    pub fn pow(&self, a: u16, e: usize) -> u16 {
        if e == 0 {
            return 1;
        }
        if a == 0 {
            return 0;
        }
        self.exp[(usize::from(self.log[usize::from(a)]) * (e % self.order)) % self.order]
    }

    /// Returns multiplicative inverse of `a` (`0` for `a = 0`).
    #[must_use]
    pub fn inv(&self, a: u16) -> u16 {
        self.inv[usize::from(a)]
    }

    /// Returns `alpha^i` for any integer exponent (negative exponents allowed).
    #[must_use]
    pub fn alpha_pow(&self, i: i64) -> u16 {
        let order = i64::try_from(self.order).unwrap_or(i64::MAX);
        self.exp[usize::try_from(i.rem_euclid(order)).unwrap_or(0)]
    }

    /// Returns discrete logarithm of `a` (`0` for `a = 0`).
    #[must_use]
    pub fn log(&self, a: u16) -> usize {
        usize::from(self.log[usize::from(a)])
    }

    /// Evaluates polynomial with coefficients in ascending powers (`poly[0]` is the constant term).
    #[must_use]
    pub fn poly_eval(&self, poly: &[u16], x: u16) -> u16 {
        poly.iter()
            .rev()
            .fold(0, |acc, &coeff| self.mul(acc, x) ^ coeff)
    }
}

/// Converts an index known to be below `2^16` into a field element.
#[allow(clippy::cast_possible_truncation)]
fn as_element(x: usize) -> u16 {
    x as u16
}

#[cfg(test)]
mod tests_of_galois_field {
    use super::*;

    #[test]
    fn test_new() {
        // Invalid inputs
        assert!(GaloisField::new(2, 0x7).is_err());
        assert!(GaloisField::new(17, 0x2_0009).is_err());
        assert!(GaloisField::new(8, 0x1D).is_err());
        assert!(GaloisField::new(8, 0x21D).is_err());
        // x^4 + 1 = (x + 1)^4 is not primitive
        assert!(GaloisField::new(4, 0x11).is_err());
        // Valid inputs
        let gf = GaloisField::new(4, 0x13).unwrap();
        assert_eq!(gf.size(), 16);
        assert_eq!(gf.exp.len(), 30);
        assert_eq!(gf.exp[..6], [1, 2, 4, 8, 3, 6]);
        assert_eq!(gf.exp[15], 1);
        assert_eq!(gf.inv[0], 0);
        assert!(GaloisField::new(16, 0x1_100B).is_ok());
    }

    #[test]
    fn test_inverse() {
        let gf = GaloisField::new(8, 0x11D).unwrap();
        for a in 1 .. 256 {
            assert_eq!(gf.mul(a, gf.inv(a)), 1);
        }
    }

    #[test]
    fn test_commutativity() {
        let gf = GaloisField::new(8, 0x11D).unwrap();
        for a in 0 .. 256 {
            for b in 0 .. 256 {
                assert_eq!(gf.mul(a, b), gf.mul(b, a));
            }
        }
    }

    #[test]
    fn test_associativity() {
        let gf = GaloisField::new(8, 0x11D).unwrap();
        for a in 0 .. 256 {
            for b in (0 .. 256).step_by(3) {
                for c in (0 .. 256).step_by(7) {
                    assert_eq!(
                        gf.mul(gf.mul(a, b), c),
                        gf.mul(a, gf.mul(b, c))
                    );
                }
            }
        }
    }

    #[test]
    fn test_add() {
        let gf = GaloisField::new(8, 0x11D).unwrap();
        for a in 0 .. 256 {
            assert_eq!(gf.add(a, a), 0);
            assert_eq!(gf.add(a, 0), a);
            assert_eq!(gf.add(gf.add(a, 0x5A), 0x5A), a);
        }
    }

    #[test]
    fn test_distributivity() {
        let gf = GaloisField::new(5, 0x25).unwrap();
        for a in 0 .. 32 {
            for b in 0 .. 32 {
                for c in 0 .. 32 {
                    assert_eq!(gf.mul(a, b ^ c), gf.mul(a, b) ^ gf.mul(a, c));
                }
            }
        }
    }

    #[test]
    fn test_div() {
        let gf = GaloisField::new(8, 0x11D).unwrap();
        assert_eq!(gf.div(0, 7), 0);
        assert_eq!(gf.div(7, 0), 0);
        for a in 1 .. 256 {
            assert_eq!(gf.div(gf.mul(a, 29), 29), a);
        }
    }

    #[test]
    fn test_pow() {
        let gf = GaloisField::new(8, 0x11D).unwrap();
        assert_eq!(gf.pow(0, 0), 1);
        assert_eq!(gf.pow(0, 5), 0);
        assert_eq!(gf.pow(2, 8), 0x1D);
        assert_eq!(gf.pow(3, 255), 1);
        assert_eq!(gf.pow(7, 3), gf.mul(7, gf.mul(7, 7)));
    }

    #[test]
    fn test_alpha_pow() {
        let gf = GaloisField::new(8, 0x11D).unwrap();
        assert_eq!(gf.alpha_pow(0), 1);
        assert_eq!(gf.alpha_pow(255), 1);
        assert_eq!(gf.mul(gf.alpha_pow(-3), gf.alpha_pow(3)), 1);
        assert_eq!(gf.log(gf.alpha_pow(100)), 100);
    }

    #[test]
    fn test_poly_eval() {
        let gf = GaloisField::new(8, 0x11D).unwrap();
        // 3 + 2x + x^2 at x = 2: 3 ^ 4 ^ 4 = 3
        assert_eq!(gf.poly_eval(&[3, 2, 1], 2), 3);
        assert_eq!(gf.poly_eval(&[], 9), 0);
        assert_eq!(gf.poly_eval(&[5], 0), 5);
    }
}
