//! On-off keying, pulse-position and differential phase-shift keying modulators
//!
//! OOK and M-PPM produce real slot amplitudes; DPSK produces unit-magnitude complex samples. A
//! [`Modulator`] keeps the DPSK transmit phase and receive reference across calls, so a stream
//! split over several calls modulates and demodulates exactly like the whole stream at once.

use std::f64::consts::{PI, TAU};

use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::numeric::{complex_signal_power, signal_power};
use crate::utils::{add_awgn, add_complex_awgn, bits_to_bytes, bytes_to_bits};
use crate::Error;

/// Largest supported PPM order
pub const MAX_PPM_ORDER: usize = 256;

/// Amplitude of an "on" slot
const ON_AMPLITUDE: f64 = 1.0;

/// OOK decision threshold, midway between the "off" level and the "on" amplitude
///
/// Samples are amplitude-normalized, so the midpoint does not move with SNR.
const OOK_THRESHOLD: f64 = 0.5 * ON_AMPLITUDE;

/// Enumeration of modulation schemes
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum ModulationKind {
    /// On-off keying, one slot per bit
    Ook,
    /// Pulse-position modulation with `order` slots per symbol
    Ppm {
        /// Number of slots per symbol (power of two)
        order: usize,
    },
    /// Binary differential phase-shift keying
    Dpsk,
}

impl ModulationKind {
    /// Returns number of bits carried per symbol.
    #[must_use]
    pub fn bits_per_symbol(&self) -> usize {
        match self {
            ModulationKind::Ook | ModulationKind::Dpsk => 1,
            ModulationKind::Ppm { order } => order.trailing_zeros() as usize,
        }
    }

    /// Returns number of samples produced for a stream of given length in bytes.
    #[must_use]
    pub fn num_samples(&self, num_bytes: usize) -> usize {
        match self {
            ModulationKind::Ook | ModulationKind::Dpsk => 8 * num_bytes,
            ModulationKind::Ppm { order } => (8 * num_bytes).div_ceil(self.bits_per_symbol()) * order,
        }
    }

    /// Checks that a PPM order is a power of two in `[2, 256]`.
    ///
    /// # Errors
    ///
    /// Returns an error for any other PPM order.
    pub fn validate(&self) -> Result<(), Error> {
        if let ModulationKind::Ppm { order } = self {
            if !order.is_power_of_two() || !(2 ..= MAX_PPM_ORDER).contains(order) {
                return Err(Error::Unsupported(format!(
                    "PPM order must be a power of two in [2, {MAX_PPM_ORDER}] (found {order})"
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ModulationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModulationKind::Ook => f.write_str("ook"),
            ModulationKind::Ppm { order } => write!(f, "{order}-ppm"),
            ModulationKind::Dpsk => f.write_str("dpsk"),
        }
    }
}

impl std::str::FromStr for ModulationKind {
    type Err = Error;

    /// Parses `ook`, `dpsk`, `ppm` (order 4) or `<M>-ppm`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let kind = match lower.as_str() {
            "ook" => ModulationKind::Ook,
            "dpsk" => ModulationKind::Dpsk,
            "ppm" => ModulationKind::Ppm { order: 4 },
            other => {
                let order = other
                    .strip_suffix("-ppm")
                    .and_then(|m| m.parse().ok())
                    .ok_or_else(|| Error::Unsupported(format!("Unknown modulation \"{s}\"")))?;
                ModulationKind::Ppm { order }
            }
        };
        kind.validate()?;
        Ok(kind)
    }
}

/// Modulated sample stream
#[derive(Clone, PartialEq, Debug)]
pub enum Samples {
    /// Real slot amplitudes (OOK, PPM)
    Real(Vec<f64>),
    /// Complex baseband samples (DPSK)
    Complex(Vec<Complex64>),
}

impl Samples {
    /// Returns number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Samples::Real(x) => x.len(),
            Samples::Complex(x) => x.len(),
        }
    }

    /// Returns whether there are no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns mean power (squared magnitude) of the samples.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no samples.
    pub fn power(&self) -> Result<f64, Error> {
        match self {
            Samples::Real(x) => signal_power(x),
            Samples::Complex(x) => complex_signal_power(x),
        }
    }

    /// Multiplies every sample amplitude by `gain`.
    pub fn scale(&mut self, gain: f64) {
        match self {
            Samples::Real(x) => x.iter_mut().for_each(|s| *s *= gain),
            Samples::Complex(x) => x.iter_mut().for_each(|s| *s *= gain),
        }
    }

    /// Adds white Gaussian noise of given variance per sample.
    pub fn add_noise<R: Rng + ?Sized>(&mut self, noise_var: f64, rng: &mut R) {
        match self {
            Samples::Real(x) => add_awgn(x, noise_var, rng),
            Samples::Complex(x) => add_complex_awgn(x, noise_var, rng),
        }
    }
}

/// Persistent DPSK state
#[derive(Clone, Copy, PartialEq, Debug)]
struct DpskState {
    /// Phase of the last transmitted sample
    tx_phase: f64,
    /// Last received sample (reference for differential detection)
    rx_reference: Complex64,
}

impl Default for DpskState {
    fn default() -> Self {
        Self {
            tx_phase: 0.0,
            rx_reference: Complex64::new(1.0, 0.0),
        }
    }
}

/// Modulator and demodulator for one sample stream
#[derive(Clone, PartialEq, Debug)]
pub struct Modulator {
    /// Modulation scheme
    kind: ModulationKind,
    /// Symbol rate (symbols per second)
    symbol_rate: f64,
    /// DPSK phase memory (unused by OOK and PPM)
    dpsk: DpskState,
}

impl Modulator {
    /// Returns modulator for given scheme and symbol rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol rate is not positive and finite, or if a PPM order is not a
    /// power of two in `[2, 256]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fsolink::modulation::{ModulationKind, Modulator};
    ///
    /// let mut modulator = Modulator::new(ModulationKind::Ppm { order: 4 }, 1e9)?;
    /// let samples = modulator.modulate(&[0b0001_1011]);
    /// assert_eq!(samples.len(), 16);
    /// assert_eq!(modulator.demodulate(&samples, 20.0)?, [0b0001_1011]);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(kind: ModulationKind, symbol_rate: f64) -> Result<Self, Error> {
        if !(symbol_rate.is_finite() && symbol_rate > 0.0) {
            return Err(Error::InvalidParam(format!(
                "Symbol rate must be positive (found {symbol_rate})"
            )));
        }
        kind.validate()?;
        Ok(Self {
            kind,
            symbol_rate,
            dpsk: DpskState::default(),
        })
    }

    /// Returns M-PPM modulator for given symbol rate and order.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol rate is not positive or the order is not supported.
    pub fn new_ppm(symbol_rate: f64, order: usize) -> Result<Self, Error> {
        Self::new(ModulationKind::Ppm { order }, symbol_rate)
    }

    /// Returns modulation scheme.
    #[must_use]
    pub fn kind(&self) -> ModulationKind {
        self.kind
    }

    /// Returns symbol rate.
    #[must_use]
    pub fn symbol_rate(&self) -> f64 {
        self.symbol_rate
    }

    /// Returns duration in seconds of the samples for a stream of given length in bytes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self, num_bytes: usize) -> f64 {
        let bits = (8 * num_bytes) as f64;
        bits / self.kind.bits_per_symbol() as f64 / self.symbol_rate
    }

    /// Clears the DPSK phase memory, starting a new stream.
    pub fn reset(&mut self) {
        self.dpsk = DpskState::default();
    }

    /// Returns samples for given bytes (bits taken most significant first).
    pub fn modulate(&mut self, bytes: &[u8]) -> Samples {
        let bits = bytes_to_bits(bytes);
        match self.kind {
            ModulationKind::Ook => Samples::Real(
                bits.iter()
                    .map(|&b| if b == 1 { ON_AMPLITUDE } else { 0.0 })
                    .collect(),
            ),
            ModulationKind::Ppm { order } => {
                let bits_per_symbol = self.kind.bits_per_symbol();
                let mut slots = vec![0.0; self.kind.num_samples(bytes.len())];
                for (symbol, chunk) in bits.chunks(bits_per_symbol).enumerate() {
                    // Last symbol is padded with zeros
                    let value = chunk
                        .iter()
                        .chain(std::iter::repeat(&0))
                        .take(bits_per_symbol)
                        .fold(0, |acc, &b| (acc << 1) | usize::from(b));
                    slots[symbol * order + value] = ON_AMPLITUDE;
                }
                Samples::Real(slots)
            }
            ModulationKind::Dpsk => {
                let mut phase = self.dpsk.tx_phase;
                let samples = bits
                    .iter()
                    .map(|&b| {
                        if b == 1 {
                            phase = (phase + PI) % TAU;
                        }
                        Complex64::from_polar(1.0, phase)
                    })
                    .collect();
                self.dpsk.tx_phase = phase;
                Samples::Complex(samples)
            }
        }
    }

    /// Returns bytes recovered from received samples.
    ///
    /// OOK slices at half the "on" amplitude; PPM picks the strongest slot of each symbol; DPSK
    /// compares each sample with the previous one. Bits that do not fill a whole byte are
    /// dropped.
    ///
    /// # Parameters
    ///
    /// - `samples`: Received samples (real for OOK and PPM, complex for DPSK).
    ///
    /// - `snr_db`: Estimated signal-to-noise ratio (dB).
    ///
    /// # Errors
    ///
    /// Returns an error if the sample type does not match the scheme or `snr_db` is NaN.
    pub fn demodulate(&mut self, samples: &Samples, snr_db: f64) -> Result<Vec<u8>, Error> {
        if snr_db.is_nan() {
            return Err(Error::InvalidParam("SNR estimate is NaN".to_string()));
        }
        let mut bits = match (self.kind, samples) {
            (ModulationKind::Ook, Samples::Real(x)) => x
                .iter()
                .map(|&s| u8::from(s > OOK_THRESHOLD))
                .collect::<Vec<u8>>(),
            (ModulationKind::Ppm { order }, Samples::Real(x)) => {
                let bits_per_symbol = self.kind.bits_per_symbol();
                let mut bits = Vec::with_capacity(x.len() / order * bits_per_symbol);
                for window in x.chunks_exact(order) {
                    let slot = window
                        .iter()
                        .enumerate()
                        .fold((0, f64::NEG_INFINITY), |best, (i, &s)| {
                            if s > best.1 {
                                (i, s)
                            } else {
                                best
                            }
                        })
                        .0;
                    bits.extend((0 .. bits_per_symbol).rev().map(|i| bit_of(slot, i)));
                }
                bits
            }
            (ModulationKind::Dpsk, Samples::Complex(x)) => {
                let mut reference = self.dpsk.rx_reference;
                let bits: Vec<u8> = x
                    .iter()
                    .map(|&s| {
                        let product = s * reference.conj();
                        reference = s;
                        u8::from(product.re < 0.0)
                    })
                    .collect();
                self.dpsk.rx_reference = reference;
                bits
            }
            (kind, _) => {
                return Err(Error::InvalidParam(format!(
                    "Sample type does not match {kind} modulation"
                )))
            }
        };
        bits.truncate(bits.len() / 8 * 8);
        Ok(bits_to_bytes(&bits))
    }
}

/// Returns bit `i` of `value` as `0` or `1`.
#[allow(clippy::cast_possible_truncation)]
fn bit_of(value: usize, i: usize) -> u8 {
    ((value >> i) & 1) as u8
}
