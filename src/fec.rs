//! Forward error correction façade over the Reed-Solomon and LDPC codecs
//!
//! A [`Codec`] wraps one concrete codec selected by [`FecConfig`]. Single codewords go through
//! [`Codec::encode`] and [`Codec::decode`]; whole packets go through [`Codec::encode_stream`] and
//! [`Codec::decode_stream`], which split the payload into blocks and zero-pad the last one.
//!
//! Reed-Solomon blocks carry one byte per symbol. LDPC blocks carry one bit per element, and their
//! streams are packed into bytes most significant bit first.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ldpc::{Ldpc, LdpcConfig};
use crate::reed_solomon::{ReedSolomon, RsConfig};
use crate::utils::{bits_to_bytes, bytes_to_bits};
use crate::{Error, LogLevel};

/// Enumeration of FEC code families
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FecKind {
    /// Reed-Solomon code over GF(2^8)
    ReedSolomon,
    /// Regular LDPC code
    Ldpc,
}

impl std::fmt::Display for FecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FecKind::ReedSolomon => f.write_str("rs"),
            FecKind::Ldpc => f.write_str("ldpc"),
        }
    }
}

impl std::str::FromStr for FecKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rs" | "reed_solomon" | "reed-solomon" => Ok(FecKind::ReedSolomon),
            "ldpc" => Ok(FecKind::Ldpc),
            _ => Err(Error::Unsupported(format!("Unknown FEC type \"{s}\""))),
        }
    }
}

/// Codec selection together with its parameters
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FecConfig {
    /// Reed-Solomon code
    ReedSolomon(RsConfig),
    /// LDPC code
    Ldpc(LdpcConfig),
}

impl FecConfig {
    /// Returns code family.
    #[must_use]
    pub fn kind(&self) -> FecKind {
        match self {
            FecConfig::ReedSolomon(_) => FecKind::ReedSolomon,
            FecConfig::Ldpc(_) => FecKind::Ldpc,
        }
    }

    /// Returns `(n, k)`.
    #[must_use]
    pub fn dimensions(&self) -> (usize, usize) {
        match self {
            FecConfig::ReedSolomon(c) => (c.n, c.k),
            FecConfig::Ldpc(c) => (c.n, c.k),
        }
    }
}

/// Decoder statistics, for one codeword or accumulated over a stream
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct DecodeStats {
    /// Number of codewords in which errors were detected
    pub detected: usize,
    /// Number of symbols (RS) or bits (LDPC) corrected
    pub corrected: usize,
    /// Number of codewords that could not be corrected
    pub uncorrectable: usize,
    /// Number of decoder iterations (LDPC only)
    pub iterations: u32,
}

impl DecodeStats {
    /// Adds another set of statistics to this one.
    pub fn accumulate(&mut self, other: &DecodeStats) {
        self.detected += other.detected;
        self.corrected += other.corrected;
        self.uncorrectable += other.uncorrectable;
        self.iterations += other.iterations;
    }
}

/// Concrete codec state
#[derive(Clone, Debug)]
enum CodecState {
    ReedSolomon(ReedSolomon),
    Ldpc(Box<Ldpc>),
}

/// FEC codec
#[derive(Clone, Debug)]
pub struct Codec {
    /// Configuration the codec was built from
    config: FecConfig,
    /// Concrete codec
    state: CodecState,
    /// Verbosity threshold of this instance
    log_level: LogLevel,
}

impl Codec {
    /// Returns codec for given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, or if a Reed-Solomon code uses symbols
    /// wider than one byte.
    ///
    /// # Examples
    ///
    /// ```
    /// use fsolink::fec::{Codec, FecConfig};
    /// use fsolink::reed_solomon::RsConfig;
    ///
    /// let mut codec = Codec::new(FecConfig::ReedSolomon(RsConfig::ccsds()))?;
    /// let payload = b"free-space optical link".repeat(20);
    /// let mut coded = codec.encode_stream(&payload)?;
    /// coded[3] ^= 0xFF;
    /// let (decoded, stats) = codec.decode_stream(&coded, payload.len())?;
    /// assert_eq!(decoded, payload);
    /// assert_eq!(stats.corrected, 1);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(config: FecConfig) -> Result<Self, Error> {
        let state = match config {
            FecConfig::ReedSolomon(rs_config) => {
                if rs_config.symbol_size > 8 {
                    return Err(Error::Unsupported(format!(
                        "Byte-oriented codec cannot carry {}-bit RS symbols",
                        rs_config.symbol_size
                    )));
                }
                CodecState::ReedSolomon(ReedSolomon::new(rs_config)?)
            }
            FecConfig::Ldpc(ldpc_config) => CodecState::Ldpc(Box::new(Ldpc::new(ldpc_config)?)),
        };
        Ok(Self {
            config,
            state,
            log_level: LogLevel::default(),
        })
    }

    /// Sets verbosity threshold of this instance.
    #[must_use]
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Returns configuration.
    #[must_use]
    pub fn config(&self) -> &FecConfig {
        &self.config
    }

    /// Returns code family.
    #[must_use]
    pub fn kind(&self) -> FecKind {
        self.config.kind()
    }

    /// Returns number of information elements per codeword (`k`).
    #[must_use]
    pub fn info_len(&self) -> usize {
        self.config.dimensions().1
    }

    /// Returns number of elements per codeword (`n`).
    #[must_use]
    pub fn code_len(&self) -> usize {
        self.config.dimensions().0
    }

    /// Returns code rate `k / n`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f64 {
        let (n, k) = self.config.dimensions();
        k as f64 / n as f64
    }

    /// Returns codeword for one block of information elements (bytes for RS, bits for LDPC).
    ///
    /// # Errors
    ///
    /// Returns an error if `data.len()` is not `k` or an element is out of range.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        match &self.state {
            CodecState::ReedSolomon(rs) => {
                let symbols: Vec<u16> = data.iter().map(|&b| u16::from(b)).collect();
                Ok(rs.encode(&symbols)?.into_iter().map(symbol_to_byte).collect())
            }
            CodecState::Ldpc(ldpc) => ldpc.encode(data),
        }
    }

    /// Returns information elements and statistics for one received codeword.
    ///
    /// Uncorrectable codewords are reported in the statistics, not as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if `received.len()` is not `n` or an element is out of range.
    pub fn decode(&mut self, received: &[u8]) -> Result<(Vec<u8>, DecodeStats), Error> {
        match &mut self.state {
            CodecState::ReedSolomon(rs) => rs_decode_block(rs, received),
            CodecState::Ldpc(ldpc) => {
                let decoded = ldpc.decode(received)?;
                let stats = DecodeStats {
                    detected: usize::from(decoded.errors_detected),
                    corrected: decoded.errors_corrected,
                    uncorrectable: usize::from(!decoded.converged),
                    iterations: decoded.iterations,
                };
                Ok((decoded.bits, stats))
            }
        }
    }

    /// Returns number of blocks needed for a payload of given length in bytes.
    #[must_use]
    pub fn num_blocks(&self, payload_len: usize) -> usize {
        let k = self.info_len();
        match self.kind() {
            FecKind::ReedSolomon => payload_len.div_ceil(k),
            FecKind::Ldpc => (8 * payload_len).div_ceil(k),
        }
    }

    /// Returns length in bytes of the encoded stream for a payload of given length.
    #[must_use]
    pub fn encoded_len(&self, payload_len: usize) -> usize {
        let blocks = self.num_blocks(payload_len);
        match self.kind() {
            FecKind::ReedSolomon => blocks * self.code_len(),
            FecKind::Ldpc => (blocks * self.code_len()).div_ceil(8),
        }
    }

    /// Returns encoded stream for a payload, zero-padding the last block.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload byte does not fit in an RS symbol.
    pub fn encode_stream(&self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let k = self.info_len();
        let blocks = self.num_blocks(payload.len());
        match self.kind() {
            FecKind::ReedSolomon => {
                let mut padded = payload.to_vec();
                padded.resize(blocks * k, 0);
                let mut coded = Vec::with_capacity(self.encoded_len(payload.len()));
                for block in padded.chunks(k) {
                    coded.extend(self.encode(block)?);
                }
                Ok(coded)
            }
            FecKind::Ldpc => {
                let mut bits = bytes_to_bits(payload);
                bits.resize(blocks * k, 0);
                let mut coded_bits = Vec::with_capacity(blocks * self.code_len());
                for block in bits.chunks(k) {
                    coded_bits.extend(self.encode(block)?);
                }
                Ok(bits_to_bytes(&coded_bits))
            }
        }
    }

    /// Returns decoded payload of given length and accumulated statistics for an encoded stream.
    ///
    /// Reed-Solomon blocks are decoded in parallel; LDPC blocks are decoded one after another.
    ///
    /// # Errors
    ///
    /// Returns an error if `coded` is shorter than the encoded length of `payload_len` bytes.
    pub fn decode_stream(
        &mut self,
        coded: &[u8],
        payload_len: usize,
    ) -> Result<(Vec<u8>, DecodeStats), Error> {
        let expected = self.encoded_len(payload_len);
        if coded.len() < expected {
            return Err(Error::InvalidParam(format!(
                "Encoded stream too short (expected {expected} bytes, found {})",
                coded.len()
            )));
        }
        let n = self.code_len();
        let blocks = self.num_blocks(payload_len);
        let mut stats = DecodeStats::default();
        let mut payload = match &mut self.state {
            CodecState::ReedSolomon(rs) => {
                let rs: &ReedSolomon = rs;
                let decoded: Vec<(Vec<u8>, DecodeStats)> = coded[.. blocks * n]
                    .par_chunks(n)
                    .map(|block| rs_decode_block(rs, block))
                    .collect::<Result<_, _>>()?;
                let mut payload = Vec::with_capacity(blocks * rs.config().k);
                for (data, block_stats) in decoded {
                    payload.extend(data);
                    stats.accumulate(&block_stats);
                }
                payload
            }
            CodecState::Ldpc(ldpc) => {
                let bits = bytes_to_bits(coded);
                let mut info_bits = Vec::with_capacity(blocks * ldpc.config().k);
                for block in bits[.. blocks * n].chunks(n) {
                    let decoded = ldpc.decode(block)?;
                    stats.accumulate(&DecodeStats {
                        detected: usize::from(decoded.errors_detected),
                        corrected: decoded.errors_corrected,
                        uncorrectable: usize::from(!decoded.converged),
                        iterations: decoded.iterations,
                    });
                    info_bits.extend(decoded.bits);
                }
                bits_to_bytes(&info_bits)
            }
        };
        payload.truncate(payload_len);
        if stats.uncorrectable > 0 && self.log_level.allows(LogLevel::Debug) {
            tracing::debug!(
                fec = %self.kind(),
                blocks,
                uncorrectable = stats.uncorrectable,
                "FEC decoding left uncorrectable blocks"
            );
        }
        Ok((payload, stats))
    }
}

/// Decodes one RS codeword of bytes.
fn rs_decode_block(rs: &ReedSolomon, received: &[u8]) -> Result<(Vec<u8>, DecodeStats), Error> {
    let symbols: Vec<u16> = received.iter().map(|&b| u16::from(b)).collect();
    let decoded = rs.decode(&symbols)?;
    let stats = DecodeStats {
        detected: usize::from(decoded.errors_detected),
        corrected: decoded.errors_corrected,
        uncorrectable: usize::from(decoded.uncorrectable),
        iterations: 0,
    };
    Ok((decoded.data.into_iter().map(symbol_to_byte).collect(), stats))
}

/// Converts a symbol of at most 8 bits into a byte.
#[allow(clippy::cast_possible_truncation)]
fn symbol_to_byte(symbol: u16) -> u8 {
    symbol as u8
}
