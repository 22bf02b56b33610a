//! Regular low-density parity-check code with a sum-product decoder
//!
//! The parity-check matrix `H` (`m x n`, `m = n - k`) gives every variable node the same degree.
//! Its columns are placed greedily so that no two are equal and few 4-cycles are closed. A
//! systematic generator `G = [I | P]` is derived from `H` by Gaussian elimination over GF(2); if
//! the parity block of `H` is singular, columns of the information block are swapped into it and
//! the same relabeling is applied to `H`, so that `H c = 0` holds for every codeword `c` produced
//! by the encoder.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::linalg::{BitMatrix, SparseMatrix};
use crate::Error;

/// Magnitude of the channel LLR assigned to a hard-decision input bit
pub const HARD_DECISION_LLR: f64 = 10.0;

/// Default maximum number of decoder iterations
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// Default threshold on the largest posterior LLR change below which decoding stops
pub const DEFAULT_CONVERGENCE_THRESHOLD: f64 = 1e-6;

// Guarded regions of phi(x) = -ln(tanh(x / 2))
const PHI_SMALL_ARG: f64 = 1e-10;
const PHI_SMALL_VALUE: f64 = 10.0;
const PHI_LARGE_ARG: f64 = 10.0;

/// Parameters of an LDPC code and its decoder
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
pub struct LdpcConfig {
    /// Codeword length in bits
    pub n: usize,
    /// Number of information bits per codeword
    pub k: usize,
    /// Maximum number of sum-product iterations
    pub max_iterations: u32,
    /// Decoding stops early once no posterior LLR moves by more than this amount
    pub convergence_threshold: f64,
}

impl LdpcConfig {
    /// Returns configuration with default decoder settings.
    #[must_use]
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            k,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
        }
    }

    /// Returns code rate `k / n`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f64 {
        self.k as f64 / self.n as f64
    }

    /// Checks validity of the parameters.
    ///
    /// # Errors
    ///
    /// Returns an error unless `n > k > 0`, the number of checks `n - k` is at least the variable
    /// degree for this rate, `max_iterations > 0` and the convergence threshold is nonnegative.
    pub fn validate(&self) -> Result<(), Error> {
        if self.k == 0 || self.k >= self.n {
            return Err(Error::InvalidParam(format!(
                "LDPC parameters must satisfy n > k > 0 (found n = {}, k = {})",
                self.n, self.k
            )));
        }
        let dv = variable_degree(self.rate());
        if self.n - self.k < dv {
            return Err(Error::InvalidParam(format!(
                "LDPC code needs at least {dv} parity checks (found {})",
                self.n - self.k
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidParam(
                "LDPC decoder needs at least one iteration".to_string(),
            ));
        }
        if !(self.convergence_threshold >= 0.0) {
            return Err(Error::InvalidParam(format!(
                "Invalid LDPC convergence threshold {}",
                self.convergence_threshold
            )));
        }
        Ok(())
    }
}

/// Returns variable-node degree for a code rate (3, 4, 5 or 6 for rates near 1/2, 2/3, 3/4, 5/6).
#[must_use]
pub fn variable_degree(rate: f64) -> usize {
    if rate <= 7.0 / 12.0 {
        3
    } else if rate <= 17.0 / 24.0 {
        4
    } else if rate <= 19.0 / 24.0 {
        5
    } else {
        6
    }
}

/// Outcome of decoding one LDPC codeword
#[derive(Clone, PartialEq, Debug)]
pub struct LdpcDecoded {
    /// Decoded information bits (first `k` bits of the codeword)
    pub bits: Vec<u8>,
    /// Last hard-decision codeword
    pub codeword: Vec<u8>,
    /// Number of iterations run
    pub iterations: u32,
    /// Whether the final syndrome is zero
    pub converged: bool,
    /// Whether the syndrome of the channel hard decisions was nonzero
    pub errors_detected: bool,
    /// Number of codeword bits whose decision differs from the channel hard decision
    pub errors_corrected: usize,
}

/// LDPC encoder and sum-product decoder
#[derive(Clone, Debug)]
pub struct Ldpc {
    /// Code parameters
    config: LdpcConfig,
    /// Parity-check matrix (CSR valid)
    h: SparseMatrix,
    /// Systematic generator matrix (CSR valid)
    g: SparseMatrix,
    /// Degree of each variable node
    var_deg: Vec<usize>,
    /// Degree of each check node
    chk_deg: Vec<usize>,
    /// Number of rows of `H` that are linear combinations of others
    redundant_checks: usize,
    /// Edges are numbered check by check; edges of check `c` are `check_ptr[c] .. check_ptr[c+1]`
    check_ptr: Vec<usize>,
    /// Variable node of each edge
    edge_var: Vec<usize>,
    /// Edges of each variable node
    var_edges: Vec<Vec<usize>>,
    /// Variable-to-check messages, one per edge
    v2c: Vec<f64>,
    /// Check-to-variable messages, one per edge
    c2v: Vec<f64>,
    /// Channel LLR of each variable
    channel_llr: Vec<f64>,
    /// Posterior LLR of each variable
    posterior: Vec<f64>,
    /// Hard decision of each variable
    hard: Vec<u8>,
    /// Syndrome of the hard decisions
    syndrome: Vec<u8>,
}

impl Ldpc {
    /// Returns LDPC codec for given parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid (see [`LdpcConfig::validate`]).
    ///
    /// # Examples
    ///
    /// ```
    /// use fsolink::ldpc::{Ldpc, LdpcConfig};
    ///
    /// let mut ldpc = Ldpc::new(LdpcConfig::new(96, 48))?;
    /// let info: Vec<u8> = (0 .. 48).map(|i| (i % 3 == 0) as u8).collect();
    /// let codeword = ldpc.encode(&info)?;
    /// assert!(ldpc.is_codeword(&codeword)?);
    /// let decoded = ldpc.decode(&codeword)?;
    /// assert_eq!(decoded.bits, info);
    /// assert_eq!(decoded.iterations, 1);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(config: LdpcConfig) -> Result<Self, Error> {
        config.validate()?;
        let (n, k) = (config.n, config.k);
        let m = n - k;
        let mut h = parity_check_matrix(n, m, variable_degree(config.rate()))?;
        let (g, redundant_checks) = generator_matrix(&mut h, k)?;
        let mut check_ptr = Vec::with_capacity(m + 1);
        let mut edge_var = Vec::with_capacity(h.nnz());
        check_ptr.push(0);
        for c in 0 .. m {
            edge_var.extend_from_slice(h.row_indices(c)?);
            check_ptr.push(edge_var.len());
        }
        let mut var_edges = vec![Vec::new(); n];
        for (e, &v) in edge_var.iter().enumerate() {
            var_edges[v].push(e);
        }
        let num_edges = edge_var.len();
        Ok(Self {
            config,
            var_deg: h.col_weights(),
            chk_deg: h.row_weights(),
            h,
            g,
            redundant_checks,
            check_ptr,
            edge_var,
            var_edges,
            v2c: vec![0.0; num_edges],
            c2v: vec![0.0; num_edges],
            channel_llr: vec![0.0; n],
            posterior: vec![0.0; n],
            hard: vec![0; n],
            syndrome: vec![0; m],
        })
    }

    /// Returns code parameters.
    #[must_use]
    pub fn config(&self) -> &LdpcConfig {
        &self.config
    }

    /// Returns parity-check matrix.
    #[must_use]
    pub fn parity_check(&self) -> &SparseMatrix {
        &self.h
    }

    /// Returns generator matrix.
    #[must_use]
    pub fn generator(&self) -> &SparseMatrix {
        &self.g
    }

    /// Returns degree of each variable node.
    #[must_use]
    pub fn var_degrees(&self) -> &[usize] {
        &self.var_deg
    }

    /// Returns degree of each check node.
    #[must_use]
    pub fn check_degrees(&self) -> &[usize] {
        &self.chk_deg
    }

    /// Returns number of parity checks that are linear combinations of others.
    #[must_use]
    pub fn redundant_checks(&self) -> usize {
        self.redundant_checks
    }

    /// Returns `H c mod 2` for a binary word.
    ///
    /// # Errors
    ///
    /// Returns an error if `word.len()` is not `n`.
    pub fn syndrome(&self, word: &[u8]) -> Result<Vec<u8>, Error> {
        self.h.mul_vec_gf2(word)
    }

    /// Returns whether a binary word satisfies every parity check.
    ///
    /// # Errors
    ///
    /// Returns an error if `word.len()` is not `n`.
    pub fn is_codeword(&self, word: &[u8]) -> Result<bool, Error> {
        Ok(self.syndrome(word)?.iter().all(|&s| s == 0))
    }

    /// Returns systematic codeword for given information bits.
    ///
    /// # Errors
    ///
    /// Returns an error if `info.len()` is not `k` or an element is not `0` or `1`.
    pub fn encode(&self, info: &[u8]) -> Result<Vec<u8>, Error> {
        let (n, k) = (self.config.n, self.config.k);
        check_bits(info, k)?;
        let mut codeword = info.to_vec();
        codeword.resize(n, 0);
        for (i, _) in info.iter().enumerate().filter(|&(_, &bit)| bit == 1) {
            for &col in self.g.row_indices(i)? {
                if col >= k {
                    codeword[col] ^= 1;
                }
            }
        }
        Ok(codeword)
    }

    /// Returns decoding outcome for a hard-decision received word.
    ///
    /// Each bit enters the decoder with LLR `+10` (bit `0`) or `-10` (bit `1`).
    ///
    /// # Errors
    ///
    /// Returns an error if `received.len()` is not `n` or an element is not `0` or `1`.
    pub fn decode(&mut self, received: &[u8]) -> Result<LdpcDecoded, Error> {
        check_bits(received, self.config.n)?;
        let llr: Vec<f64> = received
            .iter()
            .map(|&bit| {
                if bit == 0 {
                    HARD_DECISION_LLR
                } else {
                    -HARD_DECISION_LLR
                }
            })
            .collect();
        self.decode_llr(&llr)
    }

    /// Returns decoding outcome for channel log-likelihood ratios `ln(P(0) / P(1))`.
    ///
    /// The last hard-decision codeword is returned whether or not the syndrome reached zero.
    ///
    /// # Errors
    ///
    /// Returns an error if `llr.len()` is not `n` or an element is NaN.
    pub fn decode_llr(&mut self, llr: &[f64]) -> Result<LdpcDecoded, Error> {
        let n = self.config.n;
        if llr.len() != n {
            return Err(Error::InvalidParam(format!(
                "Invalid LLR length (expected {n}, found {})",
                llr.len()
            )));
        }
        if llr.iter().any(|x| x.is_nan()) {
            return Err(Error::InvalidParam("LLR input contains NaN".to_string()));
        }
        self.channel_llr.copy_from_slice(llr);
        self.posterior.copy_from_slice(llr);
        for (h, &l) in self.hard.iter_mut().zip(llr) {
            *h = u8::from(l < 0.0);
        }
        let input_hard = self.hard.clone();
        let errors_detected = !self.update_syndrome();
        for (msg, &v) in self.v2c.iter_mut().zip(&self.edge_var) {
            *msg = self.channel_llr[v];
        }
        self.c2v.fill(0.0);

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.config.max_iterations {
            iterations += 1;
            self.update_checks();
            let largest_change = self.update_variables();
            if self.update_syndrome() {
                converged = true;
                break;
            }
            if largest_change < self.config.convergence_threshold {
                break;
            }
        }
        let errors_corrected = self
            .hard
            .iter()
            .zip(&input_hard)
            .filter(|(a, b)| a != b)
            .count();
        Ok(LdpcDecoded {
            bits: self.hard[.. self.config.k].to_vec(),
            codeword: self.hard.clone(),
            iterations,
            converged,
            errors_detected,
            errors_corrected,
        })
    }

    /// Computes check-to-variable messages from the current variable-to-check messages.
    fn update_checks(&mut self) {
        for c in 0 .. self.check_ptr.len() - 1 {
            let span = self.check_ptr[c] .. self.check_ptr[c + 1];
            let mut sign = 1.0;
            let mut phi_sum = 0.0;
            for &msg in &self.v2c[span.clone()] {
                if msg < 0.0 {
                    sign = -sign;
                }
                phi_sum += phi(msg);
            }
            for e in span {
                let msg = self.v2c[e];
                let extrinsic_sign = if msg < 0.0 { -sign } else { sign };
                self.c2v[e] = extrinsic_sign * phi(phi_sum - phi(msg));
            }
        }
    }

    /// Computes posteriors, hard decisions and variable-to-check messages, returning the largest
    /// change of any posterior.
    fn update_variables(&mut self) -> f64 {
        let mut largest_change: f64 = 0.0;
        for v in 0 .. self.config.n {
            let total = self.channel_llr[v]
                + self.var_edges[v].iter().map(|&e| self.c2v[e]).sum::<f64>();
            largest_change = largest_change.max((total - self.posterior[v]).abs());
            self.posterior[v] = total;
            self.hard[v] = u8::from(total < 0.0);
            for &e in &self.var_edges[v] {
                self.v2c[e] = total - self.c2v[e];
            }
        }
        largest_change
    }

    /// Recomputes the syndrome of the hard decisions, returning whether it is zero.
    fn update_syndrome(&mut self) -> bool {
        for (c, s) in self.syndrome.iter_mut().enumerate() {
            *s = self.edge_var[self.check_ptr[c] .. self.check_ptr[c + 1]]
                .iter()
                .fold(0, |acc, &v| acc ^ self.hard[v]);
        }
        self.syndrome.iter().all(|&s| s == 0)
    }
}

/// Returns `phi(|x|) = -ln(tanh(|x| / 2))` with guards against overflow near `0` and underflow
/// for large arguments (`phi` is its own inverse).
#[must_use]
pub fn phi(x: f64) -> f64 {
    let x = x.abs();
    if x < PHI_SMALL_ARG {
        PHI_SMALL_VALUE
    } else if x > PHI_LARGE_ARG {
        (-x).exp()
    } else {
        -(x / 2.0).tanh().ln()
    }
}

/// Returns regular parity-check matrix with `dv` ones per column and, where the degree budget
/// allows, at most `ceil(n dv / m)` ones per row.
///
/// Columns are filled greedily. Each edge of variable node `v` scans the checks cyclically from a
/// start that moves with `v` and takes the first check minimizing, in order: whether the column
/// would repeat an earlier column, whether the check is already full, and how many times the check
/// already shares a variable node with the checks placed in this column (each such sharing closes
/// a 4-cycle).
fn parity_check_matrix(n: usize, m: usize, dv: usize) -> Result<SparseMatrix, Error> {
    let dc = (n * dv).div_ceil(m);
    let shift = m.div_ceil(dv);
    let mut h = SparseMatrix::new(m, n, n * dv)?;
    let mut chk_deg = vec![0; m];
    // Number of variable nodes joined to each pair of checks (smaller index first)
    let mut pair_count: HashMap<(usize, usize), usize> = HashMap::new();
    let mut columns: HashSet<Vec<usize>> = HashSet::with_capacity(n);
    let mut placed = Vec::with_capacity(dv);
    for v in 0 .. n {
        placed.clear();
        for d in 0 .. dv {
            let base = (v * dv + d * shift + v / m) % m;
            let c = (0 .. m)
                .map(|p| (base + p) % m)
                .filter(|c| !placed.contains(c))
                .min_by_key(|&c| {
                    let repeats = d + 1 == dv && {
                        let mut column = placed.clone();
                        column.push(c);
                        column.sort_unstable();
                        columns.contains(&column)
                    };
                    let shared: usize = placed
                        .iter()
                        .map(|&q| pair_count.get(&(c.min(q), c.max(q))).copied().unwrap_or(0))
                        .sum();
                    (repeats, chk_deg[c] >= dc, shared)
                })
                .ok_or_else(|| {
                    Error::InvalidParam(format!("Cannot place {dv} edges among {m} checks"))
                })?;
            placed.push(c);
            chk_deg[c] += 1;
            h.push(c, v, 1)?;
        }
        for (i, &a) in placed.iter().enumerate() {
            for &b in &placed[i + 1 ..] {
                *pair_count.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        let mut column = placed.clone();
        column.sort_unstable();
        columns.insert(column);
    }
    h.to_csr();
    Ok(h)
}

/// Returns systematic generator matrix for `h` and the number of redundant checks, relabeling the
/// columns of `h` if its parity block is singular.
fn generator_matrix(h: &mut SparseMatrix, k: usize) -> Result<(SparseMatrix, usize), Error> {
    let (m, n) = (h.rows(), h.cols());
    let mut dense = BitMatrix::from_sparse(h);
    // Original column held at each position
    let mut original_col: Vec<usize> = (0 .. n).collect();
    let mut pivots = Vec::with_capacity(m);
    let mut row = 0;
    for col in k .. n {
        if row == m {
            break;
        }
        let pivot = dense.find_pivot(col, row).or_else(|| {
            let (info_col, r) =
                (0 .. k).find_map(|i| dense.find_pivot(i, row).map(|r| (i, r)))?;
            dense.swap_cols(info_col, col);
            original_col.swap(info_col, col);
            Some(r)
        });
        let Some(p) = pivot else {
            continue;
        };
        dense.swap_rows(p, row);
        for r in 0 .. m {
            if r != row && dense.get(r, col) {
                dense.xor_row_into(row, r);
            }
        }
        pivots.push((row, col));
        row += 1;
    }
    let redundant_checks = (0 .. m).filter(|&r| dense.row_is_zero(r)).count();

    if original_col.iter().enumerate().any(|(pos, &col)| pos != col) {
        let mut new_col_of = vec![0; n];
        for (pos, &col) in original_col.iter().enumerate() {
            new_col_of[col] = pos;
        }
        h.permute_columns(&new_col_of)?;
    }

    let mut g = SparseMatrix::new(k, n, k * (n - k) + k)?;
    for i in 0 .. k {
        g.push(i, i, 1)?;
        for &(r, col) in &pivots {
            if dense.get(r, i) {
                g.push(i, col, 1)?;
            }
        }
    }
    g.to_csr();
    Ok((g, redundant_checks))
}

/// Checks length of a binary word and that every element is `0` or `1`.
fn check_bits(bits: &[u8], expected_len: usize) -> Result<(), Error> {
    if bits.len() != expected_len {
        return Err(Error::InvalidParam(format!(
            "Invalid bit sequence length (expected {expected_len}, found {})",
            bits.len()
        )));
    }
    if bits.iter().any(|&b| b > 1) {
        return Err(Error::InvalidParam(
            "Bit sequence elements must be 0 or 1".to_string(),
        ));
    }
    Ok(())
}
