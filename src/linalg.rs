//! Sparse and dense binary matrices used by the LDPC codec

use serde::{Deserialize, Serialize};

use crate::Error;

/// Single nonzero element of a sparse matrix in coordinate form
#[derive(Clone, Copy, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct Entry {
    /// Row index
    pub row: usize,
    /// Column index
    pub col: usize,
    /// Element value
    pub value: u8,
}

/// Sparse matrix with synchronized coordinate (COO) and compressed-row (CSR) representations
///
/// The number of stored nonzero elements is bounded by a capacity fixed at construction; an
/// insertion beyond it fails instead of reallocating.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct SparseMatrix {
    /// Number of rows
    rows: usize,
    /// Number of columns
    cols: usize,
    /// Maximum number of nonzero elements
    capacity: usize,
    /// Nonzero elements in coordinate form
    entries: Vec<Entry>,
    /// Start of each row in `col_indices` (length `rows + 1`)
    row_ptr: Vec<usize>,
    /// Column index of each nonzero element, row by row
    col_indices: Vec<usize>,
    /// Value of each nonzero element, row by row
    values: Vec<u8>,
    /// Whether the CSR arrays reflect the current entries
    csr_valid: bool,
}

impl SparseMatrix {
    /// Returns empty sparse matrix.
    ///
    /// # Parameters
    ///
    /// - `rows`: Number of rows.
    ///
    /// - `cols`: Number of columns.
    ///
    /// - `capacity`: Maximum number of nonzero elements that may be stored.
    ///
    /// # Errors
    ///
    /// Returns an error if either dimension is `0`.
    pub fn new(rows: usize, cols: usize, capacity: usize) -> Result<Self, Error> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidParam(format!(
                "Sparse matrix dimensions must be positive (found {rows} x {cols})"
            )));
        }
        Ok(Self {
            rows,
            cols,
            capacity,
            entries: Vec::with_capacity(capacity.min(rows * cols)),
            row_ptr: vec![0; rows + 1],
            col_indices: Vec::new(),
            values: Vec::new(),
            csr_valid: true,
        })
    }

    /// Returns number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns number of columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns number of stored nonzero elements.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Returns maximum number of nonzero elements.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns nonzero elements in coordinate form.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Sets an element, inserting, updating or removing the stored entry as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the position is out of bounds, or if a new nonzero element would
    /// exceed the capacity.
    pub fn set(&mut self, row: usize, col: usize, value: u8) -> Result<(), Error> {
        self.check_bounds(row, col)?;
        let existing = self.entries.iter().position(|e| e.row == row && e.col == col);
        match (existing, value) {
            (Some(pos), 0) => {
                self.entries.swap_remove(pos);
            }
            (Some(pos), _) => self.entries[pos].value = value,
            (None, 0) => return Ok(()),
            (None, _) => {
                if self.entries.len() >= self.capacity {
                    return Err(Error::ResourceExhausted(format!(
                        "Sparse matrix capacity of {} nonzero elements reached",
                        self.capacity
                    )));
                }
                self.entries.push(Entry { row, col, value });
            }
        }
        self.csr_valid = false;
        Ok(())
    }

    /// Appends a nonzero element known not to be stored yet.
    ///
    /// Skips the duplicate search of [`SparseMatrix::set`], which makes bulk construction linear
    /// in the number of elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the position is out of bounds, if `value` is `0`, or if the capacity
    /// would be exceeded.
    pub fn push(&mut self, row: usize, col: usize, value: u8) -> Result<(), Error> {
        self.check_bounds(row, col)?;
        if value == 0 {
            return Err(Error::InvalidParam(
                "Only nonzero elements can be appended".to_string(),
            ));
        }
        if self.entries.len() >= self.capacity {
            return Err(Error::ResourceExhausted(format!(
                "Sparse matrix capacity of {} nonzero elements reached",
                self.capacity
            )));
        }
        self.entries.push(Entry { row, col, value });
        self.csr_valid = false;
        Ok(())
    }

    /// Returns element at given position (`0` if not stored or out of bounds).
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        if self.csr_valid && row < self.rows {
            let span = self.row_ptr[row] .. self.row_ptr[row + 1];
            return self.col_indices[span.clone()]
                .binary_search(&col)
                .map_or(0, |i| self.values[span.start + i]);
        }
        self.entries
            .iter()
            .find(|e| e.row == row && e.col == col)
            .map_or(0, |e| e.value)
    }

    /// Sorts entries by `(row, col)` and rebuilds the CSR arrays from them.
    pub fn to_csr(&mut self) {
        self.entries.sort_unstable_by_key(|e| (e.row, e.col));
        self.row_ptr.clear();
        self.row_ptr.resize(self.rows + 1, 0);
        for e in &self.entries {
            self.row_ptr[e.row + 1] += 1;
        }
        for r in 0 .. self.rows {
            self.row_ptr[r + 1] += self.row_ptr[r];
        }
        self.col_indices = self.entries.iter().map(|e| e.col).collect();
        self.values = self.entries.iter().map(|e| e.value).collect();
        self.csr_valid = true;
    }

    /// Returns whether the CSR arrays reflect the current entries.
    #[must_use]
    pub fn is_csr_valid(&self) -> bool {
        self.csr_valid
    }

    /// Returns column indices of the nonzero elements in a row.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSR form is stale or if `row` is out of bounds.
    pub fn row_indices(&self, row: usize) -> Result<&[usize], Error> {
        if !self.csr_valid {
            return Err(Error::NotInitialized(
                "CSR form is stale; call to_csr() first".to_string(),
            ));
        }
        if row >= self.rows {
            return Err(Error::InvalidParam(format!(
                "Row {row} out of bounds for {} rows",
                self.rows
            )));
        }
        Ok(&self.col_indices[self.row_ptr[row] .. self.row_ptr[row + 1]])
    }

    /// Returns CSR row pointer array (length `rows + 1`).
    #[must_use]
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    /// Returns number of nonzero elements in each row.
    #[must_use]
    pub fn row_weights(&self) -> Vec<usize> {
        let mut weights = vec![0; self.rows];
        for e in &self.entries {
            weights[e.row] += 1;
        }
        weights
    }

    /// Returns number of nonzero elements in each column.
    #[must_use]
    pub fn col_weights(&self) -> Vec<usize> {
        let mut weights = vec![0; self.cols];
        for e in &self.entries {
            weights[e.col] += 1;
        }
        weights
    }

    /// Returns product of the matrix with a binary vector, reduced modulo 2.
    ///
    /// # Errors
    ///
    /// Returns an error if `bits.len()` differs from the number of columns.
    pub fn mul_vec_gf2(&self, bits: &[u8]) -> Result<Vec<u8>, Error> {
        if bits.len() != self.cols {
            return Err(Error::InvalidParam(format!(
                "Vector length {} does not match {} matrix columns",
                bits.len(),
                self.cols
            )));
        }
        let mut out = vec![0u8; self.rows];
        for e in &self.entries {
            out[e.row] ^= (e.value & bits[e.col]) & 1;
        }
        Ok(out)
    }

    /// Relabels columns so that old column `j` becomes column `new_col_of[j]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_col_of` is not a permutation of the column indices.
    pub fn permute_columns(&mut self, new_col_of: &[usize]) -> Result<(), Error> {
        let mut sorted = new_col_of.to_vec();
        sorted.sort_unstable();
        if !sorted.into_iter().eq(0 .. self.cols) {
            return Err(Error::InvalidParam(format!(
                "Expected permutation of all integers in the range [0, {})",
                self.cols
            )));
        }
        for e in &mut self.entries {
            e.col = new_col_of[e.col];
        }
        self.to_csr();
        Ok(())
    }

    /// Checks that a position lies inside the matrix.
    fn check_bounds(&self, row: usize, col: usize) -> Result<(), Error> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::InvalidParam(format!(
                "Position ({row}, {col}) out of bounds for {} x {} matrix",
                self.rows, self.cols
            )));
        }
        Ok(())
    }
}

/// Dense matrix over GF(2) with each row packed into 64-bit words
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct BitMatrix {
    /// Number of rows
    rows: usize,
    /// Number of columns
    cols: usize,
    /// Number of words per row
    words_per_row: usize,
    /// Row-major packed bits
    words: Vec<u64>,
}

impl BitMatrix {
    /// Returns all-zero matrix of given dimensions.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        let words_per_row = cols.div_ceil(64);
        Self {
            rows,
            cols,
            words_per_row,
            words: vec![0; rows * words_per_row],
        }
    }

    /// Returns dense copy of a sparse matrix (nonzero values map to `1`).
    #[must_use]
    pub fn from_sparse(sparse: &SparseMatrix) -> Self {
        let mut dense = Self::zeros(sparse.rows(), sparse.cols());
        for e in sparse.entries() {
            if e.value & 1 == 1 {
                dense.set(e.row, e.col, true);
            }
        }
        dense
    }

    /// Returns number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns number of columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns bit at given position.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> bool {
        (self.words[row * self.words_per_row + col / 64] >> (col % 64)) & 1 == 1
    }

    /// Sets bit at given position.
    pub fn set(&mut self, row: usize, col: usize, bit: bool) {
        let word = &mut self.words[row * self.words_per_row + col / 64];
        if bit {
            *word |= 1 << (col % 64);
        } else {
            *word &= !(1 << (col % 64));
        }
    }

    /// Adds (XORs) row `src` into row `dst`.
    pub fn xor_row_into(&mut self, src: usize, dst: usize) {
        if src == dst {
            return;
        }
        let w = self.words_per_row;
        for i in 0 .. w {
            let bits = self.words[src * w + i];
            self.words[dst * w + i] ^= bits;
        }
    }

    /// Exchanges two rows.
    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let w = self.words_per_row;
        for i in 0 .. w {
            self.words.swap(a * w + i, b * w + i);
        }
    }

    /// Exchanges two columns.
    pub fn swap_cols(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for r in 0 .. self.rows {
            let (bit_a, bit_b) = (self.get(r, a), self.get(r, b));
            self.set(r, a, bit_b);
            self.set(r, b, bit_a);
        }
    }

    /// Returns first row at or after `start` with a one in column `col`.
    #[must_use]
    pub fn find_pivot(&self, col: usize, start: usize) -> Option<usize> {
        (start .. self.rows).find(|&r| self.get(r, col))
    }

    /// Returns whether a row is entirely zero.
    #[must_use]
    pub fn row_is_zero(&self, row: usize) -> bool {
        let w = self.words_per_row;
        self.words[row * w .. (row + 1) * w].iter().all(|&x| x == 0)
    }
}
