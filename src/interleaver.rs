//! Block interleaver spreading burst errors across codewords

use crate::Error;

/// Block interleaver with given block size and depth
///
/// The input is consumed in chunks of `block_size * depth` elements. Each chunk is written
/// row-wise into a `depth x block_size` matrix and read out column-wise. Elements beyond the last
/// full chunk pass through unpermuted.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct BlockInterleaver {
    /// Number of columns of the interleaving matrix
    block_size: usize,
    /// Number of rows of the interleaving matrix
    depth: usize,
    /// Input index for each output index within a chunk (needed in interleaving)
    all_in_index_given_out_index: Vec<usize>,
    /// Output index for each input index within a chunk (needed in deinterleaving)
    all_out_index_given_in_index: Vec<usize>,
}

impl BlockInterleaver {
    /// Returns block interleaver for given matrix dimensions.
    ///
    /// # Parameters
    ///
    /// - `block_size`: Number of elements per matrix row (typically the codeword length).
    ///
    /// - `depth`: Number of matrix rows (number of codewords spread over each chunk).
    ///
    /// # Errors
    ///
    /// Returns an error if either dimension is `0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fsolink::interleaver::BlockInterleaver;
    ///
    /// let interleaver = BlockInterleaver::new(3, 2)?;
    /// let mut output = Vec::new();
    /// interleaver.interleave(&['a', 'b', 'c', 'd', 'e', 'f', 'g'], &mut output);
    /// assert_eq!(output, ['a', 'd', 'b', 'e', 'c', 'f', 'g']);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(block_size: usize, depth: usize) -> Result<Self, Error> {
        if block_size == 0 || depth == 0 {
            return Err(Error::InvalidParam(format!(
                "Interleaver dimensions must be positive (found block size {block_size}, depth \
                 {depth})"
            )));
        }
        let perm_vec: Vec<usize> = (0 .. block_size)
            .flat_map(|col| (0 .. depth).map(move |row| row * block_size + col))
            .collect();
        Ok(Self::from_valid_perm(block_size, depth, perm_vec))
    }

    /// Returns number of elements per matrix row.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns number of matrix rows.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns number of elements permuted together.
    #[must_use]
    pub fn chunk_len(&self) -> usize {
        self.block_size * self.depth
    }

    /// Generates interleaver output given its input.
    ///
    /// # Parameters
    ///
    /// - `input`: Interleaver input of any length.
    ///
    /// - `output`: Buffer for interleaver output (any pre-existing contents will be cleared).
    pub fn interleave<T: Copy>(&self, input: &[T], output: &mut Vec<T>) {
        self.permute(input, output, &self.all_in_index_given_out_index);
    }

    /// Generates interleaver input given its output.
    ///
    /// # Parameters
    ///
    /// - `output`: Interleaver output of any length.
    ///
    /// - `input`: Buffer for interleaver input (any pre-existing contents will be cleared).
    pub fn deinterleave<T: Copy>(&self, output: &[T], input: &mut Vec<T>) {
        self.permute(output, input, &self.all_out_index_given_in_index);
    }

    /// Applies a chunk permutation to every full chunk and copies the remainder.
    fn permute<T: Copy>(&self, src: &[T], dst: &mut Vec<T>, source_index: &[usize]) {
        dst.clear();
        dst.reserve(src.len());
        let mut chunks = src.chunks_exact(self.chunk_len());
        for chunk in &mut chunks {
            dst.extend(source_index.iter().map(|&i| chunk[i]));
        }
        dst.extend_from_slice(chunks.remainder());
    }

    /// Returns interleaver corresponding to a valid chunk permutation.
    fn from_valid_perm(block_size: usize, depth: usize, perm_vec: Vec<usize>) -> Self {
        let length = perm_vec.len();
        let all_in_index_given_out_index: Vec<usize> = perm_vec;
        let mut all_out_index_given_in_index: Vec<usize> = (0 .. length).collect();
        all_out_index_given_in_index.sort_by_key(|&k| all_in_index_given_out_index[k]);
        Self {
            block_size,
            depth,
            all_in_index_given_out_index,
            all_out_index_given_in_index,
        }
    }
}

#[cfg(test)]
mod tests_of_block_interleaver {
    use super::*;

    #[test]
    fn test_new() {
        // Invalid input
        assert!(BlockInterleaver::new(0, 4).is_err());
        assert!(BlockInterleaver::new(4, 0).is_err());
        // Valid input
        let interleaver = BlockInterleaver::new(3, 2).unwrap();
        assert_eq!(interleaver.chunk_len(), 6);
        assert_eq!(interleaver.all_in_index_given_out_index, [0, 3, 1, 4, 2, 5]);
        assert_eq!(interleaver.all_out_index_given_in_index, [0, 2, 4, 1, 3, 5]);
    }

    #[test]
    fn test_interleave() {
        let interleaver = BlockInterleaver::new(4, 3).unwrap();
        let input: Vec<u8> = (0 .. 14).collect();
        let mut output = Vec::new();
        for _ in 0 .. 2 {
            interleaver.interleave(&input, &mut output);
            assert_eq!(output, [0, 4, 8, 1, 5, 9, 2, 6, 10, 3, 7, 11, 12, 13]);
        }
    }

    #[test]
    fn test_deinterleave() {
        let interleaver = BlockInterleaver::new(4, 3).unwrap();
        let output = [0, 4, 8, 1, 5, 9, 2, 6, 10, 3, 7, 11, 12, 13];
        let mut input = Vec::new();
        interleaver.deinterleave(&output, &mut input);
        assert_eq!(input, (0 .. 14).collect::<Vec<u8>>());
    }

    #[test]
    fn test_short_input_passes_through() {
        let interleaver = BlockInterleaver::new(8, 8).unwrap();
        let input = [9u8, 8, 7];
        let mut output = Vec::new();
        interleaver.interleave(&input, &mut output);
        assert_eq!(output, input);
        interleaver.interleave(&[], &mut output);
        assert!(output.is_empty());
    }

    #[test]
    fn test_involution() {
        let input: Vec<u16> = (0 .. 1000u32)
            .map(|i| u16::try_from((i * 7919) % 65521).unwrap())
            .collect();
        let mut interleaved = Vec::new();
        let mut restored = Vec::new();
        for block_size in [1, 2, 5, 17, 255] {
            for depth in [1, 3, 4, 8] {
                let interleaver = BlockInterleaver::new(block_size, depth).unwrap();
                for len in [0, 1, 99, 1000] {
                    interleaver.interleave(&input[.. len], &mut interleaved);
                    assert_eq!(interleaved.len(), len);
                    interleaver.deinterleave(&interleaved, &mut restored);
                    assert_eq!(restored, input[.. len]);
                }
            }
        }
    }

    #[test]
    fn test_burst_is_spread() {
        // A burst of `depth` consecutive output errors hits `depth` different rows
        let interleaver = BlockInterleaver::new(10, 4).unwrap();
        let mut flags = vec![false; 40];
        flags[12 .. 16].iter_mut().for_each(|f| *f = true);
        let mut restored = Vec::new();
        interleaver.deinterleave(&flags, &mut restored);
        let rows_hit: Vec<usize> = restored
            .chunks(10)
            .map(|row| row.iter().filter(|&&f| f).count())
            .collect();
        assert_eq!(rows_hit, [1, 1, 1, 1]);
    }
}
