use crate::pir_internals::{branch_opt_util, params::SEED_BYTE_LEN};
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use std::ops::{Index, IndexMut, Mul, Range};
use turboshake::TurboShake128;

use super::error::GulliverPIRError;

/// Row-major matrix of `u32` elements. All arithmetic is performed modulo 2^32, using wrapping operations,
/// which also makes it correct modulo any smaller power of two, after masking.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: u32,
    cols: u32,
    elems: Vec<u32>,
}

impl Matrix {
    /// Creates a new matrix with the given number of rows and columns, s.t. all elements are zero-initialized.
    ///
    /// # Arguments
    ///
    /// * `rows` - The number of rows in the matrix.
    /// * `cols` - The number of columns in the matrix.
    ///
    /// # Returns
    ///
    /// * `Result<Matrix, GulliverPIRError>` - A new matrix if the input is valid (rows and cols are positive).
    ///   Returns an error if either rows or cols is zero.
    pub fn new(rows: u32, cols: u32) -> Result<Matrix, GulliverPIRError> {
        if branch_opt_util::likely((rows > 0) && (cols > 0)) {
            Ok(Matrix {
                rows,
                cols,
                elems: vec![0; rows as usize * cols as usize],
            })
        } else {
            Err(GulliverPIRError::InvalidMatrixDimension)
        }
    }

    /// Creates a new matrix with the given number of rows and columns, s.t. elements are initialized with the given values.
    ///
    /// # Arguments
    ///
    /// * `rows` - The number of rows in the matrix.
    /// * `cols` - The number of columns in the matrix.
    /// * `values` - The values to initialize the matrix with, in row-major order.
    ///
    /// # Returns
    ///
    /// * `Result<Matrix, GulliverPIRError>` - A new matrix if the input is valid (rows and cols are positive and the number of values matches the number of required elements).
    ///   Returns an error if either rows or cols is zero, or if the number of values does not match the number of required elements.
    pub fn from_values(rows: u32, cols: u32, values: Vec<u32>) -> Result<Matrix, GulliverPIRError> {
        if branch_opt_util::likely((rows > 0) && (cols > 0)) {
            if branch_opt_util::likely(rows as usize * cols as usize == values.len()) {
                Ok(Matrix { rows, cols, elems: values })
            } else {
                Err(GulliverPIRError::InvalidNumberOfElementsInMatrix)
            }
        } else {
            Err(GulliverPIRError::InvalidMatrixDimension)
        }
    }

    #[inline(always)]
    pub const fn num_rows(&self) -> u32 {
        self.rows
    }
    #[inline(always)]
    pub const fn num_cols(&self) -> u32 {
        self.cols
    }
    #[inline(always)]
    pub fn num_elems(&self) -> usize {
        self.elems.len()
    }
    #[inline(always)]
    pub fn num_bytes(&self) -> usize {
        std::mem::size_of_val(&self.rows) + std::mem::size_of_val(&self.cols) + std::mem::size_of::<u32>() * self.num_elems()
    }
    #[inline(always)]
    pub fn elems(&self) -> &[u32] {
        &self.elems
    }
    #[inline(always)]
    pub(crate) fn elems_mut(&mut self) -> &mut [u32] {
        &mut self.elems
    }

    /// Generates a matrix with the given dimensions from a SEED_BYTE_LEN -byte seed using TurboSHAKE128 xof,
    /// s.t. each element is uniformly distributed in [0, 2^log_modulus).
    ///
    /// # Arguments
    ///
    /// * `rows` - The number of rows in the matrix.
    /// * `cols` - The number of columns in the matrix.
    /// * `seed` - The SEED_BYTE_LEN -byte seed to use for generation.
    /// * `log_modulus` - Bit-length of the modulus, must be in [1, 32].
    ///
    /// # Returns
    ///
    /// * `Result<Matrix, GulliverPIRError>` - A new matrix if the input is valid (rows and cols are positive).
    ///   Returns an error if either rows or cols is zero.
    pub fn generate_from_seed(rows: u32, cols: u32, seed: &[u8; SEED_BYTE_LEN], log_modulus: u32) -> Result<Matrix, GulliverPIRError> {
        if branch_opt_util::unlikely(!(1..=u32::BITS).contains(&log_modulus)) {
            return Err(GulliverPIRError::InvalidModulusBitLength {
                log_hint_q: log_modulus,
                log_query_q: log_modulus,
            });
        }

        let mut hasher = TurboShake128::default();
        hasher.absorb(seed);
        hasher.finalize::<{ TurboShake128::DEFAULT_DOMAIN_SEPARATOR }>();

        let num_elems = rows as usize * cols as usize;
        let mut elem_bytes = vec![0u8; num_elems * std::mem::size_of::<u32>()];
        hasher.squeeze(&mut elem_bytes);

        let mask = mask_of(log_modulus);
        let elems = elem_bytes
            .chunks_exact(std::mem::size_of::<u32>())
            .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & mask)
            .collect::<Vec<u32>>();

        Matrix::from_values(rows, cols, elems)
    }

    /// Generates a row/ column vector with the given dimensions, where each element is sampled uniformly from [-bound/2, bound/2),
    /// using a cryptographically secure RNG, seeded from the operating system. Negative values are kept in their two's complement form.
    ///
    /// # Arguments
    ///
    /// * `rows` - The number of rows in the matrix.
    /// * `cols` - The number of columns in the matrix.
    /// * `bound` - Width of the sampling interval, must be at least 2.
    ///
    /// # Returns
    ///
    /// * `Result<Matrix, GulliverPIRError>` - A new row/ column vector if the input is valid (rows or cols is 1).
    ///   Returns an error if neither rows nor cols is 1.
    pub fn sample_from_uniform_dist(rows: u32, cols: u32, bound: u64) -> Result<Matrix, GulliverPIRError> {
        if branch_opt_util::unlikely(!(rows == 1 || cols == 1)) {
            return Err(GulliverPIRError::InvalidDimensionForVector);
        }
        if branch_opt_util::unlikely(!(2..=u32::MAX as u64).contains(&bound)) {
            return Err(GulliverPIRError::InvalidSecretBound(bound));
        }

        let mut rng = ChaCha20Rng::from_os_rng();
        let mut vec = Matrix::new(rows, cols)?;

        let bound = bound as u32;
        let half_bound = bound / 2;

        vec.elems.iter_mut().for_each(|elem| {
            *elem = rng.random_range(0..bound).wrapping_sub(half_bound);
        });

        Ok(vec)
    }

    /// Generates a matrix with the given dimensions, where each element is sampled uniformly from [0, modulus), using caller supplied RNG.
    /// Meant for generating database content, never for anything secret.
    pub fn sample_from_uniform_mod<R: Rng>(rows: u32, cols: u32, modulus: u64, rng: &mut R) -> Result<Matrix, GulliverPIRError> {
        if branch_opt_util::unlikely(!(1..=u32::MAX as u64 + 1).contains(&modulus)) {
            return Err(GulliverPIRError::InvalidPlaintextModulus(modulus));
        }

        let mut mat = Matrix::new(rows, cols)?;
        mat.elems.iter_mut().for_each(|elem| {
            *elem = rng.random_range(0..modulus) as u32;
        });

        Ok(mat)
    }

    /// Adds `scalar` to every element, modulo 2^32.
    pub fn add_scalar(&mut self, scalar: u32) {
        self.elems.par_iter_mut().for_each(|elem| *elem = elem.wrapping_add(scalar));
    }

    /// Subtracts `scalar` from every element, modulo 2^32.
    pub fn sub_scalar(&mut self, scalar: u32) {
        self.elems.par_iter_mut().for_each(|elem| *elem = elem.wrapping_sub(scalar));
    }

    /// Reduces every element modulo 2^log_modulus.
    pub fn reduce_mod_pow2(&mut self, log_modulus: u32) {
        if log_modulus >= u32::BITS {
            return;
        }

        let mask = mask_of(log_modulus);
        self.elems.par_iter_mut().for_each(|elem| *elem &= mask);
    }

    /// Appends zero-valued rows at the bottom of the matrix, until it has `rows` rows.
    pub fn pad_rows(&mut self, rows: u32) {
        if rows > self.rows {
            self.elems.resize(rows as usize * self.cols as usize, 0);
            self.rows = rows;
        }
    }

    /// Returns a copy of `count` consecutive rows, starting at row `start`.
    pub fn select_rows(&self, start: u32, count: u32) -> Result<Matrix, GulliverPIRError> {
        if branch_opt_util::unlikely(count == 0 || start as u64 + count as u64 > self.rows as u64) {
            return Err(GulliverPIRError::RowRangeOutOfBounds);
        }

        let from = start as usize * self.cols as usize;
        let till = from + count as usize * self.cols as usize;

        Matrix::from_values(count, self.cols, self.elems[from..till].to_vec())
    }

    /// Stacks `other` below `self`, in place.
    pub fn concat(&mut self, other: &Matrix) -> Result<(), GulliverPIRError> {
        if branch_opt_util::unlikely(self.cols != other.cols) {
            return Err(GulliverPIRError::IncompatibleDimensionForMatrixConcatenation);
        }

        self.elems.extend_from_slice(&other.elems);
        self.rows += other.rows;

        Ok(())
    }

    /// Transposes the matrix.
    ///
    /// # Returns
    ///
    /// * `Matrix` - The transposed matrix.
    pub fn transpose(&self) -> Matrix {
        let (rows, cols) = (self.rows as usize, self.cols as usize);
        let mut elems = vec![0u32; self.num_elems()];

        elems.par_chunks_mut(rows).enumerate().for_each(|(ridx, row)| {
            row.iter_mut().enumerate().for_each(|(cidx, elem)| {
                *elem = self.elems[cidx * cols + ridx];
            });
        });

        Matrix {
            rows: self.cols,
            cols: self.rows,
            elems,
        }
    }

    /// Squishes the matrix in place, s.t. each group of `digits` consecutive elements of a row, each at most `basis` -bits wide,
    /// gets represented by a single element. Last group of a row is zero-padded, when number of columns isn't a multiple of `digits`.
    /// Resulting matrix has ⌈cols / digits⌉ columns and reuses the same allocation.
    pub fn squish_in_place(&mut self, basis: u32, digits: u32) -> Result<(), GulliverPIRError> {
        validate_squish_params(basis, digits)?;

        let (rows, cols, digits) = (self.rows as usize, self.cols as usize, digits as usize);
        let squished_cols = cols.div_ceil(digits);

        // Every write position is at most the first position read for it, so a single forward pass never clobbers unread input.
        for ridx in 0..rows {
            for cidx in 0..squished_cols {
                let mut packed = 0u32;

                for k in 0..digits {
                    let src_cidx = cidx * digits + k;
                    if src_cidx < cols {
                        let digit = self.elems[ridx * cols + src_cidx];
                        debug_assert!(digit < (1u32 << basis));

                        packed |= digit << (k as u32 * basis);
                    }
                }

                self.elems[ridx * squished_cols + cidx] = packed;
            }
        }

        self.elems.truncate(rows * squished_cols);
        self.cols = squished_cols as u32;

        Ok(())
    }

    /// Inverse of [`Matrix::squish_in_place`], restoring a matrix of `orig_cols` columns, in place.
    pub fn unsquish_in_place(&mut self, basis: u32, digits: u32, orig_cols: u32) -> Result<(), GulliverPIRError> {
        validate_squish_params(basis, digits)?;
        if branch_opt_util::unlikely(orig_cols == 0 || orig_cols.div_ceil(digits) != self.cols) {
            return Err(GulliverPIRError::InvalidSquishParameters { basis, digits });
        }

        let (rows, squished_cols, cols, digits) = (self.rows as usize, self.cols as usize, orig_cols as usize, digits as usize);
        let mask = mask_of(basis);

        self.elems.resize(rows * cols, 0);

        // Walk backwards, every write position is at least the position being read, while all unread input lies below it.
        for ridx in (0..rows).rev() {
            for cidx in (0..squished_cols).rev() {
                let packed = self.elems[ridx * squished_cols + cidx];

                for k in (0..digits).rev() {
                    let dst_cidx = cidx * digits + k;
                    if dst_cidx < cols {
                        self.elems[ridx * cols + dst_cidx] = (packed >> (k as u32 * basis)) & mask;
                    }
                }
            }
        }

        self.cols = orig_cols;
        Ok(())
    }

    /// Multiplies rows `row_range` of this squished matrix with a column vector, writing one element per row into `out`.
    ///
    /// Digits are unpacked on the fly, so `vector` must have `num_cols() * digits` rows. Accumulation happens modulo 2^32.
    pub fn squished_rows_x_vector(&self, row_range: Range<usize>, vector: &Matrix, basis: u32, digits: u32, out: &mut [u32]) -> Result<(), GulliverPIRError> {
        validate_squish_params(basis, digits)?;

        let cols = self.cols as usize;
        let digits = digits as usize;

        if branch_opt_util::unlikely(row_range.end > self.rows as usize || row_range.len() != out.len()) {
            return Err(GulliverPIRError::RowRangeOutOfBounds);
        }
        if branch_opt_util::unlikely(!(vector.cols == 1 && vector.rows as usize == cols * digits)) {
            return Err(GulliverPIRError::IncompatibleDimensionForPackedMatrixVectorMultiplication);
        }

        let mask = mask_of(basis);
        let vec_elems = vector.elems();

        out.par_iter_mut().zip(row_range).for_each(|(res, ridx)| {
            let row = &self.elems[ridx * cols..(ridx + 1) * cols];

            *res = row.iter().zip(vec_elems.chunks_exact(digits)).fold(0u32, |acc, (&packed, vec_chunk)| {
                vec_chunk.iter().enumerate().fold(acc, |acc, (k, &v)| {
                    let digit = (packed >> (k as u32 * basis)) & mask;
                    acc.wrapping_add(digit.wrapping_mul(v))
                })
            });
        });

        Ok(())
    }

    /// Serializes the matrix as `rows || cols || elements`, each as little-endian `u32`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.num_bytes());

        bytes.extend_from_slice(&self.rows.to_le_bytes());
        bytes.extend_from_slice(&self.cols.to_le_bytes());
        self.elems.iter().for_each(|elem| bytes.extend_from_slice(&elem.to_le_bytes()));

        bytes
    }

    /// Deserializes a matrix, previously serialized using [`Matrix::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Matrix, GulliverPIRError> {
        const OFFSET0: usize = 0;
        const OFFSET1: usize = OFFSET0 + std::mem::size_of::<u32>();
        const OFFSET2: usize = OFFSET1 + std::mem::size_of::<u32>();

        if branch_opt_util::unlikely(bytes.len() <= OFFSET2) {
            return Err(GulliverPIRError::FailedToDeserializeMatrixFromBytes);
        }

        let rows = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let cols = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let num_elems = rows as usize * cols as usize;

        if branch_opt_util::unlikely(num_elems == 0) {
            return Err(GulliverPIRError::FailedToDeserializeMatrixFromBytes);
        }

        let encoded_elems_byte_len = std::mem::size_of::<u32>() * num_elems;
        let remaining_num_bytes = bytes.len() - OFFSET2;

        if branch_opt_util::unlikely(encoded_elems_byte_len != remaining_num_bytes) {
            return Err(GulliverPIRError::FailedToDeserializeMatrixFromBytes);
        }

        let elems = bytes[OFFSET2..]
            .chunks_exact(std::mem::size_of::<u32>())
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect::<Vec<u32>>();

        Ok(Matrix { rows, cols, elems })
    }
}

#[inline(always)]
pub const fn mask_of(log_modulus: u32) -> u32 {
    if log_modulus >= u32::BITS { u32::MAX } else { (1u32 << log_modulus) - 1 }
}

fn validate_squish_params(basis: u32, digits: u32) -> Result<(), GulliverPIRError> {
    if branch_opt_util::likely(basis > 0 && digits > 0 && basis.checked_mul(digits).is_some_and(|bits| bits <= u32::BITS)) {
        Ok(())
    } else {
        Err(GulliverPIRError::InvalidSquishParameters { basis, digits })
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = u32;

    #[inline(always)]
    fn index(&self, index: (usize, usize)) -> &Self::Output {
        let (ridx, cidx) = index;
        &self.elems[ridx * self.cols as usize + cidx]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline(always)]
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        let (ridx, cidx) = index;
        &mut self.elems[ridx * self.cols as usize + cidx]
    }
}

impl Mul for Matrix {
    type Output = Result<Matrix, GulliverPIRError>;

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self::Output {
        &self * &rhs
    }
}

impl<'b> Mul<&'b Matrix> for &Matrix {
    type Output = Result<Matrix, GulliverPIRError>;

    fn mul(self, rhs: &'b Matrix) -> Self::Output {
        if branch_opt_util::unlikely(self.cols != rhs.rows) {
            return Err(GulliverPIRError::IncompatibleDimensionForMatrixMultiplication);
        }

        // Rows of the transposed rhs are contiguous, which keeps the inner product cache friendly.
        let transposed_rhs = rhs.transpose();
        let inner = self.cols as usize;

        let mut res_elems = vec![0u32; self.rows as usize * rhs.cols as usize];

        res_elems.par_iter_mut().enumerate().for_each(|(lin_idx, v)| {
            let r_idx = lin_idx / rhs.cols as usize;
            let c_idx = lin_idx - r_idx * rhs.cols as usize;

            let lhs_row = &self.elems[r_idx * inner..(r_idx + 1) * inner];
            let rhs_col = &transposed_rhs.elems[c_idx * inner..(c_idx + 1) * inner];

            *v = lhs_row.iter().zip(rhs_col).fold(0u32, |acc, (&a, &b)| acc.wrapping_add(a.wrapping_mul(b)));
        });

        Matrix::from_values(self.rows, rhs.cols, res_elems)
    }
}
