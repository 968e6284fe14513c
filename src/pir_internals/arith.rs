/// Returns the `i`-th digit in the base-`p` representation of `m`.
#[inline]
pub fn base_p(p: u64, mut m: u64, i: usize) -> u64 {
    for _ in 0..i {
        m /= p;
    }
    m % p
}

/// Returns the element whose base-`p` decomposition (least significant digit first) is given by `digits`.
#[inline]
pub fn reconstruct_from_base_p(p: u64, digits: &[u64]) -> u64 {
    let mut res = 0u64;
    let mut coeff = 1u64;

    for &digit in digits {
        res = res.wrapping_add(coeff.wrapping_mul(digit));
        coeff = coeff.wrapping_mul(p);
    }

    res
}

/// Number of base-`p` digits required for representing a `bit_len` -bit value, where `p = 2^logp`.
#[inline]
pub const fn num_digits_base_p(logp: u32, bit_len: usize) -> usize {
    bit_len.div_ceil(logp as usize)
}

/// Computes how many plaintext elements, modulo `p = 2^logp`, are required for storing `num_records` records,
/// each `record_bits` -bits wide.
///
/// Returns `(db_elems, elems_per_record, records_per_elem)`. When a record fits in a single element, several
/// records get packed together and `elems_per_record` is 1, otherwise a record is expanded over multiple elements
/// and `records_per_elem` is 0.
pub fn num_db_entries(num_records: usize, record_bits: usize, logp: u32) -> (usize, usize, usize) {
    if record_bits <= logp as usize {
        let records_per_elem = logp as usize / record_bits;
        let db_elems = num_records.div_ceil(records_per_elem);

        (db_elems, 1, records_per_elem)
    } else {
        let elems_per_record = num_digits_base_p(logp, record_bits);
        (num_records * elems_per_record, elems_per_record, 0)
    }
}

/// Finds near-square database dimensions `(l, m)`, s.t. `l` is a multiple of the number of elements per record
/// and `l * m` covers all plaintext elements required for storing the database.
pub fn approx_square_database_dims(num_records: usize, record_bits: usize, logp: u32) -> (usize, usize) {
    let (db_elems, elems_per_record, _) = num_db_entries(num_records, record_bits, logp);

    let mut l = db_elems.isqrt().max(1);

    let rem = l % elems_per_record;
    if rem != 0 {
        l += elems_per_record - rem;
    }

    let m = db_elems.div_ceil(l);
    (l, m)
}

/// Returns ⌈log2(x)⌉, for x > 0.
#[inline]
pub const fn ceil_log2(x: usize) -> u32 {
    if x <= 1 { 0 } else { usize::BITS - (x - 1).leading_zeros() }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    #[test]
    fn reconstruct_from_base_p_is_correct() {
        let mut val = [1, 0, 0, 1, 1, 0, 0, 0, 0];
        val.reverse();
        assert_eq!(reconstruct_from_base_p(2, &val), 0b100110000);
    }

    #[test]
    fn base_p_is_correct() {
        assert_eq!(base_p(2, 0b10000000, 0), 0);
        assert_eq!(base_p(2, 0b10000000, 7), 1);
        assert_eq!(base_p(2, 0b10010000, 4), 1);
        assert_eq!(base_p(512, 0, 6), 0);
        assert_eq!(base_p(512, 513, 0), 1);
        assert_eq!(base_p(512, 513, 1), 1);
    }

    #[test]
    fn base_p_decomposition_can_be_reconstructed() {
        const NUM_TEST_ITERATIONS: usize = 1_000;

        let mut rng = ChaCha8Rng::from_os_rng();

        for _ in 0..NUM_TEST_ITERATIONS {
            let logp = rng.random_range(1..=10u32);
            let record_bits = rng.random_range(1..=64usize);
            let value = if record_bits == 64 { rng.random::<u64>() } else { rng.random::<u64>() & ((1u64 << record_bits) - 1) };

            let num_digits = num_digits_base_p(logp, record_bits);
            let digits = (0..num_digits).map(|i| base_p(1u64 << logp, value, i)).collect::<Vec<u64>>();

            assert_eq!(reconstruct_from_base_p(1u64 << logp, &digits), value);
        }
    }

    #[test_case(4, 9, 8 => (8, 2, 0); "9 -bit records need two 8 -bit digits each")]
    #[test_case(4, 3, 8 => (2, 1, 2); "Two 3 -bit records fit in an 8 -bit element")]
    #[test_case(4, 12, 4 => (12, 3, 0); "12 -bit records need three 4 -bit digits each")]
    #[test_case(1 << 20, 1, 9 => (116509, 1, 9); "Nine 1 -bit records fit in a 9 -bit element")]
    fn number_of_database_entries(num_records: usize, record_bits: usize, logp: u32) -> (usize, usize, usize) {
        num_db_entries(num_records, record_bits, logp)
    }

    #[test]
    fn approx_square_dims_cover_database() {
        const NUM_TEST_ITERATIONS: usize = 1_000;

        let mut rng = ChaCha8Rng::from_os_rng();

        for _ in 0..NUM_TEST_ITERATIONS {
            let num_records = rng.random_range(1..=1usize << 20);
            let record_bits = rng.random_range(1..=64usize);
            let logp = rng.random_range(1..=10u32);

            let (db_elems, ne, _) = num_db_entries(num_records, record_bits, logp);
            let (l, m) = approx_square_database_dims(num_records, record_bits, logp);

            assert_eq!(l % ne, 0);
            assert!(l * m >= db_elems);
        }
    }

    #[test_case(1 => 0)]
    #[test_case(2 => 1)]
    #[test_case(3 => 2)]
    #[test_case(1024 => 10)]
    #[test_case(1025 => 11)]
    fn ceil_log2_is_correct(x: usize) -> u32 {
        ceil_log2(x)
    }
}
