use crate::{
    params::Params,
    pir_internals::{
        arith::{base_p, num_db_entries, reconstruct_from_base_p},
        branch_opt_util,
        error::GulliverPIRError,
        matrix::Matrix,
        params::{MAX_RECORD_BIT_LEN, SQUISH_BASIS, SQUISH_DIGITS},
    },
};
use rand::Rng;
use tracing::debug;

/// Shape and encoding metadata of a database, shared by server and client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatabaseInfo {
    num_records: usize,
    record_bits: usize,
    packing: usize,
    ne: usize,
    x: usize,
    p: u64,
    log_hint_q: u32,
    basis: u32,
    squishing: u32,
    cols: usize,
}

impl DatabaseInfo {
    /// Computes how `num_records` records of `record_bits` bits each get laid out over a matrix shaped by `params`.
    ///
    /// Records narrower than log2(p) are packed, several to an element. Wider records are expanded over `ne`
    /// consecutive rows of the same column. All checks happen before anything gets allocated.
    pub fn new(num_records: usize, record_bits: usize, params: &Params) -> Result<DatabaseInfo, GulliverPIRError> {
        if branch_opt_util::unlikely(num_records == 0 || record_bits == 0) {
            return Err(GulliverPIRError::EmptyDatabase);
        }
        if branch_opt_util::unlikely(record_bits > MAX_RECORD_BIT_LEN) {
            return Err(GulliverPIRError::RecordTooWide(record_bits));
        }

        let (db_elems, ne, packing) = num_db_entries(num_records, record_bits, params.logp());

        let capacity = params.l() * params.m();
        if branch_opt_util::unlikely(db_elems > capacity) {
            return Err(GulliverPIRError::DatabaseTooLargeForParams { num_elems: db_elems, capacity });
        }
        if branch_opt_util::unlikely(params.l() % ne != 0) {
            return Err(GulliverPIRError::ExpansionFactorDoesNotDivideRows { ne, rows: params.l() });
        }

        // Smallest value >= ne which divides ne, kept for layout compatibility.
        let mut x = ne;
        while ne % x != 0 {
            x += 1;
        }

        debug!(
            num_records,
            record_bits,
            packing,
            ne,
            "packed database size is ~{:.3} MiB",
            (capacity as f64 * params.logp() as f64) / (8.0 * 1024.0 * 1024.0)
        );

        Ok(DatabaseInfo {
            num_records,
            record_bits,
            packing,
            ne,
            x,
            p: params.p(),
            log_hint_q: params.log_hint_q(),
            basis: SQUISH_BASIS,
            squishing: SQUISH_DIGITS,
            cols: params.m(),
        })
    }

    #[inline(always)]
    pub const fn num_records(&self) -> usize {
        self.num_records
    }
    #[inline(always)]
    pub const fn record_bits(&self) -> usize {
        self.record_bits
    }
    /// Records per plaintext element, zero when records are expanded instead.
    #[inline(always)]
    pub const fn packing(&self) -> usize {
        self.packing
    }
    /// Plaintext elements (rows) per record.
    #[inline(always)]
    pub const fn ne(&self) -> usize {
        self.ne
    }
    #[inline(always)]
    pub const fn x(&self) -> usize {
        self.x
    }
    #[inline(always)]
    pub const fn p(&self) -> u64 {
        self.p
    }
    #[inline(always)]
    pub const fn log_hint_q(&self) -> u32 {
        self.log_hint_q
    }
    #[inline(always)]
    pub const fn basis(&self) -> u32 {
        self.basis
    }
    #[inline(always)]
    pub const fn squishing(&self) -> u32 {
        self.squishing
    }
    /// Column count of the uncompressed database.
    #[inline(always)]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Maps a record index onto `(first row, column)` of the matrix elements holding it. The record spans rows
    /// `first row .. first row + ne`.
    #[inline]
    pub fn locate(&self, index: usize) -> (usize, usize) {
        let elem_idx = if self.packing > 0 { index / self.packing } else { index };
        ((elem_idx / self.cols) * self.ne, elem_idx % self.cols)
    }

    /// Number of records which can be laid out over `rows` rows of the database.
    #[inline]
    pub fn capacity_of_rows(&self, rows: usize) -> usize {
        (rows / self.ne) * self.cols * self.packing.max(1)
    }

    /// Checks that squishing can losslessly repack elements of this database and that the hint modulus can hold a
    /// full squished group.
    pub fn check_compression(&self) -> Result<(), GulliverPIRError> {
        if branch_opt_util::likely(self.p <= (1u64 << self.basis) && self.log_hint_q >= self.basis * self.squishing) {
            Ok(())
        } else {
            Err(GulliverPIRError::IncompatibleCompressionParams {
                p: self.p,
                basis: self.basis,
                digits: self.squishing,
                log_hint_q: self.log_hint_q,
            })
        }
    }
}

/// Which representation the database matrix currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseLayout {
    /// One residue modulo p per element, shifted by -p/2. Produced by construction and by reset.
    Centered,
    /// Unshifted residues, `squishing` of them per element. Produced by setup, consumed by answer.
    Squished,
}

/// Server-side database, a matrix of plaintext residues along with how records map onto it.
#[derive(Clone, Debug, PartialEq)]
pub struct Database {
    info: DatabaseInfo,
    data: Matrix,
    layout: DatabaseLayout,
}

impl Database {
    /// Encodes given records into a database shaped by `params`.
    ///
    /// # Arguments
    ///
    /// * `num_records` - Number of records, must be equal to `values.len()`.
    /// * `record_bits` - Bit width of each record, in [1, 64].
    /// * `params` - Parameters, fixing database shape and plaintext modulus.
    /// * `values` - Records, each must fit in `record_bits` bits.
    ///
    /// # Returns
    ///
    /// * `Result<Database, GulliverPIRError>` - Database in centered layout, or an error if records don't fit parameters.
    pub fn make_db(num_records: usize, record_bits: usize, params: &Params, values: &[u64]) -> Result<Database, GulliverPIRError> {
        let info = DatabaseInfo::new(num_records, record_bits, params)?;

        if branch_opt_util::unlikely(values.len() != num_records) {
            return Err(GulliverPIRError::RecordCountMismatch {
                expected: num_records,
                found: values.len(),
            });
        }
        if record_bits < MAX_RECORD_BIT_LEN {
            if let Some(index) = values.iter().position(|&v| v >> record_bits != 0) {
                branch_opt_util::cold();
                return Err(GulliverPIRError::RecordValueTooLarge { index, record_bits });
            }
        }

        let mut data = Matrix::new(params.l() as u32, params.m() as u32)?;

        if info.packing > 0 {
            for (elem_idx, chunk) in values.chunks(info.packing).enumerate() {
                let packed = chunk
                    .iter()
                    .enumerate()
                    .fold(0u64, |acc, (k, &v)| acc | (v << (k * record_bits)));

                data[(elem_idx / info.cols, elem_idx % info.cols)] = packed as u32;
            }
        } else {
            for (index, &value) in values.iter().enumerate() {
                let (row, col) = info.locate(index);

                for j in 0..info.ne {
                    data[(row + j, col)] = base_p(info.p, value, j) as u32;
                }
            }
        }

        data.sub_scalar((info.p / 2) as u32);

        Ok(Database {
            info,
            data,
            layout: DatabaseLayout::Centered,
        })
    }

    /// Fills a database shaped by `params` with residues sampled uniformly from [0, p).
    pub fn make_random_db<R: Rng>(num_records: usize, record_bits: usize, params: &Params, rng: &mut R) -> Result<Database, GulliverPIRError> {
        let info = DatabaseInfo::new(num_records, record_bits, params)?;

        let mut data = Matrix::sample_from_uniform_mod(params.l() as u32, params.m() as u32, info.p, rng)?;
        data.sub_scalar((info.p / 2) as u32);

        Ok(Database {
            info,
            data,
            layout: DatabaseLayout::Centered,
        })
    }

    #[inline(always)]
    pub const fn info(&self) -> &DatabaseInfo {
        &self.info
    }
    #[inline(always)]
    pub const fn data(&self) -> &Matrix {
        &self.data
    }
    #[inline(always)]
    pub const fn layout(&self) -> DatabaseLayout {
        self.layout
    }

    /// Decodes the record at `index`. Only works on a database in centered layout.
    pub fn get_elem(&self, index: usize) -> Result<u64, GulliverPIRError> {
        if branch_opt_util::unlikely(self.layout != DatabaseLayout::Centered) {
            return Err(GulliverPIRError::DatabaseNotCentered);
        }
        if branch_opt_util::unlikely(index >= self.info.num_records) {
            return Err(GulliverPIRError::IndexOutOfRange {
                index,
                num_records: self.info.num_records,
            });
        }

        let (row, col) = self.info.locate(index);
        let digits = (row..row + self.info.ne).map(|r| self.data[(r, col)] as u64).collect::<Vec<u64>>();

        Ok(reconstruct_elem(&digits, index, &self.info))
    }

    /// Moves the database from centered into squished layout, in place. Elements get shifted back into [0, p) and
    /// each group of `squishing` consecutive elements of a row is repacked into a single element.
    pub fn squish(&mut self) -> Result<(), GulliverPIRError> {
        if branch_opt_util::unlikely(self.layout != DatabaseLayout::Centered) {
            return Err(GulliverPIRError::DatabaseNotCentered);
        }
        self.info.check_compression()?;

        self.data.add_scalar((self.info.p / 2) as u32);
        self.data.squish_in_place(self.info.basis, self.info.squishing)?;
        self.layout = DatabaseLayout::Squished;

        Ok(())
    }

    /// Inverse of [`Database::squish`], restoring the exact centered matrix.
    pub fn unsquish(&mut self) -> Result<(), GulliverPIRError> {
        if branch_opt_util::unlikely(self.layout != DatabaseLayout::Squished) {
            return Err(GulliverPIRError::DatabaseNotSquished);
        }

        self.data.unsquish_in_place(self.info.basis, self.info.squishing, self.info.cols as u32)?;
        self.data.sub_scalar((self.info.p / 2) as u32);
        self.layout = DatabaseLayout::Centered;

        Ok(())
    }
}

/// Recombines the `ne` centered residues of one record, as read from the database or recovered by the client, into
/// the record at `index`.
pub fn reconstruct_elem(digits: &[u64], index: usize, info: &DatabaseInfo) -> u64 {
    let p = info.p;
    let uncentered = digits.iter().map(|&v| (v % p + p / 2) % p).collect::<Vec<u64>>();

    let val = reconstruct_from_base_p(p, &uncentered);

    if info.packing > 0 {
        base_p(1u64 << info.record_bits, val, index % info.packing)
    } else {
        val
    }
}

/// Stacks databases on top of each other, yielding a single database of `dbs.len()` times as many records, along with
/// parameters adjusted to the new height. Vertical stacking doesn't add LWR samples, so LWR parameters stay valid.
///
/// Each database must be completely filled with records, so that record indices continue seamlessly across databases.
pub fn concat_dbs(dbs: Vec<Database>, params: &Params) -> Result<(Database, Params), GulliverPIRError> {
    let mut dbs = dbs.into_iter();
    let mut acc = dbs.next().ok_or(GulliverPIRError::IncompatibleDatabasesForConcatenation)?;

    if branch_opt_util::unlikely(acc.info.num_records != acc.info.capacity_of_rows(params.l())) {
        return Err(GulliverPIRError::IncompatibleDatabasesForConcatenation);
    }

    let rows = acc.data.num_rows();
    let mut num_dbs = 1usize;

    for db in dbs {
        if branch_opt_util::unlikely(db.info != acc.info || db.layout != acc.layout || db.data.num_rows() != rows) {
            return Err(GulliverPIRError::IncompatibleDatabasesForConcatenation);
        }

        acc.data.concat(&db.data)?;
        num_dbs += 1;
    }

    acc.info.num_records *= num_dbs;
    let params = params.with_height(params.l() * num_dbs);

    debug!(num_dbs, num_records = acc.info.num_records, "concatenated databases");
    Ok((acc, params))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pir_internals::arith::approx_square_database_dims;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    fn params(l: usize, m: usize, p: u64) -> Params {
        Params::custom(1024, 8, l, m, 32, 28, p).unwrap()
    }

    #[test_case(9, 2, 4, 1 << 8 => (0, 2); "9 -bit records expand over two 8 -bit elements")]
    #[test_case(3, 1, 2, 1 << 8 => (2, 1); "Two 3 -bit records pack into an 8 -bit element")]
    #[test_case(12, 3, 4, 1 << 4 => (0, 3); "12 -bit records expand over three 4 -bit elements")]
    #[test_case(8, 1, 4, 1 << 8 => (1, 1); "Record as wide as plaintext modulus is packed one per element")]
    fn small_databases_decode_exactly(record_bits: usize, l: usize, m: usize, p: u64) -> (usize, usize) {
        let values = [1u64, 2, 3, 4];
        let db = Database::make_db(values.len(), record_bits, &params(l, m, p), &values).unwrap();

        let decoded = (0..values.len()).map(|i| db.get_elem(i).unwrap()).collect::<Vec<u64>>();
        assert_eq!(decoded, values);

        (db.info().packing(), db.info().ne())
    }

    #[test]
    fn single_record_database() {
        let db = Database::make_db(1, 8, &params(1, 1, 1 << 8), &[0xab]).unwrap();

        assert_eq!(db.get_elem(0), Ok(0xab));
        assert_eq!(db.get_elem(1), Err(GulliverPIRError::IndexOutOfRange { index: 1, num_records: 1 }));
    }

    #[test_case(4, 9, 3, 4, 1 << 8 => matches Err(GulliverPIRError::ExpansionFactorDoesNotDivideRows { ne: 2, rows: 3 }); "Expansion factor must divide number of rows")]
    #[test_case(0, 9, 2, 4, 1 << 8 => matches Err(GulliverPIRError::EmptyDatabase); "Database must hold at least one record")]
    #[test_case(4, 0, 2, 4, 1 << 8 => matches Err(GulliverPIRError::EmptyDatabase); "Records must be at least one bit wide")]
    #[test_case(4, 65, 2, 4, 1 << 8 => matches Err(GulliverPIRError::RecordTooWide(65)); "Records can be at most 64 bits wide")]
    #[test_case(5, 8, 2, 2, 1 << 8 => matches Err(GulliverPIRError::DatabaseTooLargeForParams { num_elems: 5, capacity: 4 }); "Records must fit in the matrix")]
    #[test_case(4, 9, 2, 4, 1 << 8 => matches Ok(_); "Valid database layout")]
    fn database_info_is_validated(num_records: usize, record_bits: usize, l: usize, m: usize, p: u64) -> Result<DatabaseInfo, GulliverPIRError> {
        DatabaseInfo::new(num_records, record_bits, &params(l, m, p))
    }

    #[test]
    fn bad_record_values_are_rejected() {
        let params = params(2, 4, 1 << 8);

        assert_eq!(
            Database::make_db(4, 9, &params, &[1, 2, 3]),
            Err(GulliverPIRError::RecordCountMismatch { expected: 4, found: 3 })
        );
        assert_eq!(
            Database::make_db(4, 9, &params, &[1, 2, 1 << 9, 4]),
            Err(GulliverPIRError::RecordValueTooLarge { index: 2, record_bits: 9 })
        );
    }

    #[test]
    fn encoded_database_can_be_decoded() {
        const NUM_TEST_ITERATIONS: usize = 100;
        const MAX_NUM_RECORDS: usize = 2_000;

        let mut rng = ChaCha8Rng::from_os_rng();

        for _ in 0..NUM_TEST_ITERATIONS {
            let num_records = rng.random_range(1..=MAX_NUM_RECORDS);
            let record_bits = rng.random_range(1..=MAX_RECORD_BIT_LEN);
            let logp = rng.random_range(1..=SQUISH_BASIS);

            let (l, m) = approx_square_database_dims(num_records, record_bits, logp);
            let params = Params::custom(1024, 8, l, m, 32, 32, 1u64 << logp).unwrap();

            let values = (0..num_records)
                .map(|_| if record_bits == MAX_RECORD_BIT_LEN { rng.random::<u64>() } else { rng.random::<u64>() >> (64 - record_bits) })
                .collect::<Vec<u64>>();

            let db = Database::make_db(num_records, record_bits, &params, &values).expect("Database must be encoded");
            assert!(values.iter().enumerate().all(|(i, &v)| db.get_elem(i) == Ok(v)));
        }
    }

    #[test]
    fn squished_database_can_be_unsquished() {
        let mut rng = ChaCha8Rng::from_os_rng();

        for (num_records, record_bits, logp) in [(1usize << 12, 1usize, 9u32), (1000, 7, 10), (777, 33, 8), (100, 64, 10), (1, 3, 3)] {
            let (l, m) = approx_square_database_dims(num_records, record_bits, logp);
            let params = Params::custom(1024, 8, l, m, 32, 28, 1u64 << logp).unwrap();

            let orig = Database::make_random_db(num_records, record_bits, &params, &mut rng).unwrap();

            let mut db = orig.clone();
            db.squish().expect("Database must be squished");

            assert_eq!(db.layout(), DatabaseLayout::Squished);
            assert_eq!(db.data().num_cols() as usize, m.div_ceil(SQUISH_DIGITS as usize));
            assert_eq!(db.get_elem(0), Err(GulliverPIRError::DatabaseNotCentered));
            assert_eq!(db.squish(), Err(GulliverPIRError::DatabaseNotCentered));

            db.unsquish().expect("Database must be unsquished");
            assert_eq!(db, orig);
            assert_eq!(db.unsquish(), Err(GulliverPIRError::DatabaseNotSquished));
        }
    }

    #[test]
    fn squishing_requires_compatible_params() {
        let params = Params::custom(1024, 8, 2, 2, 32, 28, 1 << 11).unwrap();
        let mut db = Database::make_db(4, 11, &params, &[1, 2, 3, 4]).unwrap();

        assert!(matches!(db.squish(), Err(GulliverPIRError::IncompatibleCompressionParams { .. })));
        assert_eq!(db.layout(), DatabaseLayout::Centered);
        assert_eq!(db.get_elem(3), Ok(4));

        let params = Params::custom(1024, 8, 2, 2, 28, 28, 1 << 8).unwrap();
        let mut db = Database::make_db(4, 8, &params, &[1, 2, 3, 4]).unwrap();

        assert!(matches!(db.squish(), Err(GulliverPIRError::IncompatibleCompressionParams { .. })));
    }

    #[test]
    fn locating_records() {
        let info = DatabaseInfo::new(8, 12, &params(6, 4, 1 << 4)).unwrap();
        assert_eq!(info.locate(0), (0, 0));
        assert_eq!(info.locate(5), (3, 1));

        let info = DatabaseInfo::new(16, 2, &params(2, 4, 1 << 4)).unwrap();
        assert_eq!(info.packing(), 2);
        assert_eq!(info.locate(9), (1, 0));
        assert_eq!(info.locate(15), (1, 3));
        assert_eq!(info.capacity_of_rows(2), 16);
    }

    #[test]
    fn concatenated_databases_keep_records() {
        let params = params(2, 2, 1 << 8);

        let first = [10u64, 11, 12, 13];
        let second = [20u64, 21, 22, 23];

        let dbs = vec![
            Database::make_db(4, 8, &params, &first).unwrap(),
            Database::make_db(4, 8, &params, &second).unwrap(),
        ];
        let (db, concat_params) = concat_dbs(dbs, &params).unwrap();

        assert_eq!(concat_params.l(), 4);
        assert_eq!(concat_params.m(), params.m());
        assert_eq!(db.info().num_records(), 8);
        assert_eq!(db.data().num_rows(), 4);

        let decoded = (0..8).map(|i| db.get_elem(i).unwrap()).collect::<Vec<u64>>();
        assert_eq!(decoded, first.iter().chain(second.iter()).copied().collect::<Vec<u64>>());
    }

    #[test]
    fn concatenation_failures() {
        let params = params(2, 2, 1 << 8);

        assert_eq!(concat_dbs(vec![], &params), Err(GulliverPIRError::IncompatibleDatabasesForConcatenation));

        let partial = Database::make_db(3, 8, &params, &[1, 2, 3]).unwrap();
        assert_eq!(concat_dbs(vec![partial], &params), Err(GulliverPIRError::IncompatibleDatabasesForConcatenation));

        let full = Database::make_db(4, 8, &params, &[1, 2, 3, 4]).unwrap();
        let mut squished = full.clone();
        squished.squish().unwrap();
        assert_eq!(
            concat_dbs(vec![full, squished], &params),
            Err(GulliverPIRError::IncompatibleDatabasesForConcatenation)
        );
    }
}
