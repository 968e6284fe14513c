use std::{error::Error, fmt::Display};

/// Coarse classification of every failure this crate can report.
///
/// None of these are transient, so nothing is ever retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Parameter, table or compression mismatch, detected before any large allocation.
    Configuration,
    /// A record index or batch slot beyond what was declared.
    Range,
    /// More simultaneous queries than the database rows can be split into.
    BatchOverflow,
    /// An operation was invoked on a database in the wrong layout (e.g. answering before setup).
    InvalidState,
    /// A message or matrix whose shape doesn't match what the protocol expects.
    Malformed,
    /// Recovered plaintext disagrees with the known database content.
    Correctness,
}

#[derive(Debug, PartialEq)]
pub enum GulliverPIRError {
    // Matrix
    InvalidMatrixDimension,
    InvalidNumberOfElementsInMatrix,
    IncompatibleDimensionForMatrixMultiplication,
    IncompatibleDimensionForPackedMatrixVectorMultiplication,
    IncompatibleDimensionForMatrixConcatenation,
    InvalidDimensionForVector,
    RowRangeOutOfBounds,
    InvalidSquishParameters { basis: u32, digits: u32 },
    FailedToDeserializeMatrixFromBytes,

    // Parameters
    InvalidSecretDimension(usize),
    InvalidModulusBitLength { log_hint_q: u32, log_query_q: u32 },
    InvalidPlaintextModulus(u64),
    InvalidSecretBound(u64),
    NoSuitableLWRParams { logn: u32, logm: u32, log_hint_q: u32, log_query_q: u32 },
    NoSuitablePlaintextModulus,

    // Database
    EmptyDatabase,
    RecordTooWide(usize),
    DatabaseTooLargeForParams { num_elems: usize, capacity: usize },
    ExpansionFactorDoesNotDivideRows { ne: usize, rows: usize },
    RecordCountMismatch { expected: usize, found: usize },
    RecordValueTooLarge { index: usize, record_bits: usize },
    IncompatibleCompressionParams { p: u64, basis: u32, digits: u32, log_hint_q: u32 },
    IncompatibleDatabasesForConcatenation,
    IndexOutOfRange { index: usize, num_records: usize },
    DatabaseNotCentered,
    DatabaseNotSquished,

    // PIR
    EmptyQueryBatch,
    TooManySimultaneousQueries { num_queries: usize, rows: usize, ne: usize },
    BatchSlotOutOfRange { slot: usize, num_slots: usize },
    RecordNotInBatchSlot { index: usize, slot: usize },
    InvalidHintMatrix,
    InvalidQueryVector,
    InvalidAnswerVector,
    InvalidClientState,
    RecoveredValueMismatch { index: usize, expected: u64, recovered: u64 },
}

impl GulliverPIRError {
    /// Maps this error onto the taxonomy of [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMatrixDimension
            | Self::InvalidNumberOfElementsInMatrix
            | Self::IncompatibleDimensionForMatrixMultiplication
            | Self::IncompatibleDimensionForPackedMatrixVectorMultiplication
            | Self::IncompatibleDimensionForMatrixConcatenation
            | Self::InvalidDimensionForVector
            | Self::FailedToDeserializeMatrixFromBytes
            | Self::InvalidHintMatrix
            | Self::InvalidQueryVector
            | Self::InvalidAnswerVector
            | Self::InvalidClientState => ErrorKind::Malformed,

            Self::InvalidSquishParameters { .. }
            | Self::InvalidSecretDimension(_)
            | Self::InvalidModulusBitLength { .. }
            | Self::InvalidPlaintextModulus(_)
            | Self::InvalidSecretBound(_)
            | Self::NoSuitableLWRParams { .. }
            | Self::NoSuitablePlaintextModulus
            | Self::EmptyDatabase
            | Self::RecordTooWide(_)
            | Self::DatabaseTooLargeForParams { .. }
            | Self::ExpansionFactorDoesNotDivideRows { .. }
            | Self::RecordCountMismatch { .. }
            | Self::RecordValueTooLarge { .. }
            | Self::IncompatibleCompressionParams { .. }
            | Self::IncompatibleDatabasesForConcatenation
            | Self::EmptyQueryBatch => ErrorKind::Configuration,

            Self::RowRangeOutOfBounds | Self::IndexOutOfRange { .. } | Self::BatchSlotOutOfRange { .. } | Self::RecordNotInBatchSlot { .. } => {
                ErrorKind::Range
            }

            Self::TooManySimultaneousQueries { .. } => ErrorKind::BatchOverflow,

            Self::DatabaseNotCentered | Self::DatabaseNotSquished => ErrorKind::InvalidState,

            Self::RecoveredValueMismatch { .. } => ErrorKind::Correctness,
        }
    }
}

impl Display for GulliverPIRError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMatrixDimension => write!(f, "The number of rows and columns in the matrix must be non-zero."),
            Self::InvalidNumberOfElementsInMatrix => write!(f, "The matrix must have 'rows * columns' elements."),
            Self::IncompatibleDimensionForMatrixMultiplication => write!(f, "The matrix dimensions do not allow multiplication."),
            Self::IncompatibleDimensionForPackedMatrixVectorMultiplication => {
                write!(f, "The dimensions are incompatible for multiplication of a squished matrix and a column vector.")
            }
            Self::IncompatibleDimensionForMatrixConcatenation => write!(f, "Only matrices with the same number of columns can be stacked vertically."),
            Self::InvalidDimensionForVector => write!(f, "A vector must have either one row or one column."),
            Self::RowRangeOutOfBounds => write!(f, "Requested row range lies outside of the matrix."),
            Self::InvalidSquishParameters { basis, digits } => {
                write!(f, "Can't squish {} digits of {} bits each into a 32-bit matrix element.", digits, basis)
            }
            Self::FailedToDeserializeMatrixFromBytes => write!(f, "Matrix deserialization failed, byte length doesn't match encoded dimensions."),

            Self::InvalidSecretDimension(n) => write!(f, "LWR secret dimension must be a non-zero power of two, found {}.", n),
            Self::InvalidModulusBitLength { log_hint_q, log_query_q } => write!(
                f,
                "Modulus bit-lengths must satisfy 1 <= log(q) = {} <= log(Q) = {} <= 32.",
                log_query_q, log_hint_q
            ),
            Self::InvalidPlaintextModulus(p) => write!(f, "Plaintext modulus must be a power of two, at least 2 and at most the query modulus, found {}.", p),
            Self::InvalidSecretBound(u) => write!(f, "LWR secret bound must be at least 2, found {}.", u),
            Self::NoSuitableLWRParams {
                logn,
                logm,
                log_hint_q,
                log_query_q,
            } => write!(
                f,
                "No LWR parameter set known for n = 2^{}, m = 2^{}, log(Q) = {}, log(q) = {}.",
                logn, logm, log_hint_q, log_query_q
            ),
            Self::NoSuitablePlaintextModulus => write!(f, "No plaintext modulus supports the requested database shape."),

            Self::EmptyDatabase => write!(f, "Database must hold at least one record of at least one bit."),
            Self::RecordTooWide(bits) => write!(f, "Records can be at most 64 bits wide, found {}.", bits),
            Self::DatabaseTooLargeForParams { num_elems, capacity } => {
                write!(f, "Database needs {} plaintext elements, but parameters only provide {}.", num_elems, capacity)
            }
            Self::ExpansionFactorDoesNotDivideRows { ne, rows } => {
                write!(f, "Number of plaintext elements per record ({}) must divide the database height ({}).", ne, rows)
            }
            Self::RecordCountMismatch { expected, found } => write!(f, "Expected {} records, found {}.", expected, found),
            Self::RecordValueTooLarge { index, record_bits } => write!(f, "Record at index {} doesn't fit in {} bits.", index, record_bits),
            Self::IncompatibleCompressionParams { p, basis, digits, log_hint_q } => write!(
                f,
                "Can't compress database with p = {}, basis = {}, squishing = {} and log(Q) = {}.",
                p, basis, digits, log_hint_q
            ),
            Self::IncompatibleDatabasesForConcatenation => write!(f, "Databases must share their layout and completely fill their matrices to be concatenated."),
            Self::IndexOutOfRange { index, num_records } => write!(f, "Index {} is out of range for a database of {} records.", index, num_records),
            Self::DatabaseNotCentered => write!(f, "Database must be in its centered, uncompressed form."),
            Self::DatabaseNotSquished => write!(f, "Database must be in the compressed form produced by setup."),

            Self::EmptyQueryBatch => write!(f, "Batch of queries must not be empty."),
            Self::TooManySimultaneousQueries { num_queries, rows, ne } => write!(
                f,
                "Too many simultaneous queries: {} queries can't share {} rows, when each record spans {} rows.",
                num_queries, rows, ne
            ),
            Self::BatchSlotOutOfRange { slot, num_slots } => write!(f, "Batch slot {} is out of range for a batch of {} slots.", slot, num_slots),
            Self::RecordNotInBatchSlot { index, slot } => write!(f, "Record {} doesn't live in the rows of batch slot {}.", index, slot),
            Self::InvalidHintMatrix => write!(f, "Unexpected dimension of hint matrix."),
            Self::InvalidQueryVector => write!(f, "Unexpected dimension of query vector."),
            Self::InvalidAnswerVector => write!(f, "Unexpected dimension of answer vector."),
            Self::InvalidClientState => write!(f, "Unexpected dimension of secret vector in client state."),
            Self::RecoveredValueMismatch { index, expected, recovered } => {
                write!(f, "Reconstruction failed for index {}: got {} instead of {}.", index, recovered, expected)
            }
        }
    }
}

impl Error for GulliverPIRError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}
