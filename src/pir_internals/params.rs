pub const BIT_SECURITY_LEVEL: usize = 128;
pub const SEED_BYTE_LEN: usize = (2 * BIT_SECURITY_LEVEL) / 8;

/// Matrix elements are `u32`, so no modulus can exceed 2^32.
pub const MAX_LOG_MODULUS: u32 = u32::BITS;

/// Number of bits per digit, when squishing the database.
pub const SQUISH_BASIS: u32 = 10;
/// Number of digits grouped into a single `u32`, when squishing the database.
pub const SQUISH_DIGITS: u32 = 3;

/// Largest plaintext modulus (as log2) which still fits a squish digit.
pub const MAX_LOG_PLAINTEXT_MODULUS: u32 = SQUISH_BASIS;

/// LWR secret bound used when parameters are estimated, instead of being looked up.
pub const ESTIMATED_SECRET_BOUND: u64 = 4;

/// Records are recombined in a `u64`.
pub const MAX_RECORD_BIT_LEN: usize = u64::BITS as usize;
