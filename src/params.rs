use crate::pir_internals::{
    arith::{approx_square_database_dims, ceil_log2},
    branch_opt_util,
    error::GulliverPIRError,
    lwr_table,
    params::{ESTIMATED_SECRET_BOUND, MAX_LOG_MODULUS, MAX_LOG_PLAINTEXT_MODULUS, MAX_RECORD_BIT_LEN},
};
use std::fmt::Display;
use tracing::{debug, info};

/// How the plaintext modulus and the secret bound get chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterPolicy {
    /// Exact match against the compiled-in LWR hardness table.
    Table,
    /// Closed form estimate of the plaintext modulus, with a fixed secret bound. No table involved.
    Estimate,
}

/// Parameters of one GulliverPIR instance. Immutable once selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Params {
    n: usize,
    uniform: u64,
    l: usize,
    m: usize,
    log_hint_q: u32,
    log_query_q: u32,
    p: u64,
}

impl Params {
    /// Builds parameters from explicitly given values, after validating them.
    ///
    /// # Arguments
    ///
    /// * `n` - LWR secret dimension, must be non-zero.
    /// * `uniform` - Width of the interval secrets are sampled from, must be at least 2.
    /// * `l` - Database height.
    /// * `m` - Database width.
    /// * `log_hint_q` - Bit-length of the hint modulus Q.
    /// * `log_query_q` - Bit-length of the query modulus q, must satisfy 1 <= log(q) <= log(Q) <= 32.
    /// * `p` - Plaintext modulus, a power of two in [2, q].
    pub fn custom(n: usize, uniform: u64, l: usize, m: usize, log_hint_q: u32, log_query_q: u32, p: u64) -> Result<Params, GulliverPIRError> {
        if branch_opt_util::unlikely(n == 0) {
            return Err(GulliverPIRError::InvalidSecretDimension(n));
        }
        if branch_opt_util::unlikely(l == 0 || l > u32::MAX as usize || m == 0 || m > u32::MAX as usize) {
            return Err(GulliverPIRError::InvalidMatrixDimension);
        }
        validate_moduli(log_hint_q, log_query_q)?;
        if branch_opt_util::unlikely(!p.is_power_of_two() || p < 2 || p > (1u64 << log_query_q)) {
            return Err(GulliverPIRError::InvalidPlaintextModulus(p));
        }
        if branch_opt_util::unlikely(uniform < 2) {
            return Err(GulliverPIRError::InvalidSecretBound(uniform));
        }

        Ok(Params {
            n,
            uniform,
            l,
            m,
            log_hint_q,
            log_query_q,
            p,
        })
    }

    #[inline(always)]
    pub const fn n(&self) -> usize {
        self.n
    }
    #[inline(always)]
    pub const fn uniform(&self) -> u64 {
        self.uniform
    }
    #[inline(always)]
    pub const fn l(&self) -> usize {
        self.l
    }
    #[inline(always)]
    pub const fn m(&self) -> usize {
        self.m
    }
    #[inline(always)]
    pub const fn log_hint_q(&self) -> u32 {
        self.log_hint_q
    }
    #[inline(always)]
    pub const fn log_query_q(&self) -> u32 {
        self.log_query_q
    }
    #[inline(always)]
    pub const fn p(&self) -> u64 {
        self.p
    }
    #[inline(always)]
    pub const fn logp(&self) -> u32 {
        self.p.trailing_zeros()
    }

    /// P / Q, scales the hint contribution during recovery.
    pub fn delta_hint(&self) -> f64 {
        self.p as f64 / (1u64 << self.log_hint_q) as f64
    }

    /// q / Q, rounds `A * s` from the hint modulus down to the query modulus.
    pub fn delta_query(&self) -> f64 {
        (1u64 << self.log_query_q) as f64 / (1u64 << self.log_hint_q) as f64
    }

    /// ⌊q / P⌋, the perturbation added to the queried column.
    pub fn delta_index(&self) -> u32 {
        ((1u64 << self.log_query_q) / self.p) as u32
    }

    /// P / q, scales the answer down to the plaintext space.
    pub fn delta_answer(&self) -> f64 {
        self.p as f64 / (1u64 << self.log_query_q) as f64
    }

    /// Returns a copy of these parameters, with database height replaced.
    pub(crate) fn with_height(&self, l: usize) -> Params {
        Params { l, ..*self }
    }

    /// One line human-readable summary of the parameters.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl Display for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n = {}, db size = 2^{:.2} (l = {}, m = {}), log(Q) = {}, log(q) = {}, p = {}, uniform = {}",
            self.n,
            ((self.l * self.m) as f64).log2(),
            self.l,
            self.m,
            self.log_hint_q,
            self.log_query_q,
            self.p,
            self.uniform
        )
    }
}

fn validate_moduli(log_hint_q: u32, log_query_q: u32) -> Result<(), GulliverPIRError> {
    if branch_opt_util::likely(1 <= log_query_q && log_query_q <= log_hint_q && log_hint_q <= MAX_LOG_MODULUS) {
        Ok(())
    } else {
        Err(GulliverPIRError::InvalidModulusBitLength { log_hint_q, log_query_q })
    }
}

/// Table rows start at two samples, a single column database uses the smallest row.
fn table_logm(m: usize) -> u32 {
    ceil_log2(m).max(1)
}

fn validate_secret_dimension(n: usize) -> Result<u32, GulliverPIRError> {
    if branch_opt_util::likely(n.is_power_of_two()) {
        Ok(n.trailing_zeros())
    } else {
        Err(GulliverPIRError::InvalidSecretDimension(n))
    }
}

/// Near-square shape for `num_elems` plaintext elements, s.t. l * m >= num_elems.
fn near_square_dims(num_elems: usize) -> (usize, usize) {
    let l = num_elems.isqrt().max(1);
    let m = num_elems.div_ceil(l);

    (l, m)
}

/// log2 of the plaintext modulus, estimated for a database of `num_elems` elements, without consulting the LWR table.
fn estimate_logp(num_elems: usize, log_query_q: u32) -> Option<u32> {
    let t = (log_query_q as f64 - (num_elems as f64).log2() / 2.0 + 1.0) / 2.0;
    let logp = t.floor();

    if logp < 1.0 {
        None
    } else {
        Some((logp as u32).min(MAX_LOG_PLAINTEXT_MODULUS).min(log_query_q))
    }
}

/// Selects parameters for a database of `num_elems` plaintext elements, by exact match in the LWR table.
///
/// Database is laid out as a near-square matrix of l = ⌊√num_elems⌋ rows and m = ⌈num_elems / l⌉ columns, and the
/// table is queried with (log2(n), ⌈log2(m)⌉, log(Q), log(q)). The plaintext modulus and secret bound come from the
/// matching row.
pub fn pick_params(n: usize, num_elems: usize, log_hint_q: u32, log_query_q: u32) -> Result<Params, GulliverPIRError> {
    pick_params_with_policy(ParameterPolicy::Table, n, num_elems, log_hint_q, log_query_q)
}

/// Same as [`pick_params`], but lets the caller choose between table lookup and closed form estimation.
pub fn pick_params_with_policy(policy: ParameterPolicy, n: usize, num_elems: usize, log_hint_q: u32, log_query_q: u32) -> Result<Params, GulliverPIRError> {
    let logn = validate_secret_dimension(n)?;
    validate_moduli(log_hint_q, log_query_q)?;
    if branch_opt_util::unlikely(num_elems == 0) {
        return Err(GulliverPIRError::EmptyDatabase);
    }

    let (l, m) = near_square_dims(num_elems);

    let params = match policy {
        ParameterPolicy::Table => {
            let logm = table_logm(m);
            let row = lwr_table::lookup(logn, logm, log_hint_q, log_query_q).ok_or(GulliverPIRError::NoSuitableLWRParams {
                logn,
                logm,
                log_hint_q,
                log_query_q,
            })?;

            Params::custom(n, row.secret_bound, l, m, log_hint_q, log_query_q, 1u64 << row.logp)?
        }
        ParameterPolicy::Estimate => {
            let logp = estimate_logp(num_elems, log_query_q).ok_or(GulliverPIRError::NoSuitablePlaintextModulus)?;
            Params::custom(n, ESTIMATED_SECRET_BOUND, l, m, log_hint_q, log_query_q, 1u64 << logp)?
        }
    };

    info!(?policy, "selected parameters: {}", params);
    Ok(params)
}

/// Selects parameters for `num_records` records, each `record_bits` -bits wide.
///
/// Tries plaintext moduli from the largest squishable one downwards. For each candidate, database shape is computed
/// taking record packing/ expansion into account, and the first candidate supported by the chosen policy is returned.
pub fn pick_params_for_records(
    n: usize,
    num_records: usize,
    record_bits: usize,
    log_hint_q: u32,
    log_query_q: u32,
    policy: ParameterPolicy,
) -> Result<Params, GulliverPIRError> {
    let logn = validate_secret_dimension(n)?;
    validate_moduli(log_hint_q, log_query_q)?;
    if branch_opt_util::unlikely(num_records == 0 || record_bits == 0) {
        return Err(GulliverPIRError::EmptyDatabase);
    }
    if branch_opt_util::unlikely(record_bits > MAX_RECORD_BIT_LEN) {
        return Err(GulliverPIRError::RecordTooWide(record_bits));
    }

    for logp in (1..=MAX_LOG_PLAINTEXT_MODULUS.min(log_query_q)).rev() {
        let (l, m) = approx_square_database_dims(num_records, record_bits, logp);

        let uniform = match policy {
            ParameterPolicy::Table => lwr_table::lookup(logn, table_logm(m), log_hint_q, log_query_q)
                .filter(|row| row.logp >= logp)
                .map(|row| row.secret_bound),
            ParameterPolicy::Estimate => estimate_logp(l * m, log_query_q).filter(|&est| est >= logp).map(|_| ESTIMATED_SECRET_BOUND),
        };

        match uniform {
            Some(uniform) => {
                let params = Params::custom(n, uniform, l, m, log_hint_q, log_query_q, 1u64 << logp)?;

                info!(?policy, num_records, record_bits, "selected parameters: {}", params);
                return Ok(params);
            }
            None => debug!(logp, l, m, "plaintext modulus candidate rejected"),
        }
    }

    branch_opt_util::cold();
    Err(GulliverPIRError::NoSuitablePlaintextModulus)
}

/// Table lookup for caller-fixed database dimensions.
pub fn pick_params_given_dimensions(l: usize, m: usize, n: usize, log_hint_q: u32, log_query_q: u32) -> Result<Params, GulliverPIRError> {
    let logn = validate_secret_dimension(n)?;
    validate_moduli(log_hint_q, log_query_q)?;

    let logm = table_logm(m);
    let row = lwr_table::lookup(logn, logm, log_hint_q, log_query_q).ok_or(GulliverPIRError::NoSuitableLWRParams {
        logn,
        logm,
        log_hint_q,
        log_query_q,
    })?;

    Params::custom(n, row.secret_bound, l, m, log_hint_q, log_query_q, 1u64 << row.logp)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{database::DatabaseInfo, pir_internals::arith::num_db_entries};
    use test_case::test_case;

    #[test_case(1024, 1 << 20, 32, 28 => matches Ok(_); "Table has parameters for a 2^20 element database")]
    #[test_case(1000, 1 << 20, 32, 28 => matches Err(GulliverPIRError::InvalidSecretDimension(1000)); "Secret dimension must be a power of two")]
    #[test_case(1024, 1 << 20, 32, 30 => matches Err(GulliverPIRError::NoSuitableLWRParams { .. }); "Only exact matches are accepted")]
    #[test_case(1 << 14, 1 << 20, 32, 28 => matches Err(GulliverPIRError::NoSuitableLWRParams { .. }); "Unknown secret dimension has no parameters")]
    #[test_case(1024, 0, 32, 28 => matches Err(GulliverPIRError::EmptyDatabase); "Database can't be empty")]
    #[test_case(1024, 1 << 20, 24, 28 => matches Err(GulliverPIRError::InvalidModulusBitLength { .. }); "Query modulus can't exceed hint modulus")]
    fn picking_params_from_table(n: usize, num_elems: usize, log_hint_q: u32, log_query_q: u32) -> Result<Params, GulliverPIRError> {
        pick_params(n, num_elems, log_hint_q, log_query_q)
    }

    #[test]
    fn picking_params_is_deterministic() {
        let a = pick_params(1024, 1 << 20, 32, 28).unwrap();
        let b = pick_params(1024, 1 << 20, 32, 28).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.l(), 1024);
        assert_eq!(a.m(), 1024);
        assert!(a.l() * a.m() >= 1 << 20);
        assert_eq!(a.p(), 1 << 9);
    }

    #[test]
    fn picked_dims_cover_database() {
        for num_elems in [1usize, 2, 3, 17, 1000, 4097, 123_457] {
            let params = pick_params(1024, num_elems, 32, 28).unwrap();
            assert!(params.l() * params.m() >= num_elems);
        }
    }

    #[test]
    fn estimated_params_use_fixed_secret_bound() {
        let params = pick_params_with_policy(ParameterPolicy::Estimate, 1024, 1 << 20, 32, 28).unwrap();

        // ⌊(28 - 10 + 1) / 2⌋ = 9
        assert_eq!(params.logp(), 9);
        assert_eq!(params.uniform(), ESTIMATED_SECRET_BOUND);
    }

    #[test]
    fn estimation_fails_when_query_modulus_is_too_small() {
        assert_eq!(
            pick_params_with_policy(ParameterPolicy::Estimate, 1024, 1 << 20, 8, 8),
            Err(GulliverPIRError::NoSuitablePlaintextModulus)
        );
    }

    #[test]
    fn record_aware_selection_for_one_bit_records() {
        let params = pick_params_for_records(1024, 1 << 20, 1, 32, 28, ParameterPolicy::Table).unwrap();

        assert_eq!(params.p(), 1 << 9);
        assert_eq!((params.l(), params.m()), (341, 342));
    }

    #[test]
    fn record_aware_selection_keeps_noise_bounded() {
        const NUM_RECORDS: usize = 1 << 16;

        for record_bits in [1usize, 3, 8, 9, 12, 17, 32, 64] {
            for policy in [ParameterPolicy::Table, ParameterPolicy::Estimate] {
                let params = pick_params_for_records(1024, NUM_RECORDS, record_bits, 32, 28, policy).unwrap();
                let logp = params.logp();

                assert!(logp <= MAX_LOG_PLAINTEXT_MODULUS);

                // Packed records share an element, expanded ones span many.
                let (db_elems, elems_per_record, _) = num_db_entries(NUM_RECORDS, record_bits, logp);
                assert!(params.l() * params.m() >= db_elems);
                assert_eq!(params.l() % elems_per_record, 0);
                assert!(DatabaseInfo::new(NUM_RECORDS, record_bits, &params).is_ok());

                match policy {
                    // m * p^2 / (4q) <= 1/4
                    ParameterPolicy::Table => assert!(table_logm(params.m()) + 2 * logp <= params.log_query_q()),
                    ParameterPolicy::Estimate => assert!(estimate_logp(params.l() * params.m(), params.log_query_q()).is_some_and(|est| logp <= est)),
                }
            }
        }
    }

    #[test_case(1024, 1 << 20, 0 => matches Err(GulliverPIRError::EmptyDatabase); "Records must be at least one bit wide")]
    #[test_case(1024, 1 << 20, 65 => matches Err(GulliverPIRError::RecordTooWide(65)); "Records can be at most 64 bits wide")]
    #[test_case(1024, 0, 8 => matches Err(GulliverPIRError::EmptyDatabase); "Database must hold at least one record")]
    fn record_aware_selection_failures(n: usize, num_records: usize, record_bits: usize) -> Result<Params, GulliverPIRError> {
        pick_params_for_records(n, num_records, record_bits, 32, 28, ParameterPolicy::Table)
    }

    #[test_case(1024, 8, 2, 2, 32, 28, 256 => matches Ok(_); "Valid custom parameters")]
    #[test_case(0, 8, 2, 2, 32, 28, 256 => matches Err(GulliverPIRError::InvalidSecretDimension(0)); "Secret dimension must be non-zero")]
    #[test_case(1024, 8, 2, 2, 32, 28, 255 => matches Err(GulliverPIRError::InvalidPlaintextModulus(255)); "Plaintext modulus must be a power of two")]
    #[test_case(1024, 8, 2, 2, 32, 4, 32 => matches Err(GulliverPIRError::InvalidPlaintextModulus(32)); "Plaintext modulus can't exceed query modulus")]
    #[test_case(1024, 1, 2, 2, 32, 28, 256 => matches Err(GulliverPIRError::InvalidSecretBound(1)); "Secret bound must be at least 2")]
    #[test_case(1024, 8, 0, 2, 32, 28, 256 => matches Err(GulliverPIRError::InvalidMatrixDimension); "Database height must be non-zero")]
    #[test_case(1024, 8, 2, 2, 33, 28, 256 => matches Err(GulliverPIRError::InvalidModulusBitLength { .. }); "Hint modulus can't exceed 32 bits")]
    fn custom_params_are_validated(n: usize, uniform: u64, l: usize, m: usize, log_hint_q: u32, log_query_q: u32, p: u64) -> Result<Params, GulliverPIRError> {
        Params::custom(n, uniform, l, m, log_hint_q, log_query_q, p)
    }

    #[test]
    fn delta_factors() {
        let params = Params::custom(1024, 8, 4, 4, 32, 28, 1 << 9).unwrap();

        assert_eq!(params.delta_index(), 1 << 19);
        assert_eq!(params.delta_query(), 1.0 / 16.0);
        assert_eq!(params.delta_hint(), 2f64.powi(-23));
        assert_eq!(params.delta_answer(), 2f64.powi(-19));
    }

    #[test]
    fn given_dimensions_use_table() {
        let params = pick_params_given_dimensions(3, 4, 1024, 32, 28).unwrap();

        assert_eq!((params.l(), params.m()), (3, 4));
        assert_eq!(params.p(), 1 << 10);

        assert!(pick_params_given_dimensions(3, 4, 1024, 32, 27).is_err());
    }

    #[test]
    fn summary_mentions_every_parameter() {
        let params = Params::custom(1024, 8, 4, 4, 32, 28, 1 << 9).unwrap();
        assert_eq!(
            params.summary(),
            "n = 1024, db size = 2^4.00 (l = 4, m = 4), log(Q) = 32, log(q) = 28, p = 512, uniform = 8"
        );
    }
}
