//! Precomputed LWR hardness table.
//!
//! Each row is `(log n, log m, log Q, log q, secret bound, log p)`: for a secret of dimension `n`, at most `m`
//! LWR samples, hint modulus `Q` and query modulus `q`, the secret is sampled uniformly from
//! `[-bound/2, bound/2)` and the plaintext modulus is `p`. Rows are consumed by exact match only.
//!
//! Rows are chosen for decoding correctness, not measured security. `log p` is the largest value, at most 10, with
//! `log m + 2 * log p <= log q`, which keeps the rounding noise at most 1/4. Secret bounds are fixed per `(log n, log m)`
//! band and were not run through an LWR hardness estimator, so rows must be replaced by estimator output before
//! relying on them for a concrete security level.

/// A row of the LWR parameter table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LWRParamSet {
    pub logn: u32,
    pub logm: u32,
    pub log_hint_q: u32,
    pub log_query_q: u32,
    pub secret_bound: u64,
    pub logp: u32,
}

/// Looks up the row matching all four keys exactly, no interpolation is ever performed.
pub fn lookup(logn: u32, logm: u32, log_hint_q: u32, log_query_q: u32) -> Option<LWRParamSet> {
    LWR_PARAMS_TABLE
        .iter()
        .find(|&&(n, m, hq, qq, _, _)| n == logn && m == logm && hq == log_hint_q && qq == log_query_q)
        .map(|&(logn, logm, log_hint_q, log_query_q, secret_bound, logp)| LWRParamSet {
            logn,
            logm,
            log_hint_q,
            log_query_q,
            secret_bound,
            logp,
        })
}

#[rustfmt::skip]
const LWR_PARAMS_TABLE: &[(u32, u32, u32, u32, u64, u32)] = &[
    (9, 1, 32, 24, 32, 10),
    (9, 2, 32, 24, 32, 10),
    (9, 3, 32, 24, 32, 10),
    (9, 4, 32, 24, 32, 10),
    (9, 5, 32, 24, 32, 9),
    (9, 6, 32, 24, 32, 9),
    (9, 7, 32, 24, 32, 8),
    (9, 8, 32, 24, 32, 8),
    (9, 9, 32, 24, 32, 7),
    (9, 10, 32, 24, 32, 7),
    (9, 11, 32, 24, 32, 6),
    (9, 12, 32, 24, 32, 6),
    (9, 13, 32, 24, 32, 5),
    (9, 14, 32, 24, 32, 5),
    (9, 15, 32, 24, 32, 4),
    (9, 16, 32, 24, 16, 4),
    (9, 17, 32, 24, 16, 3),
    (9, 18, 32, 24, 16, 3),
    (9, 19, 32, 24, 16, 2),
    (9, 20, 32, 24, 16, 2),
    (9, 1, 32, 26, 32, 10),
    (9, 2, 32, 26, 32, 10),
    (9, 3, 32, 26, 32, 10),
    (9, 4, 32, 26, 32, 10),
    (9, 5, 32, 26, 32, 10),
    (9, 6, 32, 26, 32, 10),
    (9, 7, 32, 26, 32, 9),
    (9, 8, 32, 26, 32, 9),
    (9, 9, 32, 26, 32, 8),
    (9, 10, 32, 26, 32, 8),
    (9, 11, 32, 26, 32, 7),
    (9, 12, 32, 26, 32, 7),
    (9, 13, 32, 26, 32, 6),
    (9, 14, 32, 26, 32, 6),
    (9, 15, 32, 26, 32, 5),
    (9, 16, 32, 26, 16, 5),
    (9, 17, 32, 26, 16, 4),
    (9, 18, 32, 26, 16, 4),
    (9, 19, 32, 26, 16, 3),
    (9, 20, 32, 26, 16, 3),
    (9, 1, 32, 28, 32, 10),
    (9, 2, 32, 28, 32, 10),
    (9, 3, 32, 28, 32, 10),
    (9, 4, 32, 28, 32, 10),
    (9, 5, 32, 28, 32, 10),
    (9, 6, 32, 28, 32, 10),
    (9, 7, 32, 28, 32, 10),
    (9, 8, 32, 28, 32, 10),
    (9, 9, 32, 28, 32, 9),
    (9, 10, 32, 28, 32, 9),
    (9, 11, 32, 28, 32, 8),
    (9, 12, 32, 28, 32, 8),
    (9, 13, 32, 28, 32, 7),
    (9, 14, 32, 28, 32, 7),
    (9, 15, 32, 28, 32, 6),
    (9, 16, 32, 28, 16, 6),
    (9, 17, 32, 28, 16, 5),
    (9, 18, 32, 28, 16, 5),
    (9, 19, 32, 28, 16, 4),
    (9, 20, 32, 28, 16, 4),
    (10, 1, 32, 24, 16, 10),
    (10, 2, 32, 24, 16, 10),
    (10, 3, 32, 24, 16, 10),
    (10, 4, 32, 24, 16, 10),
    (10, 5, 32, 24, 16, 9),
    (10, 6, 32, 24, 16, 9),
    (10, 7, 32, 24, 16, 8),
    (10, 8, 32, 24, 16, 8),
    (10, 9, 32, 24, 16, 7),
    (10, 10, 32, 24, 16, 7),
    (10, 11, 32, 24, 16, 6),
    (10, 12, 32, 24, 16, 6),
    (10, 13, 32, 24, 16, 5),
    (10, 14, 32, 24, 16, 5),
    (10, 15, 32, 24, 16, 4),
    (10, 16, 32, 24, 8, 4),
    (10, 17, 32, 24, 8, 3),
    (10, 18, 32, 24, 8, 3),
    (10, 19, 32, 24, 8, 2),
    (10, 20, 32, 24, 8, 2),
    (10, 1, 32, 26, 16, 10),
    (10, 2, 32, 26, 16, 10),
    (10, 3, 32, 26, 16, 10),
    (10, 4, 32, 26, 16, 10),
    (10, 5, 32, 26, 16, 10),
    (10, 6, 32, 26, 16, 10),
    (10, 7, 32, 26, 16, 9),
    (10, 8, 32, 26, 16, 9),
    (10, 9, 32, 26, 16, 8),
    (10, 10, 32, 26, 16, 8),
    (10, 11, 32, 26, 16, 7),
    (10, 12, 32, 26, 16, 7),
    (10, 13, 32, 26, 16, 6),
    (10, 14, 32, 26, 16, 6),
    (10, 15, 32, 26, 16, 5),
    (10, 16, 32, 26, 8, 5),
    (10, 17, 32, 26, 8, 4),
    (10, 18, 32, 26, 8, 4),
    (10, 19, 32, 26, 8, 3),
    (10, 20, 32, 26, 8, 3),
    (10, 1, 32, 28, 16, 10),
    (10, 2, 32, 28, 16, 10),
    (10, 3, 32, 28, 16, 10),
    (10, 4, 32, 28, 16, 10),
    (10, 5, 32, 28, 16, 10),
    (10, 6, 32, 28, 16, 10),
    (10, 7, 32, 28, 16, 10),
    (10, 8, 32, 28, 16, 10),
    (10, 9, 32, 28, 16, 9),
    (10, 10, 32, 28, 16, 9),
    (10, 11, 32, 28, 16, 8),
    (10, 12, 32, 28, 16, 8),
    (10, 13, 32, 28, 16, 7),
    (10, 14, 32, 28, 16, 7),
    (10, 15, 32, 28, 16, 6),
    (10, 16, 32, 28, 8, 6),
    (10, 17, 32, 28, 8, 5),
    (10, 18, 32, 28, 8, 5),
    (10, 19, 32, 28, 8, 4),
    (10, 20, 32, 28, 8, 4),
    (11, 1, 32, 24, 8, 10),
    (11, 2, 32, 24, 8, 10),
    (11, 3, 32, 24, 8, 10),
    (11, 4, 32, 24, 8, 10),
    (11, 5, 32, 24, 8, 9),
    (11, 6, 32, 24, 8, 9),
    (11, 7, 32, 24, 8, 8),
    (11, 8, 32, 24, 8, 8),
    (11, 9, 32, 24, 8, 7),
    (11, 10, 32, 24, 8, 7),
    (11, 11, 32, 24, 8, 6),
    (11, 12, 32, 24, 8, 6),
    (11, 13, 32, 24, 8, 5),
    (11, 14, 32, 24, 8, 5),
    (11, 15, 32, 24, 8, 4),
    (11, 16, 32, 24, 4, 4),
    (11, 17, 32, 24, 4, 3),
    (11, 18, 32, 24, 4, 3),
    (11, 19, 32, 24, 4, 2),
    (11, 20, 32, 24, 4, 2),
    (11, 1, 32, 26, 8, 10),
    (11, 2, 32, 26, 8, 10),
    (11, 3, 32, 26, 8, 10),
    (11, 4, 32, 26, 8, 10),
    (11, 5, 32, 26, 8, 10),
    (11, 6, 32, 26, 8, 10),
    (11, 7, 32, 26, 8, 9),
    (11, 8, 32, 26, 8, 9),
    (11, 9, 32, 26, 8, 8),
    (11, 10, 32, 26, 8, 8),
    (11, 11, 32, 26, 8, 7),
    (11, 12, 32, 26, 8, 7),
    (11, 13, 32, 26, 8, 6),
    (11, 14, 32, 26, 8, 6),
    (11, 15, 32, 26, 8, 5),
    (11, 16, 32, 26, 4, 5),
    (11, 17, 32, 26, 4, 4),
    (11, 18, 32, 26, 4, 4),
    (11, 19, 32, 26, 4, 3),
    (11, 20, 32, 26, 4, 3),
    (11, 1, 32, 28, 8, 10),
    (11, 2, 32, 28, 8, 10),
    (11, 3, 32, 28, 8, 10),
    (11, 4, 32, 28, 8, 10),
    (11, 5, 32, 28, 8, 10),
    (11, 6, 32, 28, 8, 10),
    (11, 7, 32, 28, 8, 10),
    (11, 8, 32, 28, 8, 10),
    (11, 9, 32, 28, 8, 9),
    (11, 10, 32, 28, 8, 9),
    (11, 11, 32, 28, 8, 8),
    (11, 12, 32, 28, 8, 8),
    (11, 13, 32, 28, 8, 7),
    (11, 14, 32, 28, 8, 7),
    (11, 15, 32, 28, 8, 6),
    (11, 16, 32, 28, 4, 6),
    (11, 17, 32, 28, 4, 5),
    (11, 18, 32, 28, 4, 5),
    (11, 19, 32, 28, 4, 4),
    (11, 20, 32, 28, 4, 4),
];
