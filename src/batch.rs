use crate::{
    database::{Database, DatabaseInfo},
    params::Params,
    pir::{BatchOfMsg, ClientState, Msg, PIR, ServerState, SharedState},
    pir_internals::{branch_opt_util, error::GulliverPIRError},
};
use rayon::prelude::*;
use std::{
    ops::Range,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// Communication cost of a round, in KiB.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bandwidth {
    pub offline_download_kib: f64,
    pub online_upload_kib: f64,
    pub online_download_kib: f64,
}

impl Bandwidth {
    pub fn total_kib(&self) -> f64 {
        self.offline_download_kib + self.online_upload_kib + self.online_download_kib
    }
}

/// Wall-clock time spent in each phase of a round.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhaseTimings {
    pub setup: Duration,
    pub query: Duration,
    pub answer: Duration,
    pub recover: Duration,
}

/// Outcome of [`run_round`].
#[derive(Clone, Debug, PartialEq)]
pub struct RoundReport {
    /// Database indices actually queried, one per slot, after remapping.
    pub indices: Vec<usize>,
    /// Recovered records, one per slot, each verified against the database.
    pub values: Vec<u64>,
    pub timings: PhaseTimings,
    pub bandwidth: Bandwidth,
    /// Database bytes processed per second of answering, in MiB/s.
    pub throughput_mib_s: f64,
}

#[inline]
fn kib(num_elems: usize, log_modulus: u32) -> f64 {
    (num_elems as f64 * log_modulus as f64) / (8.0 * 1024.0)
}

/// MiB processed per second. Zero when the elapsed time is too short to be measured.
#[inline]
fn throughput(mib: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { mib / secs } else { 0.0 }
}

/// Splits `rows` database rows into `num_queries` contiguous slots. Each slot gets ne * ⌊rows / (ne * num_queries)⌋
/// rows, so that no record straddles two slots, and the last slot also takes whatever remains.
pub fn slot_row_ranges(rows: usize, ne: usize, num_queries: usize) -> Result<Vec<Range<usize>>, GulliverPIRError> {
    if branch_opt_util::unlikely(num_queries == 0) {
        return Err(GulliverPIRError::EmptyQueryBatch);
    }

    let rows_per_slot = ne * (rows / (ne * num_queries));
    if branch_opt_util::unlikely(rows_per_slot == 0) {
        return Err(GulliverPIRError::TooManySimultaneousQueries { num_queries, rows, ne });
    }

    Ok((0..num_queries)
        .map(|slot| {
            let start = slot * rows_per_slot;
            let end = if slot + 1 == num_queries { rows } else { start + rows_per_slot };

            start..end
        })
        .collect())
}

/// Number of records addressable from within a single slot, when `num_queries` queries share a database of
/// `rows` x `cols` elements.
pub fn batch_size(info: &DatabaseInfo, rows: usize, cols: usize, num_queries: usize) -> Result<usize, GulliverPIRError> {
    if branch_opt_util::unlikely(num_queries == 0) {
        return Err(GulliverPIRError::EmptyQueryBatch);
    }

    let row_groups_per_slot = rows / (info.ne() * num_queries);
    if branch_opt_util::unlikely(row_groups_per_slot == 0) {
        return Err(GulliverPIRError::TooManySimultaneousQueries {
            num_queries,
            rows,
            ne: info.ne(),
        });
    }

    Ok(row_groups_per_slot * cols * info.packing().max(1))
}

/// Maps a slot-local record index onto its index in the whole database.
#[inline]
pub fn remap_index(index: usize, slot: usize, batch_size: usize) -> Result<usize, GulliverPIRError> {
    if branch_opt_util::unlikely(index >= batch_size) {
        return Err(GulliverPIRError::IndexOutOfRange {
            index,
            num_records: batch_size,
        });
    }

    Ok(index + slot * batch_size)
}

/// Communication cost of a single query round, derived from parameters alone.
pub fn estimate_bandwidth(params: &Params) -> Bandwidth {
    Bandwidth {
        offline_download_kib: kib(params.l() * params.n(), params.log_hint_q()),
        online_upload_kib: kib(params.m(), params.log_query_q()),
        online_download_kib: kib(params.l(), params.log_query_q()),
    }
}

struct OnlineOutcome {
    queries: BatchOfMsg,
    answer: Msg,
    values: Vec<u64>,
    query_time: Duration,
    answer_time: Duration,
    recover_time: Duration,
}

#[allow(clippy::too_many_arguments)]
fn online_phase<T: PIR + ?Sized>(
    pir: &T,
    db: &Database,
    indices: &[usize],
    info: &DatabaseInfo,
    offline: &Msg,
    server: &ServerState,
    shared: &SharedState,
    params: &Params,
) -> Result<OnlineOutcome, GulliverPIRError> {
    let start = Instant::now();
    let (client_states, query_msgs): (Vec<ClientState>, Vec<Msg>) = indices
        .par_iter()
        .map(|&index| pir.query(index, shared, params, info))
        .collect::<Result<Vec<(ClientState, Msg)>, GulliverPIRError>>()?
        .into_iter()
        .unzip();
    let queries = BatchOfMsg::new(query_msgs);
    let query_time = start.elapsed();
    debug!(elapsed = ?query_time, num_queries = queries.len(), "built queries");

    let start = Instant::now();
    let answer = pir.answer(db, &queries, server, shared, params)?;
    let answer_time = start.elapsed();
    debug!(elapsed = ?answer_time, "answered queries");

    let start = Instant::now();
    let values = indices
        .par_iter()
        .zip(queries.msgs().par_iter().zip(client_states.par_iter()))
        .enumerate()
        .map(|(slot, (&index, (query, client)))| pir.recover(index, slot, offline, query, &answer, shared, client, params, info))
        .collect::<Result<Vec<u64>, GulliverPIRError>>()?;
    let recover_time = start.elapsed();
    debug!(elapsed = ?recover_time, "recovered records");

    Ok(OnlineOutcome {
        queries,
        answer,
        values,
        query_time,
        answer_time,
        recover_time,
    })
}

/// Runs a complete round of the protocol, offline and online phases, for one slot-local index per batch slot.
///
/// Index `indices[slot]` is remapped into the rows of that slot. After recovery the database is reset, and every
/// recovered record is compared with the plaintext one, a mismatch being reported as an error. The database is reset
/// even when the online phase fails.
pub fn run_round<T: PIR + ?Sized>(pir: &T, db: &mut Database, params: &Params, indices: &[usize]) -> Result<RoundReport, GulliverPIRError> {
    let info = *db.info();
    let num_queries = indices.len();

    let bsize = batch_size(&info, params.l(), info.cols(), num_queries)?;
    let remapped = indices
        .iter()
        .enumerate()
        .map(|(slot, &index)| remap_index(index, slot, bsize))
        .collect::<Result<Vec<usize>, GulliverPIRError>>()?;

    if let Some(&index) = remapped.iter().find(|&&index| index >= info.num_records()) {
        branch_opt_util::cold();
        return Err(GulliverPIRError::IndexOutOfRange {
            index,
            num_records: info.num_records(),
        });
    }

    info!(scheme = pir.name(), num_queries, batch_size = bsize, "executing round");

    let shared = pir.init(&info, params)?;

    let start = Instant::now();
    let (server, offline) = pir.setup(db, &shared, params)?;
    let setup_time = start.elapsed();
    debug!(elapsed = ?setup_time, "setup done");

    let outcome = online_phase(pir, db, &remapped, &info, &offline, &server, &shared, params);
    pir.reset(db, params)?;
    let outcome = outcome?;

    for (&index, &recovered) in remapped.iter().zip(outcome.values.iter()) {
        let expected = db.get_elem(index)?;

        if branch_opt_util::unlikely(expected != recovered) {
            warn!(index, expected, recovered, "recovered record doesn't match database");
            return Err(GulliverPIRError::RecoveredValueMismatch { index, expected, recovered });
        }
    }

    let bandwidth = Bandwidth {
        offline_download_kib: kib(offline.size(), params.log_hint_q()),
        online_upload_kib: kib(outcome.queries.size(), params.log_query_q()),
        online_download_kib: kib(outcome.answer.size(), params.log_query_q()),
    };

    let db_mib = (params.logp() as f64 * (params.l() * params.m()) as f64 * num_queries as f64) / (8.0 * 1024.0 * 1024.0);
    let throughput_mib_s = throughput(db_mib, outcome.answer_time);

    info!(
        setup = ?setup_time,
        query = ?outcome.query_time,
        answer = ?outcome.answer_time,
        recover = ?outcome.recover_time,
        offline_download_kib = bandwidth.offline_download_kib,
        online_upload_kib = bandwidth.online_upload_kib,
        online_download_kib = bandwidth.online_download_kib,
        throughput_mib_s,
        "round succeeded"
    );

    Ok(RoundReport {
        indices: remapped,
        values: outcome.values,
        timings: PhaseTimings {
            setup: setup_time,
            query: outcome.query_time,
            answer: outcome.answer_time,
            recover: outcome.recover_time,
        },
        bandwidth,
        throughput_mib_s,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case(10, 1, 1 => vec![0..10]; "Single query covers every row")]
    #[test_case(10, 1, 3 => vec![0..3, 3..6, 6..10]; "Last slot takes the remainder")]
    #[test_case(12, 3, 2 => vec![0..6, 6..12]; "Slots are aligned to expansion factor")]
    #[test_case(14, 3, 2 => vec![0..6, 6..14]; "Trailing rows go to the last slot")]
    fn slots_partition_rows(rows: usize, ne: usize, num_queries: usize) -> Vec<Range<usize>> {
        let ranges = slot_row_ranges(rows, ne, num_queries).unwrap();

        assert_eq!(ranges.first().map(|r| r.start), Some(0));
        assert_eq!(ranges.last().map(|r| r.end), Some(rows));
        assert!(ranges.windows(2).all(|w| w[0].end == w[1].start));

        ranges
    }

    #[test_case(10, 1, 0 => matches Err(GulliverPIRError::EmptyQueryBatch); "Batch can't be empty")]
    #[test_case(10, 1, 11 => matches Err(GulliverPIRError::TooManySimultaneousQueries { num_queries: 11, rows: 10, ne: 1 }); "More queries than rows")]
    #[test_case(12, 3, 5 => matches Err(GulliverPIRError::TooManySimultaneousQueries { .. }); "More queries than row groups")]
    fn slot_partition_failures(rows: usize, ne: usize, num_queries: usize) -> Result<Vec<Range<usize>>, GulliverPIRError> {
        slot_row_ranges(rows, ne, num_queries)
    }

    #[test]
    fn batch_size_accounts_for_packing_and_expansion() {
        let params = Params::custom(1024, 8, 4, 4, 32, 28, 1 << 8).unwrap();

        let packed = DatabaseInfo::new(64, 2, &params).unwrap();
        assert_eq!(packed.packing(), 4);
        assert_eq!(batch_size(&packed, 4, 4, 2), Ok(2 * 4 * 4));

        let expanded = DatabaseInfo::new(8, 16, &params).unwrap();
        assert_eq!(expanded.ne(), 2);
        assert_eq!(batch_size(&expanded, 4, 4, 2), Ok(4));
        assert_eq!(
            batch_size(&expanded, 4, 4, 3),
            Err(GulliverPIRError::TooManySimultaneousQueries { num_queries: 3, rows: 4, ne: 2 })
        );
    }

    #[test_case(4.0, Duration::from_secs(2) => 2.0; "Regular rate")]
    #[test_case(4.0, Duration::ZERO => 0.0; "Unmeasurably fast answer")]
    fn throughput_is_always_finite(mib: f64, elapsed: Duration) -> f64 {
        throughput(mib, elapsed)
    }

    #[test]
    fn remapping_places_index_in_its_slot() {
        assert_eq!(remap_index(5, 0, 16), Ok(5));
        assert_eq!(remap_index(5, 3, 16), Ok(53));
        assert_eq!(remap_index(16, 1, 16), Err(GulliverPIRError::IndexOutOfRange { index: 16, num_records: 16 }));
    }

    #[test]
    fn remapped_indices_stay_inside_slot_rows() {
        let params = Params::custom(1024, 8, 12, 5, 32, 28, 1 << 4).unwrap();
        let info = DatabaseInfo::new(20, 9, &params).unwrap();
        assert_eq!(info.ne(), 3);

        let num_queries = 2;
        let ranges = slot_row_ranges(params.l(), info.ne(), num_queries).unwrap();
        let bsize = batch_size(&info, params.l(), params.m(), num_queries).unwrap();

        for slot in 0..num_queries {
            for index in 0..bsize {
                let (row, _) = info.locate(remap_index(index, slot, bsize).unwrap());
                assert!(ranges[slot].contains(&row));
                assert!(ranges[slot].contains(&(row + info.ne() - 1)));
            }
        }
    }

    #[test]
    fn estimated_bandwidth() {
        let params = Params::custom(1024, 8, 1024, 1024, 32, 28, 1 << 9).unwrap();
        let bw = estimate_bandwidth(&params);

        assert_eq!(bw.offline_download_kib, 4096.0);
        assert_eq!(bw.online_upload_kib, 3.5);
        assert_eq!(bw.online_download_kib, 3.5);
        assert_eq!(bw.total_kib(), 4103.0);
    }
}
