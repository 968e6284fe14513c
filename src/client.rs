use crate::{
    batch::slot_row_ranges,
    database::{DatabaseInfo, reconstruct_elem},
    params::Params,
    pir::{ClientState, Msg, SharedState},
    pir_internals::{
        branch_opt_util,
        error::GulliverPIRError,
        matrix::{Matrix, mask_of},
    },
};

/// Builds the query vector for record `index`.
///
/// A fresh secret `s` is sampled uniformly from [-uniform/2, uniform/2). The query is `A * s mod Q`, rounded down to
/// modulus q, with ⌊q/p⌋ added to the column holding the record. It is zero padded to a whole number of squished
/// groups, so that the server can multiply it with the squished database directly.
///
/// # Arguments
///
/// * `index`: Record index, as seen by the server, i.e. after batch remapping.
/// * `shared`: Shared state, holding public matrix `A`.
/// * `params`: Parameters of the database.
/// * `info`: Layout of the database.
///
/// # Returns
///
/// A `Result` containing the client state, needed for recovery, and the query message.
pub fn query(index: usize, shared: &SharedState, params: &Params, info: &DatabaseInfo) -> Result<(ClientState, Msg), GulliverPIRError> {
    if branch_opt_util::unlikely(index >= info.num_records()) {
        return Err(GulliverPIRError::IndexOutOfRange {
            index,
            num_records: info.num_records(),
        });
    }

    let pub_mat_a = shared.pub_mat_a();
    if branch_opt_util::unlikely(pub_mat_a.num_rows() as usize != info.cols() || pub_mat_a.num_cols() as usize != params.n()) {
        return Err(GulliverPIRError::InvalidHintMatrix);
    }

    let secret_vec_s = Matrix::sample_from_uniform_dist(params.n() as u32, 1, params.uniform())?;

    let mut a_s = (pub_mat_a * &secret_vec_s)?;
    a_s.reduce_mod_pow2(params.log_hint_q());

    let delta_query = params.delta_query();
    let query_mask = mask_of(params.log_query_q());

    let mut query_elems = a_s
        .elems()
        .iter()
        .map(|&v| ((v as f64 * delta_query).round() as u64 as u32) & query_mask)
        .collect::<Vec<u32>>();

    let (_, col) = info.locate(index);
    query_elems[col] = query_elems[col].wrapping_add(params.delta_index()) & query_mask;

    let squishing = info.squishing() as usize;
    let padded_len = query_elems.len().div_ceil(squishing) * squishing;
    query_elems.resize(padded_len, 0);

    let query_vec = Matrix::from_values(padded_len as u32, 1, query_elems)?;
    Ok((ClientState::new(secret_vec_s), Msg::new(query_vec)))
}

/// Decodes record `index` from the server's answer.
///
/// The answer is computed over the unshifted database, so the contribution of p/2 to every element gets cancelled by
/// an offset derived from the query. Only the rows of `H * s` that hold the record are computed.
///
/// Answer carries one vector per batch slot. Record `index` must live in the rows of slot `slot`, otherwise its
/// answer rows were computed against another query, and recovery is refused.
#[allow(clippy::too_many_arguments)]
pub fn recover(
    index: usize,
    slot: usize,
    offline: &Msg,
    query: &Msg,
    answer: &Msg,
    client: &ClientState,
    params: &Params,
    info: &DatabaseInfo,
) -> Result<u64, GulliverPIRError> {
    let hint_mat_h = offline.first().ok_or(GulliverPIRError::InvalidHintMatrix)?;
    let query_vec = query.first().ok_or(GulliverPIRError::InvalidQueryVector)?;
    let secret_vec_s = client.secret();

    if branch_opt_util::unlikely(hint_mat_h.num_cols() as usize != params.n()) {
        return Err(GulliverPIRError::InvalidHintMatrix);
    }
    if branch_opt_util::unlikely(!(secret_vec_s.num_rows() as usize == params.n() && secret_vec_s.num_cols() == 1)) {
        return Err(GulliverPIRError::InvalidClientState);
    }
    if branch_opt_util::unlikely(query_vec.num_cols() != 1) {
        return Err(GulliverPIRError::InvalidQueryVector);
    }
    if branch_opt_util::unlikely(index >= info.num_records()) {
        return Err(GulliverPIRError::IndexOutOfRange {
            index,
            num_records: info.num_records(),
        });
    }

    let num_slots = answer.matrices().len();
    let ans_vec = match answer.matrices().get(slot) {
        Some(vec) => vec,
        None if num_slots == 0 => return Err(GulliverPIRError::InvalidAnswerVector),
        None => return Err(GulliverPIRError::BatchSlotOutOfRange { slot, num_slots }),
    };

    let ne = info.ne();
    let ranges = slot_row_ranges(hint_mat_h.num_rows() as usize, ne, num_slots)?;
    let slot_rows = &ranges[slot];

    if branch_opt_util::unlikely(!(ans_vec.num_cols() == 1 && ans_vec.num_rows() as usize == slot_rows.len())) {
        return Err(GulliverPIRError::InvalidAnswerVector);
    }

    let (row, _) = info.locate(index);
    if branch_opt_util::unlikely(!(slot_rows.start <= row && row + ne <= slot_rows.end)) {
        return Err(GulliverPIRError::RecordNotInBatchSlot { index, slot });
    }
    let local_row = row - slot_rows.start;

    let p = params.p();
    let query_mask = mask_of(params.log_query_q());

    // -(p/2) * sum(q_j) mod q
    let query_sum = query_vec.elems().iter().fold(0u32, |acc, &v| acc.wrapping_add(v));
    let offset = query_sum.wrapping_mul((p / 2) as u32).wrapping_neg() & query_mask;

    let mut h_s = (&hint_mat_h.select_rows(row as u32, ne as u32)? * secret_vec_s)?;
    h_s.reduce_mod_pow2(params.log_hint_q());

    let delta_answer = params.delta_answer();
    let delta_hint = params.delta_hint();

    let digits = (0..ne)
        .map(|j| {
            let scaled_ans = (ans_vec.elems()[local_row + j].wrapping_add(offset) & query_mask) as f64 * delta_answer;
            let scaled_hint = h_s.elems()[j] as f64 * delta_hint;

            ((scaled_ans - scaled_hint).round() as i64).rem_euclid(p as i64) as u64
        })
        .collect::<Vec<u64>>();

    Ok(reconstruct_elem(&digits, index, info))
}
