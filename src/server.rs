use crate::{
    batch::slot_row_ranges,
    database::{Database, DatabaseLayout},
    params::Params,
    pir::{BatchOfMsg, Msg, ServerState, SharedState},
    pir_internals::{
        branch_opt_util,
        error::GulliverPIRError,
        matrix::{Matrix, mask_of},
    },
};
use rayon::prelude::*;
use tracing::debug;

/// Offline phase of the server.
///
/// Computes the hint matrix `H = D * A mod Q`, over the centered database, and then squishes the database in place, so
/// that it is ready for answering queries. Compression parameters are checked before the hint gets computed, so a
/// failure leaves the database untouched.
///
/// # Arguments
///
/// * `db`: Database in centered layout.
/// * `shared`: Shared state, holding public matrix `A` of shape m x n.
/// * `params`: Parameters the database was built with.
///
/// # Returns
///
/// A `Result` containing the (empty) server state and the hint message, of shape l x n.
pub fn setup(db: &mut Database, shared: &SharedState, params: &Params) -> Result<(ServerState, Msg), GulliverPIRError> {
    if branch_opt_util::unlikely(db.layout() != DatabaseLayout::Centered) {
        return Err(GulliverPIRError::DatabaseNotCentered);
    }
    db.info().check_compression()?;

    let mut hint_mat_h = (db.data() * shared.pub_mat_a())?;
    hint_mat_h.reduce_mod_pow2(params.log_hint_q());

    db.squish()?;

    debug!(
        rows = hint_mat_h.num_rows(),
        cols = hint_mat_h.num_cols(),
        squished_cols = db.data().num_cols(),
        "computed hint and squished database"
    );
    Ok((ServerState, Msg::new(hint_mat_h)))
}

/// Online phase of the server.
///
/// Rows of the squished database are split into one contiguous range per query in the batch. Each range gets
/// multiplied with its own query vector, in parallel, and reduced modulo q. The answer carries one vector per slot, in
/// slot order, so that the client can only decode records from the rows its own query was multiplied with.
pub fn answer(db: &Database, queries: &BatchOfMsg, params: &Params) -> Result<Msg, GulliverPIRError> {
    let mut out = Msg::default();
    answer_into(db, queries, params, &mut out)?;

    Ok(out)
}

/// Same as [`answer`], but writes into `out`. Per slot vectors already held by `out` get reused when their shape
/// matches, so that answering many batches of the same size doesn't allocate.
pub fn answer_into(db: &Database, queries: &BatchOfMsg, params: &Params, out: &mut Msg) -> Result<(), GulliverPIRError> {
    if branch_opt_util::unlikely(db.layout() != DatabaseLayout::Squished) {
        return Err(GulliverPIRError::DatabaseNotSquished);
    }

    let info = db.info();
    let data = db.data();

    let rows = data.num_rows() as usize;
    let ranges = slot_row_ranges(rows, info.ne(), queries.len())?;

    let query_len = data.num_cols() * info.squishing();
    let query_vecs = queries
        .msgs()
        .iter()
        .map(|msg| match msg.first() {
            Some(vec) if vec.num_rows() == query_len && vec.num_cols() == 1 => Ok(vec),
            _ => Err(GulliverPIRError::InvalidQueryVector),
        })
        .collect::<Result<Vec<&Matrix>, GulliverPIRError>>()?;

    let slot_vecs = out.matrices_mut();
    slot_vecs.truncate(ranges.len());
    for (slot, range) in ranges.iter().enumerate() {
        let reusable = slot_vecs.get(slot).is_some_and(|vec| vec.num_rows() as usize == range.len() && vec.num_cols() == 1);
        if reusable {
            continue;
        }

        let vec = Matrix::new(range.len() as u32, 1)?;
        if slot < slot_vecs.len() {
            slot_vecs[slot] = vec;
        } else {
            slot_vecs.push(vec);
        }
    }

    let mask = mask_of(params.log_query_q());

    ranges
        .into_par_iter()
        .zip(query_vecs.into_par_iter())
        .zip(slot_vecs.par_iter_mut())
        .try_for_each(|((range, query_vec), slot_vec)| {
            let slot_out = slot_vec.elems_mut();

            data.squished_rows_x_vector(range, query_vec, info.basis(), info.squishing(), slot_out)?;
            slot_out.iter_mut().for_each(|v| *v &= mask);

            Ok::<(), GulliverPIRError>(())
        })?;

    debug!(rows, num_slots = queries.len(), "answered batch");
    Ok(())
}

/// Brings a squished database back to its centered layout, so that it can be set up again.
pub fn reset(db: &mut Database, _params: &Params) -> Result<(), GulliverPIRError> {
    db.unsquish()
}
