use divan;
use gulliver_pir::{
    batch::{batch_size, remap_index},
    database::Database,
    params::{ParameterPolicy, Params, pick_params_for_records},
    pir::{BatchOfMsg, ClientState, GulliverPIR, Msg, PIR, ServerState, SharedState},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

fn main() {
    divan::main();
}

#[derive(Debug)]
struct DBConfig {
    num_records: usize,
    record_bits: usize,
}

const ARGS: &[DBConfig] = &[
    DBConfig {
        num_records: 1usize << 16,
        record_bits: 1,
    },
    DBConfig {
        num_records: 1usize << 16,
        record_bits: 64,
    },
    DBConfig {
        num_records: 1usize << 20,
        record_bits: 1,
    },
];
const BATCH_SIZES: [usize; 2] = [1, 4];

struct Prepared {
    params: Params,
    db: Database,
    shared: SharedState,
    server: ServerState,
    offline: Msg,
    indices: Vec<usize>,
    client_states: Vec<ClientState>,
    queries: BatchOfMsg,
}

fn prepare(db_config: &DBConfig, num_queries: usize) -> Prepared {
    let mut rng = ChaCha8Rng::from_os_rng();

    let params = pick_params_for_records(1024, db_config.num_records, db_config.record_bits, 32, 28, ParameterPolicy::Table).unwrap();
    let mut db = Database::make_random_db(db_config.num_records, db_config.record_bits, &params, &mut rng).unwrap();
    let info = *db.info();

    let shared = GulliverPIR.init(&info, &params).unwrap();
    let (server, offline) = GulliverPIR.setup(&mut db, &shared, &params).unwrap();

    let bsize = batch_size(&info, params.l(), params.m(), num_queries).unwrap();
    let indices = (0..num_queries)
        .map(|slot| {
            // Last slot may hold fewer records than its rows could.
            let num_slot_records = bsize.min(db_config.num_records.saturating_sub(slot * bsize)).max(1);
            remap_index(rng.random_range(0..num_slot_records), slot, bsize).unwrap()
        })
        .collect::<Vec<usize>>();

    let (client_states, queries): (Vec<ClientState>, Vec<Msg>) = indices.iter().map(|&i| GulliverPIR.query(i, &shared, &params, &info).unwrap()).unzip();

    Prepared {
        params,
        db,
        shared,
        server,
        offline,
        indices,
        client_states,
        queries: BatchOfMsg::new(queries),
    }
}

#[divan::bench(args = ARGS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn client_query(bencher: divan::Bencher, db_config: &DBConfig) {
    let prep = prepare(db_config, 1);
    let info = *prep.db.info();

    bencher.bench(|| {
        GulliverPIR.query(
            divan::black_box(prep.indices[0]),
            divan::black_box(&prep.shared),
            divan::black_box(&prep.params),
            divan::black_box(&info),
        )
    });
}

#[divan::bench(args = ARGS, consts = BATCH_SIZES, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn server_answer<const NUM_QUERIES: usize>(bencher: divan::Bencher, db_config: &DBConfig) {
    let prep = prepare(db_config, NUM_QUERIES);
    let mut answer = Msg::default();

    bencher.bench_local(|| {
        GulliverPIR.answer_into(
            divan::black_box(&prep.db),
            divan::black_box(&prep.queries),
            divan::black_box(&prep.server),
            divan::black_box(&prep.shared),
            divan::black_box(&prep.params),
            divan::black_box(&mut answer),
        )
    });
}

#[divan::bench(args = ARGS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn client_recover(bencher: divan::Bencher, db_config: &DBConfig) {
    let prep = prepare(db_config, 1);
    let info = *prep.db.info();
    let answer = GulliverPIR
        .answer(&prep.db, &prep.queries, &prep.server, &prep.shared, &prep.params)
        .unwrap();

    bencher.bench(|| {
        GulliverPIR.recover(
            divan::black_box(prep.indices[0]),
            divan::black_box(0),
            divan::black_box(&prep.offline),
            divan::black_box(&prep.queries.msgs()[0]),
            divan::black_box(&answer),
            divan::black_box(&prep.shared),
            divan::black_box(&prep.client_states[0]),
            divan::black_box(&prep.params),
            divan::black_box(&info),
        )
    });
}
