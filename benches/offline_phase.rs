use divan;
use gulliver_pir::{
    database::Database,
    params::{ParameterPolicy, pick_params_for_records},
    pir::{GulliverPIR, PIR},
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

#[divan::bench(args = ARGS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn pir_init(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();

    let params = pick_params_for_records(1024, db_config.num_records, db_config.record_bits, 32, 28, ParameterPolicy::Table).unwrap();
    let db = Database::make_random_db(db_config.num_records, db_config.record_bits, &params, &mut rng).unwrap();

    bencher.bench(|| GulliverPIR.init(divan::black_box(db.info()), divan::black_box(&params)));
}

#[divan::bench(args = ARGS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn server_setup(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();

    let params = pick_params_for_records(1024, db_config.num_records, db_config.record_bits, 32, 28, ParameterPolicy::Table).unwrap();
    let db = Database::make_random_db(db_config.num_records, db_config.record_bits, &params, &mut rng).unwrap();
    let shared = GulliverPIR.init(db.info(), &params).unwrap();

    bencher
        .with_inputs(|| db.clone())
        .bench_refs(|db| GulliverPIR.setup(divan::black_box(db), divan::black_box(&shared), divan::black_box(&params)));
}

#[divan::bench(args = ARGS, max_time = Duration::from_secs(300), skip_ext_time = true)]
fn server_reset(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();

    let params = pick_params_for_records(1024, db_config.num_records, db_config.record_bits, 32, 28, ParameterPolicy::Table).unwrap();
    let mut db = Database::make_random_db(db_config.num_records, db_config.record_bits, &params, &mut rng).unwrap();
    db.squish().unwrap();

    bencher
        .with_inputs(|| db.clone())
        .bench_refs(|db| GulliverPIR.reset(divan::black_box(db), divan::black_box(&params)));
}
