#![cfg(test)]

use crate::{
    ErrorKind, GulliverPIRError,
    batch::{batch_size, run_round},
    database::{Database, DatabaseLayout},
    params::{ParameterPolicy, Params, pick_params_for_records},
    pir::{BatchOfMsg, GulliverPIR, Msg, PIR},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn generate_random_records(rng: &mut ChaCha8Rng, num_records: usize, record_bits: usize) -> Vec<u64> {
    (0..num_records)
        .map(|_| if record_bits == u64::BITS as usize { rng.random::<u64>() } else { rng.random::<u64>() >> (u64::BITS as usize - record_bits) })
        .collect()
}

/// Sets up the database once, then issues many independent single-query rounds against it.
fn query_many_indices(db: &mut Database, params: &Params, indices: &[usize]) {
    let pir = GulliverPIR;
    let info = *db.info();

    let expected = indices.iter().map(|&i| db.get_elem(i).expect("Record must be decodable")).collect::<Vec<u64>>();

    let shared = pir.init(&info, params).expect("Shared state generation failed");
    let (server, offline) = pir.setup(db, &shared, params).expect("Server setup failed");

    for (&index, &value) in indices.iter().zip(expected.iter()) {
        let (client, query) = pir.query(index, &shared, params, &info).expect("Client query failed");

        let batch = BatchOfMsg::new(vec![query.clone()]);
        let answer = pir.answer(db, &batch, &server, &shared, params).expect("Server can't answer");
        let recovered = pir
            .recover(index, 0, &offline, &query, &answer, &shared, &client, params, &info)
            .expect("Client can't recover record");

        assert_eq!(recovered, value, "Record at index {} recovered incorrectly", index);
    }

    pir.reset(db, params).expect("Database reset failed");
}

#[test]
fn test_pir_over_million_one_bit_records() {
    const NUM_RECORDS: usize = 1usize << 20;
    const RECORD_BITS: usize = 1;
    const NUM_QUERIED_INDICES: usize = 32;

    init_logging();
    let mut rng = ChaCha8Rng::from_os_rng();

    let params = pick_params_for_records(1024, NUM_RECORDS, RECORD_BITS, 32, 28, ParameterPolicy::Table).expect("Parameter selection failed");
    let mut db = Database::make_random_db(NUM_RECORDS, RECORD_BITS, &params, &mut rng).expect("Database generation failed");
    let orig_db = db.clone();

    let mut indices = vec![0, NUM_RECORDS - 1];
    indices.extend((0..NUM_QUERIED_INDICES).map(|_| rng.random_range(0..NUM_RECORDS)));

    query_many_indices(&mut db, &params, &indices);
    assert_eq!(db, orig_db);
}

#[test]
fn test_pir_round_over_small_databases() {
    init_logging();

    let values = [1u64, 2, 3, 4];

    // (record bits, l, m, p): expanded over two rows, packed two per element, expanded over three rows.
    for (record_bits, l, m, p) in [(9usize, 2usize, 4usize, 1u64 << 8), (3, 1, 2, 1 << 8), (12, 3, 4, 1 << 4)] {
        let params = Params::custom(1024, 8, l, m, 32, 28, p).unwrap();
        let mut db = Database::make_db(values.len(), record_bits, &params, &values).unwrap();

        for (index, &value) in values.iter().enumerate() {
            let report = run_round(&GulliverPIR, &mut db, &params, &[index]).expect("PIR round failed");

            assert_eq!(report.indices, vec![index]);
            assert_eq!(report.values, vec![value]);
            assert_eq!(db.layout(), DatabaseLayout::Centered);
        }
    }
}

#[test]
fn test_pir_over_single_record_database() {
    init_logging();

    let params = Params::custom(1024, 8, 1, 1, 32, 28, 1 << 8).unwrap();
    let mut db = Database::make_db(1, 8, &params, &[0xa5]).unwrap();

    let report = run_round(&GulliverPIR, &mut db, &params, &[0]).expect("PIR round failed");
    assert_eq!(report.values, vec![0xa5]);
}

#[test]
fn test_batched_pir_round() {
    const NUM_RECORDS: usize = 1usize << 16;
    const RECORD_BITS: usize = 8;
    const NUM_QUERIES: usize = 4;

    init_logging();
    let mut rng = ChaCha8Rng::from_os_rng();

    let params = pick_params_for_records(1024, NUM_RECORDS, RECORD_BITS, 32, 28, ParameterPolicy::Table).unwrap();
    let records = generate_random_records(&mut rng, NUM_RECORDS, RECORD_BITS);
    let mut db = Database::make_db(NUM_RECORDS, RECORD_BITS, &params, &records).unwrap();

    let bsize = batch_size(db.info(), params.l(), params.m(), NUM_QUERIES).unwrap();
    let indices = (0..NUM_QUERIES).map(|_| rng.random_range(0..bsize)).collect::<Vec<usize>>();

    let report = run_round(&GulliverPIR, &mut db, &params, &indices).expect("Batched PIR round failed");

    assert_eq!(report.values.len(), NUM_QUERIES);
    for (slot, (&remapped, &value)) in report.indices.iter().zip(report.values.iter()).enumerate() {
        assert_eq!(remapped, indices[slot] + slot * bsize);
        assert_eq!(value, records[remapped]);
    }

    assert_eq!(report.bandwidth.online_download_kib, (params.l() * params.log_query_q() as usize) as f64 / 8192.0);
    assert!(report.bandwidth.total_kib() > report.bandwidth.offline_download_kib);
}

#[test]
fn test_pir_over_wide_records() {
    const NUM_RECORDS: usize = 1usize << 12;
    const NUM_QUERIES: usize = 2;

    init_logging();
    let mut rng = ChaCha8Rng::from_os_rng();

    for record_bits in [17usize, 64] {
        let params = pick_params_for_records(1024, NUM_RECORDS, record_bits, 32, 28, ParameterPolicy::Table).unwrap();
        let records = generate_random_records(&mut rng, NUM_RECORDS, record_bits);
        let mut db = Database::make_db(NUM_RECORDS, record_bits, &params, &records).unwrap();
        assert!(db.info().ne() > 1);

        let bsize = batch_size(db.info(), params.l(), params.m(), NUM_QUERIES).unwrap();
        let indices = [0, bsize - 1];

        let report = run_round(&GulliverPIR, &mut db, &params, &indices).expect("PIR round failed");
        assert_eq!(report.values, report.indices.iter().map(|&i| records[i]).collect::<Vec<u64>>());
    }
}

#[test]
fn test_pir_with_estimated_params() {
    const NUM_RECORDS: usize = 1usize << 12;
    const RECORD_BITS: usize = 4;

    init_logging();
    let mut rng = ChaCha8Rng::from_os_rng();

    let params = pick_params_for_records(1024, NUM_RECORDS, RECORD_BITS, 32, 28, ParameterPolicy::Estimate).unwrap();
    let records = generate_random_records(&mut rng, NUM_RECORDS, RECORD_BITS);
    let mut db = Database::make_db(NUM_RECORDS, RECORD_BITS, &params, &records).unwrap();

    let indices = (0..16).map(|_| rng.random_range(0..NUM_RECORDS)).collect::<Vec<usize>>();
    query_many_indices(&mut db, &params, &indices);
}

#[test]
fn test_repeated_rounds_leave_database_intact() {
    init_logging();
    let mut rng = ChaCha8Rng::from_os_rng();

    let params = pick_params_for_records(1024, 1 << 10, 8, 32, 28, ParameterPolicy::Table).unwrap();
    let mut db = Database::make_random_db(1 << 10, 8, &params, &mut rng).unwrap();
    let orig_db = db.clone();

    for _ in 0..3 {
        let index = rng.random_range(0..1 << 10);
        let report = run_round(&GulliverPIR, &mut db, &params, &[index]).expect("PIR round failed");

        assert_eq!(report.values, vec![orig_db.get_elem(index).unwrap()]);
        assert_eq!(db, orig_db);
    }
}

#[test]
fn test_protocol_misuse_is_reported() {
    let pir = GulliverPIR;

    let params = Params::custom(1024, 8, 4, 4, 32, 28, 1 << 8).unwrap();
    let mut db = Database::make_db(16, 8, &params, &(0..16).collect::<Vec<u64>>()).unwrap();
    let info = *db.info();

    let shared = pir.init(&info, &params).unwrap();
    let (_, query) = pir.query(5, &shared, &params, &info).unwrap();
    let batch = BatchOfMsg::new(vec![query.clone()]);

    // Answering before setup.
    let err = pir.answer(&db, &batch, &Default::default(), &shared, &params).unwrap_err();
    assert_eq!(err, GulliverPIRError::DatabaseNotSquished);
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let (server, offline) = pir.setup(&mut db, &shared, &params).unwrap();

    // Setting up twice.
    assert_eq!(pir.setup(&mut db, &shared, &params), Err(GulliverPIRError::DatabaseNotCentered));

    // More queries than rows.
    let oversized = BatchOfMsg::new(vec![query.clone(); 5]);
    let err = pir.answer(&db, &oversized, &server, &shared, &params).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BatchOverflow);

    // Empty batch.
    assert_eq!(
        pir.answer(&db, &BatchOfMsg::default(), &server, &shared, &params),
        Err(GulliverPIRError::EmptyQueryBatch)
    );

    let answer = pir.answer(&db, &batch, &server, &shared, &params).unwrap();
    let (client, _) = pir.query(5, &shared, &params, &info).unwrap();

    // Batch slot beyond what the answer holds.
    let err = pir.recover(5, 4, &offline, &query, &answer, &shared, &client, &params, &info).unwrap_err();
    assert_eq!(err, GulliverPIRError::BatchSlotOutOfRange { slot: 4, num_slots: 1 });
    assert_eq!(err.kind(), ErrorKind::Range);

    // Querying past the last record.
    let err = pir.query(16, &shared, &params, &info).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);

    pir.reset(&mut db, &params).unwrap();
    assert_eq!(pir.reset(&mut db, &params), Err(GulliverPIRError::DatabaseNotSquished));
    assert_eq!(db.get_elem(5), Ok(5));
}

#[test]
fn test_recovery_is_bound_to_batch_slot() {
    let pir = GulliverPIR;

    let params = Params::custom(1024, 8, 4, 4, 32, 28, 1 << 8).unwrap();
    let records = (0..16).map(|v| v + 7).collect::<Vec<u64>>();
    let mut db = Database::make_db(16, 8, &params, &records).unwrap();
    let info = *db.info();

    let shared = pir.init(&info, &params).unwrap();
    let (server, offline) = pir.setup(&mut db, &shared, &params).unwrap();

    // Record 1 lives in rows of slot 0, record 9 in rows of slot 1.
    let (client0, query0) = pir.query(1, &shared, &params, &info).unwrap();
    let (client1, query1) = pir.query(9, &shared, &params, &info).unwrap();

    let batch = BatchOfMsg::new(vec![query0.clone(), query1.clone()]);
    let answer = pir.answer(&db, &batch, &server, &shared, &params).unwrap();

    assert_eq!(answer.matrices().len(), 2);
    assert!(answer.matrices().iter().all(|vec| vec.num_rows() == 2 && vec.num_cols() == 1));

    assert_eq!(pir.recover(1, 0, &offline, &query0, &answer, &shared, &client0, &params, &info), Ok(8));
    assert_eq!(pir.recover(9, 1, &offline, &query1, &answer, &shared, &client1, &params, &info), Ok(16));

    // Rows of record 1 were multiplied with the query of slot 0, not slot 1.
    let err = pir.recover(1, 1, &offline, &query1, &answer, &shared, &client1, &params, &info).unwrap_err();
    assert_eq!(err, GulliverPIRError::RecordNotInBatchSlot { index: 1, slot: 1 });
    assert_eq!(err.kind(), ErrorKind::Range);

    let err = pir.recover(9, 0, &offline, &query0, &answer, &shared, &client0, &params, &info).unwrap_err();
    assert_eq!(err, GulliverPIRError::RecordNotInBatchSlot { index: 9, slot: 0 });

    pir.reset(&mut db, &params).unwrap();
}

#[test]
fn test_answer_buffers_are_reused() {
    let pir = GulliverPIR;

    let params = Params::custom(1024, 8, 4, 4, 32, 28, 1 << 8).unwrap();
    let records = (0..16).collect::<Vec<u64>>();
    let mut db = Database::make_db(16, 8, &params, &records).unwrap();
    let info = *db.info();

    let shared = pir.init(&info, &params).unwrap();
    let (server, offline) = pir.setup(&mut db, &shared, &params).unwrap();

    let mut answer = Msg::default();
    for (index, num_queries) in [(3usize, 1usize), (6, 1), (2, 2), (12, 4)] {
        let (client, query) = pir.query(index, &shared, &params, &info).unwrap();
        let slot = index / (16 / num_queries);

        // Other slots get queries for records of their own, only `slot` is decoded.
        let mut batch = BatchOfMsg::default();
        for i in 0..num_queries {
            if i == slot {
                batch.push(query.clone());
            } else {
                batch.push(pir.query(i * (16 / num_queries), &shared, &params, &info).unwrap().1);
            }
        }

        pir.answer_into(&db, &batch, &server, &shared, &params, &mut answer).unwrap();
        assert_eq!(answer, pir.answer(&db, &batch, &server, &shared, &params).unwrap());
        assert_eq!(answer.matrices().len(), num_queries);

        let recovered = pir.recover(index, slot, &offline, &query, &answer, &shared, &client, &params, &info);
        assert_eq!(recovered, Ok(records[index]));
    }

    pir.reset(&mut db, &params).unwrap();
}

#[test]
fn test_round_rejects_indices_beyond_database() {
    let params = Params::custom(1024, 8, 4, 4, 32, 28, 1 << 8).unwrap();
    let mut db = Database::make_db(10, 8, &params, &(0..10).collect::<Vec<u64>>()).unwrap();

    // Two slots of 8 records each, but only 10 records present.
    assert_eq!(
        run_round(&GulliverPIR, &mut db, &params, &[1, 7]),
        Err(GulliverPIRError::IndexOutOfRange { index: 15, num_records: 10 })
    );
    assert_eq!(
        run_round(&GulliverPIR, &mut db, &params, &[8, 0]),
        Err(GulliverPIRError::IndexOutOfRange { index: 8, num_records: 8 })
    );
    assert_eq!(
        run_round(&GulliverPIR, &mut db, &params, &[0; 5]).map_err(|e| e.kind()),
        Err(ErrorKind::BatchOverflow)
    );
    assert_eq!(db.layout(), DatabaseLayout::Centered);
}
