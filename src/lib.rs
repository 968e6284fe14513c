//! GulliverPIR: A Rust library implementation of a single-server **P**rivate **I**nformation **R**etrieval (PIR) protocol with
//! preprocessing, based on the Learning With Rounding (LWR) assumption.
//!
//! A server holds a database of fixed-width records. In an offline phase, independent of what will be queried, the client
//! downloads a hint. Afterwards each online query for a record index costs one vector upload and one vector download, and
//! the server learns nothing about which index was asked for.
//!
//! ## Features
//!
//! * **Any record width:** Records of 1 to 64 bits are packed, several to a plaintext element, or expanded over multiple rows.
//! * **Compressed database:** During the online phase the database is kept squished, three 10 -bit residues to a `u32`.
//! * **Batching:** A single answer serves several queries, each one targeting its own horizontal slice of the database.
//! * **Parameter selection:** From a precomputed LWR hardness table, or by closed form estimation.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! gulliver_pir = "=0.1.0"
//! ```
//!
//! ```rust
//! use gulliver_pir::{
//!     batch::run_round,
//!     database::Database,
//!     params::{ParameterPolicy, pick_params_for_records},
//!     pir::GulliverPIR,
//! };
//!
//! fn main() {
//!     let records = (0..1024u64).map(|i| i % 251).collect::<Vec<u64>>();
//!
//!     let params = pick_params_for_records(1024, records.len(), 8, 32, 28, ParameterPolicy::Table).expect("Parameter selection failed");
//!     let mut db = Database::make_db(records.len(), 8, &params, &records).expect("Database encoding failed");
//!
//!     // Offline phase, one query, recovery, reset and verification.
//!     let report = run_round(&GulliverPIR, &mut db, &params, &[42]).expect("PIR round failed");
//!     assert_eq!(report.values, vec![records[42]]);
//! }
//! ```
//!
//! ## Modules
//!
//! * `params`: Parameter selection.
//! * `database`: Encoding records into a matrix of residues and back.
//! * `pir`: The `PIR` trait, its `GulliverPIR` implementation and the messages/ states exchanged.
//! * `server`, `client`: Both sides of the protocol.
//! * `batch`: Splitting a database between simultaneous queries, and driving complete rounds.

pub use pir_internals::error::{ErrorKind, GulliverPIRError};
pub use pir_internals::matrix::Matrix;
pub use pir_internals::params::{SEED_BYTE_LEN, SQUISH_BASIS, SQUISH_DIGITS};

pub mod batch;
pub mod client;
pub mod database;
pub mod params;
pub mod pir;
pub mod server;

mod pir_internals;

mod test_pir;
