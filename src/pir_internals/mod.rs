pub mod arith;
pub mod branch_opt_util;
pub mod error;
pub mod lwr_table;
pub mod matrix;
pub mod params;
