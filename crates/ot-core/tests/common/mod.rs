//! Shared operations and helpers for the integration tests.

#![allow(dead_code)]

#[path = "../../src/fixtures.rs"]
mod fixtures;

pub use fixtures::*;

use ot_core::OtOperation;
use std::cmp::Ordering;

/// Ids later in lexicographic order are nearer to the heads.
pub fn commit_id_cmp(a: &String, b: &String) -> Ordering {
    b.cmp(a)
}

pub fn apply_all(state: i64, ops: &[CounterOp]) -> i64 {
    ops.iter()
        .fold(state, |state, op| op.apply(state).expect("counter ops never fail"))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
