//! Property-based tests for the in-memory store.
//!
//! A `BTreeMap` model receives the same writes as a transaction. Reads through
//! the transaction (read-your-writes) and through a fresh transaction after
//! commit must both match the model, in either direction and at any limit.

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::memory::MemoryDatabase;
use crate::traits::Database;
use crate::traits::Transaction;
use crate::types::RangeOptions;

#[derive(Debug, Clone)]
enum Op {
    Set(Vec<u8>, Vec<u8>),
    Clear(Vec<u8>),
    ClearRange(Vec<u8>, Vec<u8>),
    Add(Vec<u8>, i64),
}

fn arb_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop_oneof![Just(0u8), Just(b'a'), Just(b'b'), Just(0xFF)], 1..3)
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (arb_key(), prop::collection::vec(any::<u8>(), 0..4)).prop_map(|(k, v)| Op::Set(k, v)),
        1 => arb_key().prop_map(Op::Clear),
        1 => (arb_key(), arb_key()).prop_map(|(a, b)| Op::ClearRange(a, b)),
        2 => (arb_key(), -3i64..4).prop_map(|(k, d)| Op::Add(k, d)),
    ]
}

fn apply_to_model(model: &mut BTreeMap<Vec<u8>, Vec<u8>>, op: &Op) {
    match op {
        Op::Set(k, v) => {
            model.insert(k.clone(), v.clone());
        }
        Op::Clear(k) => {
            model.remove(k);
        }
        Op::ClearRange(a, b) => {
            if a < b {
                model.retain(|k, _| k < a || k >= b);
            }
        }
        Op::Add(k, d) => {
            let mut current = [0u8; 8];
            if let Some(existing) = model.get(k) {
                let n = existing.len().min(8);
                current[..n].copy_from_slice(&existing[..n]);
            }
            let sum = i64::from_le_bytes(current).wrapping_add(*d);
            model.insert(k.clone(), sum.to_le_bytes().to_vec());
        }
    }
}

fn apply_to_tr<T: Transaction>(tr: &T, op: &Op) {
    match op {
        Op::Set(k, v) => tr.set(k, v),
        Op::Clear(k) => tr.clear(k),
        Op::ClearRange(a, b) => tr.clear_range(a, b),
        Op::Add(k, d) => tr.atomic_add(k, *d),
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build test runtime")
        .block_on(future)
}

async fn read_all<T: Transaction>(tr: &T, reverse: bool, limit: u32) -> Vec<(Vec<u8>, Vec<u8>)> {
    let options = RangeOptions::default().with_limit(limit).reversed(reverse);
    let result = tr.get_range(b"", b"\xff\xff\xff", options).await.unwrap();
    result.entries.into_iter().map(|kv| (kv.key, kv.value)).collect()
}

fn expected(model: &BTreeMap<Vec<u8>, Vec<u8>>, reverse: bool, limit: u32) -> Vec<(Vec<u8>, Vec<u8>)> {
    let entries = model.iter().map(|(k, v)| (k.clone(), v.clone()));
    if reverse {
        entries.rev().take(limit as usize).collect()
    } else {
        entries.take(limit as usize).collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_reads_match_model(
        committed in prop::collection::vec(arb_op(), 0..20),
        pending in prop::collection::vec(arb_op(), 0..20),
        reverse in any::<bool>(),
        limit in 1u32..12,
    ) {
        let result: Result<(), TestCaseError> = block_on(async {
            let db = MemoryDatabase::new();
            let mut model = BTreeMap::new();

            let tr = db.begin_transaction().unwrap();
            for op in &committed {
                apply_to_tr(&tr, op);
                apply_to_model(&mut model, op);
            }
            tr.commit().await.unwrap();

            // Buffered writes on top of committed state.
            let tr = db.begin_transaction().unwrap();
            for op in &pending {
                apply_to_tr(&tr, op);
                apply_to_model(&mut model, op);
            }
            prop_assert_eq!(read_all(&tr, reverse, limit).await, expected(&model, reverse, limit));
            for key in model.keys() {
                let got = tr.get(key).await.unwrap();
                prop_assert_eq!(got.as_ref(), model.get(key));
            }
            tr.commit().await.unwrap();

            let tr = db.begin_transaction().unwrap();
            prop_assert_eq!(read_all(&tr, reverse, limit).await, expected(&model, reverse, limit));
            Ok(())
        });
        result?;
    }
}
