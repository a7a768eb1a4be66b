//! Property-based tests for the key codec and the set layers.
//!
//! These tests check:
//!
//! 1. **Ordering**: encoded keys, scores and scored elements sort like their inputs
//! 2. **Model equivalence**: a ranked set answers rank queries like a `BTreeSet`
//! 3. **Index consistency**: every bucket count matches the elements it covers
//! 4. **Scored order**: a scored set lists elements by (score, key) like a sorted model

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use proptest::prelude::*;
use tally_kv::Database;
use tally_kv::MemoryDatabase;
use tally_kv::Transaction;

use crate::RankedSet;
use crate::RankedSetConfig;
use crate::ScoredSet;
use crate::Subspace;
use crate::codec::decode_key_exact;
use crate::codec::decode_scored;
use crate::codec::encode_key;
use crate::codec::encode_score;
use crate::codec::encode_scored;

// =============================================================================
// Strategies
// =============================================================================

/// Keys drawn from a small alphabet so operations collide often.
fn arb_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop_oneof![Just(0u8), Just(1u8), Just(b'a'), Just(b'b'), Just(0xFF)], 0..4)
}

#[derive(Debug, Clone)]
enum SetOp {
    Insert(Vec<u8>),
    Remove(Vec<u8>),
}

fn arb_set_op() -> impl Strategy<Value = SetOp> {
    prop_oneof![
        3 => arb_key().prop_map(SetOp::Insert),
        1 => arb_key().prop_map(SetOp::Remove),
    ]
}

/// Small geometry so that a few dozen elements already reach upper levels.
fn dense_config() -> RankedSetConfig {
    RankedSetConfig {
        levels: 4,
        level_fan_pow: 1,
        ..RankedSetConfig::default()
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build test runtime")
        .block_on(future)
}

// =============================================================================
// Codec properties
// =============================================================================

proptest! {
    #[test]
    fn prop_key_encoding_preserves_order(a in prop::collection::vec(any::<u8>(), 0..8), b in prop::collection::vec(any::<u8>(), 0..8)) {
        prop_assert_eq!(a.cmp(&b), encode_key(&a).cmp(&encode_key(&b)));
        prop_assert_eq!(decode_key_exact(&encode_key(&a)).unwrap(), a);
    }

    #[test]
    fn prop_score_encoding_preserves_order(a in any::<i64>(), b in any::<i64>()) {
        prop_assert_eq!(a.cmp(&b), encode_score(a).cmp(&encode_score(b)));
    }

    #[test]
    fn prop_scored_elements_sort_by_score_then_key(
        a in (any::<i64>(), arb_key()),
        b in (any::<i64>(), arb_key()),
    ) {
        let ea = encode_scored(&a.1, a.0);
        let eb = encode_scored(&b.1, b.0);
        prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        prop_assert_eq!(decode_scored(&ea).unwrap(), (a.1, a.0));
    }
}

// =============================================================================
// Set properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: after any sequence of inserts and removes, ranks, lookups
    /// and the index all agree with a `BTreeSet` model.
    #[test]
    fn prop_ranked_set_matches_model(ops in prop::collection::vec(arb_set_op(), 1..60)) {
        let result: Result<(), TestCaseError> = block_on(async {
            let db = MemoryDatabase::new();
            let set = RankedSet::new(Subspace::named(b"prop"), dense_config()).unwrap();
            let tr = db.begin_transaction().unwrap();
            set.initialize(&tr).await.unwrap();

            let mut model = BTreeSet::new();
            for op in &ops {
                match op {
                    SetOp::Insert(key) => {
                        let outcome = set.insert(&tr, key).await;
                        prop_assert_eq!(outcome.is_ok(), model.insert(key.clone()));
                    }
                    SetOp::Remove(key) => {
                        let outcome = set.remove(&tr, key).await;
                        prop_assert_eq!(outcome.is_ok(), model.remove(key));
                    }
                }
            }

            prop_assert_eq!(set.verify(&tr).await.unwrap(), model.len() as u64);
            prop_assert_eq!(set.size(&tr).await.unwrap(), model.len() as u64);
            for (rank, key) in model.iter().enumerate() {
                prop_assert_eq!(set.rank(&tr, key).await.unwrap(), rank as u64);
                let found = set.key_at_rank(&tr, rank as i64).await.unwrap();
                prop_assert_eq!(&found, key);
            }
            prop_assert!(set.key_at_rank(&tr, model.len() as i64).await.is_err());
            Ok(())
        });
        result?;
    }

    /// Property: the same history committed one operation per transaction
    /// yields the same index as one big transaction.
    #[test]
    fn prop_ranked_set_across_commits(keys in prop::collection::vec(arb_key(), 1..24)) {
        let result: Result<(), TestCaseError> = block_on(async {
            let db = MemoryDatabase::new();
            let set = RankedSet::new(Subspace::named(b"prop"), dense_config()).unwrap();
            let tr = db.begin_transaction().unwrap();
            set.initialize(&tr).await.unwrap();
            tr.commit().await.unwrap();

            let mut model = BTreeSet::new();
            for key in &keys {
                let tr = db.begin_transaction().unwrap();
                if model.insert(key.clone()) {
                    set.insert(&tr, key).await.unwrap();
                } else {
                    set.remove(&tr, key).await.unwrap();
                    model.remove(key);
                }
                tr.commit().await.unwrap();
            }

            let tr = db.begin_transaction().unwrap();
            prop_assert_eq!(set.verify(&tr).await.unwrap(), model.len() as u64);
            let listed = set.range(&tr, b"", None, 1000).await.unwrap();
            prop_assert_eq!(listed, model.into_iter().collect::<Vec<_>>());
            Ok(())
        });
        result?;
    }

    /// Property: scored set listing and ranks follow (score, key) order.
    #[test]
    fn prop_scored_set_matches_model(entries in prop::collection::vec((arb_key(), -5i64..5), 1..40)) {
        let result: Result<(), TestCaseError> = block_on(async {
            let db = MemoryDatabase::new();
            let set = ScoredSet::new(Subspace::named(b"scored"), dense_config()).unwrap();
            let tr = db.begin_transaction().unwrap();
            set.initialize(&tr).await.unwrap();

            let mut model: BTreeMap<Vec<u8>, i64> = BTreeMap::new();
            for (key, score) in &entries {
                let previous = set.insert(&tr, key, *score).await.unwrap();
                prop_assert_eq!(previous, model.insert(key.clone(), *score));
            }

            let mut ordered: Vec<(i64, Vec<u8>)> = model.iter().map(|(k, s)| (*s, k.clone())).collect();
            ordered.sort();

            let listed = set.range_by_score(&tr, i64::MIN, i64::MAX).await.unwrap();
            let listed: Vec<(i64, Vec<u8>)> = listed.into_iter().map(|e| (e.score, e.key)).collect();
            prop_assert_eq!(&listed, &ordered);

            for (rank, (score, key)) in ordered.iter().enumerate() {
                prop_assert_eq!(set.rank(&tr, key).await.unwrap(), rank as u64);
                let below = ordered.iter().filter(|(s, _)| s < score).count() as u64;
                prop_assert_eq!(set.rank_by_score(&tr, *score).await.unwrap(), below);
            }
            let in_band = ordered.iter().filter(|(s, _)| (-2..=2).contains(s)).count() as u64;
            prop_assert_eq!(set.count_by_score(&tr, -2, 2).await.unwrap(), in_band);
            Ok(())
        });
        result?;
    }
}
