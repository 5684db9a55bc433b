// HashMap property tests through the public API.
//
// Property 1: equivalence with std's HashMap for string keys.
//  - Model: std HashMap<String, i64>.
//  - Operations: insert, remove, get, get_mut, clear, extend.
//  - Invariant: every return value matches the model; len matches;
//    a full iteration yields the model's entries.
//
// Property 2: handles stay valid for exactly the life of their entry.
//  - Model: live handles per key and a list of handles whose entry
//    was removed.
//  - Invariant: live handles resolve to the model's key and value across
//    any number of growths; stale handles never resolve.
use incr_hashmap::{Handle, HashMap};
use proptest::prelude::*;
use std::collections::HashMap as StdHashMap;

#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i64),
    Remove(usize),
    Get(usize),
    Bump(usize),
    Clear,
    Extend(Vec<(usize, i64)>),
}

fn arb_op(keys: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (0..keys, any::<i64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        4 => (0..keys).prop_map(Op::Remove),
        3 => (0..keys).prop_map(Op::Get),
        2 => (0..keys).prop_map(Op::Bump),
        1 => Just(Op::Clear),
        1 => proptest::collection::vec((0..keys, any::<i64>()), 0..40).prop_map(Op::Extend),
    ]
}

fn key(k: usize) -> String {
    format!("key-{k}")
}

// Property 1: std equivalence.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_matches_std(ops in proptest::collection::vec(arb_op(300), 1..300)) {
        let mut sut: HashMap<String, i64> = HashMap::new();
        let mut model: StdHashMap<String, i64> = StdHashMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    prop_assert_eq!(sut.insert(key(k), v), model.insert(key(k), v));
                }
                Op::Remove(k) => {
                    prop_assert_eq!(sut.remove(&key(k)), model.remove(&key(k)));
                }
                Op::Get(k) => {
                    prop_assert_eq!(sut.get(&key(k)), model.get(&key(k)));
                    prop_assert_eq!(sut.contains_key(&key(k)), model.contains_key(&key(k)));
                }
                Op::Bump(k) => {
                    if let Some(v) = sut.get_mut(&key(k)) {
                        *v = v.wrapping_add(1);
                    }
                    if let Some(v) = model.get_mut(&key(k)) {
                        *v = v.wrapping_add(1);
                    }
                }
                Op::Clear => {
                    sut.clear();
                    model.clear();
                }
                Op::Extend(pairs) => {
                    sut.extend(pairs.iter().map(|(k, v)| (key(*k), *v)));
                    model.extend(pairs.iter().map(|(k, v)| (key(*k), *v)));
                }
            }
            prop_assert_eq!(sut.len(), model.len());
        }

        let seen: StdHashMap<String, i64> =
            sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(seen, model);
    }
}

// Property 2: handle validity.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_handles_track_entries(ops in proptest::collection::vec((0u8..3, 0usize..200, any::<i64>()), 1..400)) {
        let mut sut: HashMap<usize, i64> = HashMap::new();
        let mut live: StdHashMap<usize, (Handle, i64)> = StdHashMap::new();
        let mut stale: Vec<Handle> = Vec::new();

        for (op, k, v) in ops {
            match op {
                // Insert; an overwrite keeps the entry and its handle.
                0 => {
                    sut.insert(k, v);
                    let h = sut.find(&k).expect("just inserted");
                    if let Some((old, _)) = live.insert(k, (h, v)) {
                        prop_assert_eq!(old, h, "overwrite changed the handle");
                    }
                }
                // Remove invalidates the handle.
                1 => {
                    if let Some((h, _)) = live.remove(&k) {
                        prop_assert!(sut.remove(&k).is_some());
                        stale.push(h);
                    }
                }
                // Write through a handle.
                _ => {
                    if let Some((h, val)) = live.get_mut(&k) {
                        *h.value_mut(&mut sut).expect("live handle") = v;
                        *val = v;
                    }
                }
            }
        }

        for (k, (h, v)) in &live {
            prop_assert_eq!(h.key(&sut), Some(k));
            prop_assert_eq!(h.value(&sut), Some(v));
        }
        for h in &stale {
            prop_assert!(h.value(&sut).is_none());
        }
    }
}
