// HashMap integration suite.
//
// Each test documents the behavior verified and the invariants relied on.
// The core invariants exercised:
// - Retrieval: a key put and not deleted since is found with its value.
// - Growth: entries stay retrievable before, during and after growth;
//   mutation during growth behaves exactly as outside it.
// - Iteration: every live entry exactly once; order randomized per
//   traversal; cursors tolerate mutation between steps.
// - Clone and clear: independent copies, reusable cleared tables.
use incr_hashmap::{GrowthKind, HashMap, MapKey};
use std::collections::{HashMap as StdHashMap, HashSet};
use std::hash::{BuildHasher, Hasher};

// Test: bulk insert then delete half.
// Verifies: len tracking, overwrite-free inserts, deletes, and that a
// full iteration yields exactly the survivors with their values.
#[test]
fn thousand_keys_delete_half() {
    let mut m = HashMap::new();
    for k in 0..1000u32 {
        assert_eq!(m.insert(k, k * 2), None);
    }
    assert_eq!(m.len(), 1000);
    assert_eq!(m.get(&500), Some(&1000));
    for k in 0..500u32 {
        assert_eq!(m.remove(&k), Some(k * 2));
    }
    assert_eq!(m.len(), 500);
    assert_eq!(m.get(&250), None);

    let seen: StdHashMap<u32, u32> = m.iter().map(|(k, v)| (*k, *v)).collect();
    let expected: StdHashMap<u32, u32> = (500..1000).map(|k| (k, k * 2)).collect();
    assert_eq!(seen, expected);
}

// Test: more keys than one bucket holds, with no capacity hint.
// Verifies: overflow and first growth keep all nine keys.
#[test]
fn nine_keys_without_hint() {
    let mut m = HashMap::with_capacity(0);
    for k in 0..9u8 {
        m.insert(k, k);
    }
    for k in 0..9u8 {
        assert_eq!(m.get(&k), Some(&k));
    }
}

// Test: operations while a doubling growth is in flight.
// Assumes: `stats().growth` reports an unfinished growth.
// Verifies: get/put/delete on old and new keys stay correct at every
// step until the growth completes.
#[test]
fn operations_during_growth() {
    let mut m = HashMap::new();
    let mut model = StdHashMap::new();
    let mut next = 0u64;
    let mut fresh = 1u64 << 40;
    let mut growths_seen = 0;

    while growths_seen < 6 {
        m.insert(next, next);
        model.insert(next, next);
        next += 1;
        let Some(growth) = m.stats().growth else {
            continue;
        };
        if growth.kind != GrowthKind::Doubling {
            continue;
        }
        growths_seen += 1;

        // Interleave operations on pre-existing and new keys until done.
        let mut step = 0u64;
        while m.stats().growth.is_some() {
            let old_key = step % next;
            assert_eq!(m.get(&old_key), model.get(&old_key));
            if step % 3 == 0 {
                assert_eq!(m.remove(&old_key), model.remove(&old_key));
            } else {
                assert_eq!(m.insert(old_key, step), model.insert(old_key, step));
            }
            assert_eq!(m.insert(fresh, step), None);
            model.insert(fresh, step);
            fresh += 1;
            step += 1;
        }
        assert_eq!(m.len(), model.len());
        for (k, v) in &model {
            assert_eq!(m.get(k), Some(v));
        }
    }
}

// Test: growth preserves values.
// Verifies: around every insert that starts a growth, all previously
// retrievable keys remain so with unchanged values.
#[test]
fn growth_preserves_entries() {
    let mut m = HashMap::new();
    for k in 0..5_000u32 {
        let was_growing = m.stats().growth.is_some();
        m.insert(k, k.wrapping_mul(31));
        if !was_growing && m.stats().growth.is_some() {
            for j in 0..=k {
                assert_eq!(m.get(&j), Some(&j.wrapping_mul(31)));
            }
        }
    }
}

// Test: delete then re-insert.
#[test]
fn delete_then_reinsert() {
    let mut m = HashMap::new();
    m.insert("k".to_string(), 1);
    assert_eq!(m.remove("k"), Some(1));
    assert_eq!(m.get("k"), None);
    assert_eq!(m.insert("k".to_string(), 2), None);
    assert_eq!(m.get("k"), Some(&2));
}

// Test: clear on tables of different sizes.
// Verifies: len 0, prior keys gone, bucket count kept, inserts work.
#[test]
fn clear_resets() {
    for n in [0u32, 1, 8, 9, 100, 3_000] {
        let mut m = HashMap::new();
        for k in 0..n {
            m.insert(k, k);
        }
        let log2 = m.stats().log2_buckets;
        m.clear();
        assert_eq!(m.len(), 0);
        assert!(m.stats().growth.is_none());
        assert_eq!(m.stats().log2_buckets, log2);
        for k in 0..n {
            assert_eq!(m.get(&k), None);
        }
        assert_eq!(m.iter().count(), 0);
        m.insert(7, 70);
        assert_eq!(m.get(&7), Some(&70));
    }
}

// Test: clone independence, including a clone taken mid-growth.
// Verifies: identical pairs at clone time; later mutation of either side
// is invisible to the other.
#[test]
fn clone_is_independent() {
    let mut src = HashMap::new();
    let mut k = 0u32;
    while src.stats().growth.is_none() || k < 100 {
        src.insert(k, k.to_string());
        k += 1;
    }
    assert!(src.stats().growth.is_some());
    let mut copy = src.clone();
    assert!(copy.stats().growth.is_none());
    assert_eq!(copy, src);

    copy.insert(0, "changed".into());
    copy.remove(&1);
    src.insert(1_000_000, "new".into());
    assert_eq!(src.get(&0).map(String::as_str), Some("0"));
    assert!(src.contains_key(&1));
    assert!(!copy.contains_key(&1_000_000));
    assert_eq!(copy.len(), src.len() - 2);
}

// Test: iteration yields every entry once, and order varies.
// Verifies: 20+ keys; several fresh traversals are not all identical.
#[test]
fn iteration_exactly_once_and_randomized() {
    let m: HashMap<u32, ()> = (0..40).map(|k| (k, ())).collect();
    let mut orders = HashSet::new();
    for _ in 0..20 {
        let order: Vec<u32> = m.keys().copied().collect();
        let set: HashSet<u32> = order.iter().copied().collect();
        assert_eq!(order.len(), 40);
        assert_eq!(set, (0..40).collect());
        orders.insert(order);
    }
    assert!(orders.len() > 1, "traversal order never changed");
}

// Test: NaN keys.
// Assumes: NaN != NaN under MapKey.
// Verifies: each NaN insert adds an entry, lookups miss, iteration and
// growth keep them.
#[test]
fn nan_keys_are_distinct_entries() {
    let mut m = HashMap::new();
    for i in 0..50 {
        assert_eq!(m.insert(f64::NAN, i), None);
    }
    m.insert(1.0, 100);
    assert_eq!(m.len(), 51);
    assert_eq!(m.get(&f64::NAN), None);
    assert_eq!(m.remove(&f64::NAN), None);
    assert_eq!(m.iter().filter(|(k, _)| k.is_nan()).count(), 50);
    let values: HashSet<i32> = m.values().copied().collect();
    assert_eq!(values.len(), 51);
}

// Test: signed zeros are one key and the stored key is refreshed.
#[test]
fn signed_zero_updates_stored_key() {
    let mut m = HashMap::new();
    m.insert(0.0f64, "pos");
    assert_eq!(m.insert(-0.0, "neg"), Some("pos"));
    assert_eq!(m.len(), 1);
    let (k, v) = m.get_key_value(&0.0).unwrap();
    assert!(k.is_sign_negative());
    assert_eq!(*v, "neg");
}

// Test: cursor with deletes and inserts across growths.
// Assumes: mutation between cursor steps is allowed.
// Verifies: keys present throughout are produced exactly once; keys
// removed before being reached are never produced.
#[test]
fn cursor_survives_mutation_and_growth() {
    let mut m = HashMap::new();
    for k in 0..200u32 {
        m.insert(k, k);
    }
    let mut cursor = m.cursor();
    let mut produced = HashSet::new();
    let mut removed = HashSet::new();
    let mut next_new = 10_000u32;

    while let Some(h) = cursor.next_handle(&m) {
        let k = *h.key(&m).unwrap();
        assert!(!removed.contains(&k), "removed key {k} produced");
        assert!(produced.insert(k), "key {k} produced twice");
        // Remove a not-yet-produced old key, and grow the table.
        let victim = (k * 7 + 3) % 200;
        if k < 200 && !produced.contains(&victim) && m.remove(&victim).is_some() {
            removed.insert(victim);
        }
        for _ in 0..5 {
            m.insert(next_new, next_new);
            next_new += 1;
        }
    }
    assert!(cursor.is_finished());
    for k in 0..200u32 {
        if !removed.contains(&k) {
            assert!(produced.contains(&k), "key {k} missed");
        }
    }
    assert!(m.stats().log2_buckets > 5, "table never grew");
}

// Test: a cursor started mid-growth.
// Verifies: exactly-once over a snapshot taken while old buckets are
// still being evacuated, with more evacuation between steps.
#[test]
fn cursor_started_mid_growth() {
    let mut m = HashMap::new();
    let mut k = 0u32;
    loop {
        m.insert(k, k);
        k += 1;
        if let Some(g) = m.stats().growth {
            if g.old_buckets >= 8 && g.evacuated < g.old_buckets / 2 {
                break;
            }
        }
    }
    let present: HashSet<u32> = (0..k).collect();
    let mut cursor = m.cursor();
    let mut produced = HashSet::new();
    let mut extra = 1_000_000;
    while let Some((key, value)) = cursor.next_entry(&m) {
        assert_eq!(key, value);
        let key = *key;
        assert!(produced.insert(key));
        if key % 2 == 0 {
            m.insert(extra, extra);
            extra += 1;
        }
    }
    assert!(present.is_subset(&produced));
}

// Test: NaN keys seen by a cursor across growth.
// Verifies: non-reflexive keys present throughout are produced exactly
// once even though they cannot be looked up.
#[test]
fn cursor_produces_nan_keys_once() {
    let mut m = HashMap::new();
    for i in 0..64u32 {
        m.insert(f64::NAN, i);
    }
    let mut cursor = m.cursor();
    let mut produced = HashSet::new();
    let mut next = 0u32;
    while let Some((_, v)) = cursor.next_entry(&m) {
        let v = *v;
        if v < 64 {
            assert!(produced.insert(v), "NaN entry {v} produced twice");
        }
        for _ in 0..4 {
            m.insert(f64::from(next) + 0.5, 1000 + next);
            next += 1;
        }
    }
    assert_eq!(produced.len(), 64);
}

#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;

impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> ConstHasher {
        ConstHasher
    }
}

impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Test: every key collides.
// Verifies: long overflow chains, removal compaction and growth still
// give correct answers.
#[test]
fn full_collisions() {
    let mut m: HashMap<u32, u32, ConstBuildHasher> = HashMap::with_hasher(ConstBuildHasher);
    for k in 0..300 {
        m.insert(k, k + 1);
    }
    for k in (0..300).step_by(2) {
        assert_eq!(m.remove(&k), Some(k + 1));
    }
    for k in 0..300 {
        let expected = if k % 2 == 0 { None } else { Some(k + 1) };
        assert_eq!(m.get(&k).copied(), expected);
    }
    assert_eq!(m.iter().count(), 150);
}

// A user key type via the macro.
#[derive(Hash, PartialEq, Eq, Clone, Debug)]
struct Point {
    x: i32,
    y: i32,
}
incr_hashmap::map_key_via_eq!(Point);

#[test]
fn custom_key_via_macro() {
    let mut m = HashMap::new();
    m.insert(Point { x: 1, y: 2 }, "a");
    assert_eq!(m[&Point { x: 1, y: 2 }], "a");
    assert!(<Point as MapKey>::REFLEXIVE);
}

// Test: the map can move across threads and be read concurrently.
#[test]
fn shared_reads_across_threads() {
    let m: HashMap<u64, u64> = (0..1000).map(|k| (k, k * 3)).collect();
    std::thread::scope(|s| {
        for t in 0..4u64 {
            let m = &m;
            s.spawn(move || {
                for k in (t..1000).step_by(4) {
                    assert_eq!(m.get(&k), Some(&(k * 3)));
                }
            });
        }
    });
}
