#![cfg(test)]

// Property tests kept inside the crate so they can check the table's
// structural invariants after every step.

use crate::{Cursor, HashMap};
use proptest::prelude::*;
use std::collections::{HashMap as StdHashMap, HashSet};

#[derive(Clone, Debug)]
enum Op {
    Insert(u16, i32),
    Remove(u16),
    Get(u16),
    Clear,
    Clone,
    Iterate,
    StartCursor,
    StepCursor(u8),
}

fn arb_ops(key_space: u16) -> impl Strategy<Value = Vec<Op>> {
    let key = 0..key_space;
    let op = prop_oneof![
        8 => (key.clone(), any::<i32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        4 => key.clone().prop_map(Op::Remove),
        2 => key.prop_map(Op::Get),
        1 => Just(Op::Clear),
        1 => Just(Op::Clone),
        1 => Just(Op::Iterate),
        1 => Just(Op::StartCursor),
        3 => (1u8..16).prop_map(Op::StepCursor),
    ];
    proptest::collection::vec(op, 1..400)
}

/// A cursor under test plus what it is allowed to produce.
struct Traversal {
    cursor: Cursor,
    /// Present at start and not removed since: must be produced once.
    continuous: HashSet<u16>,
    produced: HashSet<u16>,
}

impl Traversal {
    fn step(
        &mut self,
        sut: &HashMap<u16, i32>,
        model: &StdHashMap<u16, i32>,
    ) -> Result<bool, TestCaseError> {
        match self.cursor.next_entry(sut) {
            Some((k, v)) => {
                prop_assert_eq!(model.get(k), Some(v), "produced a dead or stale entry");
                let first = self.produced.insert(*k);
                if self.continuous.contains(k) {
                    prop_assert!(first, "key {} produced twice", k);
                }
                Ok(true)
            }
            None => {
                let missed: Vec<_> = self.continuous.difference(&self.produced).collect();
                prop_assert!(missed.is_empty(), "cursor missed {:?}", missed);
                Ok(false)
            }
        }
    }
}

fn check(sut: &HashMap<u16, i32>, model: &StdHashMap<u16, i32>) -> Result<(), TestCaseError> {
    sut.parts().0.check_invariants();
    prop_assert_eq!(sut.len(), model.len());
    Ok(())
}

// Property: state-machine equivalence against std's HashMap.
// - insert/remove/get agree with the model, including returned values;
// - structural invariants hold after every step, mid-growth included;
// - a full `iter` yields exactly the model's entries;
// - clones are equal and independent;
// - a cursor interleaved with mutations produces every continuously
//   present key exactly once and never a removed one.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine(ops in arb_ops(512)) {
        let mut sut: HashMap<u16, i32> = HashMap::new();
        let mut model: StdHashMap<u16, i32> = StdHashMap::new();
        let mut traversal: Option<Traversal> = None;

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    prop_assert_eq!(sut.insert(k, v), model.insert(k, v));
                }
                Op::Remove(k) => {
                    prop_assert_eq!(sut.remove(&k), model.remove(&k));
                    if let Some(t) = traversal.as_mut() {
                        t.continuous.remove(&k);
                    }
                }
                Op::Get(k) => {
                    prop_assert_eq!(sut.get(&k), model.get(&k));
                }
                Op::Clear => {
                    sut.clear();
                    model.clear();
                    if let Some(t) = traversal.as_mut() {
                        t.continuous.clear();
                    }
                }
                Op::Clone => {
                    let mut copy = sut.clone();
                    copy.parts().0.check_invariants();
                    prop_assert!(copy == sut);
                    copy.insert(u16::MAX, 0);
                    prop_assert_eq!(sut.get(&u16::MAX), None);
                }
                Op::Iterate => {
                    let seen: StdHashMap<u16, i32> = sut.iter().map(|(k, v)| (*k, *v)).collect();
                    prop_assert_eq!(&seen, &model);
                }
                Op::StartCursor => {
                    traversal = Some(Traversal {
                        cursor: sut.cursor(),
                        continuous: model.keys().copied().collect(),
                        produced: HashSet::new(),
                    });
                }
                Op::StepCursor(n) => {
                    if let Some(t) = traversal.as_mut() {
                        for _ in 0..n {
                            if !t.step(&sut, &model)? {
                                traversal = None;
                                break;
                            }
                        }
                    }
                }
            }
            check(&sut, &model)?;
        }

        if let Some(mut t) = traversal {
            while t.step(&sut, &model)? {}
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_float_keys(values in proptest::collection::vec(prop_oneof![
        Just(f64::NAN),
        Just(0.0f64),
        Just(-0.0f64),
        -1e6f64..1e6,
    ], 1..200)) {
        let mut sut: HashMap<f64, usize> = HashMap::new();
        let mut nans = 0;
        let mut others: StdHashMap<u64, usize> = StdHashMap::new();
        for (i, f) in values.iter().enumerate() {
            sut.insert(*f, i);
            if f.is_nan() {
                nans += 1;
            } else {
                let bits = if *f == 0.0 { 0 } else { f.to_bits() };
                others.insert(bits, i);
            }
        }
        prop_assert_eq!(sut.len(), nans + others.len());
        prop_assert_eq!(sut.iter().filter(|(k, _)| k.is_nan()).count(), nans);
        prop_assert_eq!(sut.get(&f64::NAN), None);
        for (bits, i) in &others {
            prop_assert_eq!(sut.get(&f64::from_bits(*bits)), Some(i));
        }
        sut.parts().0.check_invariants();
    }
}
