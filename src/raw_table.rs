//! RawTable: the bucketed engine behind [`HashMap`](crate::HashMap).
//!
//! Holds the entry slab, the current bucket generation and, while a
//! growth is in flight, the old generation being evacuated. Lookups
//! consult the old generation for buckets not yet evacuated; mutations
//! evacuate first and then only touch the current generation.
//!
//! Growth and evacuation live in `growth.rs`, cloning in `clone.rs`, and
//! traversal in `iter.rs`; they all extend this type.

use crate::bucket::{BucketArray, BucketIdx, Entry, EntryId, InsertProbe};
use crate::error::Result;
use crate::key::MapKey;
use crate::tag::{Tag, BUCKET_LEN};
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hasher};
use core::sync::atomic::{AtomicU64, Ordering};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use slotmap::SlotMap;

/// Growth starts once the average bucket holds more than
/// `LOAD_FACTOR_NUM / LOAD_FACTOR_DEN` entries (13/16 of `BUCKET_LEN`).
const LOAD_FACTOR_NUM: usize = 13;
const LOAD_FACTOR_DEN: usize = 2;

// Weyl increment for the per-table iteration seed stream.
const ITER_SEED_STEP: u64 = 0x9E37_79B9_7F4A_7C15;

/// Whether `count` entries overload `2^log2` buckets.
pub(crate) fn overloaded(count: usize, log2: u8) -> bool {
    match crate::bucket::bucket_shift(log2) {
        Some(buckets) => {
            count > BUCKET_LEN && count > LOAD_FACTOR_NUM.saturating_mul(buckets / LOAD_FACTOR_DEN)
        }
        None => false,
    }
}

/// Smallest `B` that holds `capacity` entries without overloading.
pub(crate) fn log2_for(capacity: usize) -> u8 {
    let mut log2 = 0;
    while overloaded(capacity, log2) {
        log2 += 1;
    }
    log2
}

/// Whether `noverflow` overflow buckets are as many as the `2^log2`
/// primaries. Capped at `2^15` to match the sampled counter.
pub(crate) fn too_many_overflow(noverflow: usize, log2: u8) -> bool {
    noverflow >= 1 << log2.min(15)
}

/// Counts one new overflow bucket. Exact below `2^16` buckets; above,
/// counts with probability `1 / 2^(log2 - 15)` so the counter stays small.
pub(crate) fn count_overflow(noverflow: &mut usize, log2: u8, rng: &mut SmallRng) {
    if log2 < 16 {
        *noverflow += 1;
        return;
    }
    let mask = (1u64 << (log2 - 15).min(63)) - 1;
    if rng.random::<u64>() & mask == 0 {
        *noverflow += 1;
    }
}

/// A `BuildHasher` with the table's seed mixed into every hash.
#[derive(Clone, Debug)]
pub(crate) struct SeededHasher<S> {
    pub(crate) build: S,
    pub(crate) seed: u64,
}

impl<S: BuildHasher> SeededHasher<S> {
    #[inline]
    pub(crate) fn hash<K: MapKey + ?Sized>(&self, key: &K) -> u64 {
        let mut state = self.build.build_hasher();
        state.write_u64(self.seed);
        key.hash_key(&mut state);
        state.finish()
    }
}

pub(crate) struct RawTable<K, V, S> {
    pub(crate) entries: SlotMap<EntryId, Entry<K, V>>,
    pub(crate) current: BucketArray,
    /// Generation being evacuated; `Some` exactly while growing.
    pub(crate) old: Option<BucketArray>,
    /// Fully evacuated generations that cursors still walk.
    pub(crate) retired: Vec<BucketArray>,
    /// Old buckets below this index are evacuated.
    pub(crate) evacuated: usize,
    pub(crate) same_size: bool,
    /// Approximate overflow buckets in the current generation.
    pub(crate) noverflow: usize,
    pub(crate) hasher: SeededHasher<S>,
    pub(crate) rng: SmallRng,
    iter_seed: AtomicU64,
}

impl<K, V, S> RawTable<K, V, S> {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub(crate) fn is_growing(&self) -> bool {
        self.old.is_some()
    }

    /// Next value of the per-table iteration seed stream.
    pub(crate) fn iteration_seed(&self) -> u64 {
        let s = self.iter_seed.fetch_add(ITER_SEED_STEP, Ordering::Relaxed);
        SmallRng::seed_from_u64(s).random()
    }

    /// Generation pinned by `pin`, if the table still holds it.
    pub(crate) fn generation(&self, pin: &std::sync::Arc<()>) -> Option<&BucketArray> {
        if self.current.is_pinned_by(pin) {
            return Some(&self.current);
        }
        if let Some(old) = self.old.as_ref().filter(|o| o.is_pinned_by(pin)) {
            return Some(old);
        }
        self.retired.iter().find(|r| r.is_pinned_by(pin))
    }

    /// Keeps `array` around only while a cursor still walks it.
    pub(crate) fn retire(&mut self, array: BucketArray) {
        if array.is_pinned() {
            self.retired.push(array);
        }
    }

    fn prune_retired(&mut self) {
        if !self.retired.is_empty() {
            self.retired.retain(BucketArray::is_pinned);
        }
    }

    pub(crate) fn reseed(&mut self) {
        self.hasher.seed = self.rng.random();
    }

    /// Chains an overflow bucket after `tail` in the current generation.
    pub(crate) fn new_overflow(&mut self, tail: BucketIdx) -> Result<BucketIdx> {
        let idx = self.current.new_overflow(tail)?;
        count_overflow(&mut self.noverflow, self.current.log2(), &mut self.rng);
        Ok(idx)
    }

    /// Empties the table, keeping the current bucket allocation.
    pub(crate) fn clear(&mut self) {
        if self.is_empty() {
            return;
        }
        self.entries.clear();
        if let Some(mut old) = self.old.take() {
            old.mark_empty();
            self.retire(old);
        }
        for r in &mut self.retired {
            r.mark_empty();
        }
        self.current.reset();
        self.evacuated = 0;
        self.same_size = false;
        self.noverflow = 0;
        self.reseed();
    }
}

impl<K: MapKey, V, S: BuildHasher> RawTable<K, V, S> {
    /// Table sized for `capacity` entries. Buckets are allocated now
    /// unless the table fits a single bucket, which is allocated on the
    /// first insert.
    pub(crate) fn with_capacity(capacity: usize, build: S, mut rng: SmallRng) -> Result<Self> {
        let log2 = log2_for(capacity);
        let mut current = BucketArray::unallocated(log2);
        let entries = if log2 != 0 {
            current.allocate()?;
            SlotMap::with_capacity_and_key(capacity)
        } else {
            SlotMap::with_key()
        };
        let seed = rng.random();
        let iter_seed = rng.random();
        Ok(Self {
            entries,
            current,
            old: None,
            retired: Vec::new(),
            evacuated: 0,
            same_size: false,
            noverflow: 0,
            hasher: SeededHasher { build, seed },
            rng,
            iter_seed: AtomicU64::new(iter_seed),
        })
    }

    #[inline]
    fn matches<'a, Q>(
        entries: &'a SlotMap<EntryId, Entry<K, V>>,
        key: &'a Q,
    ) -> impl FnMut(EntryId) -> bool + 'a
    where
        K: Borrow<Q>,
        Q: MapKey + ?Sized,
    {
        move |id| entries.get(id).is_some_and(|e| e.key.borrow().key_eq(key))
    }

    /// Bucket chain that holds `hash` for a reader: the old bucket while
    /// it is not evacuated, otherwise the current one.
    fn read_bucket(&self, hash: u64) -> (&BucketArray, BucketIdx) {
        if let Some(old) = &self.old {
            let b = old.index_of(hash);
            if !old.bucket(b).is_evacuated() {
                return (old, b);
            }
        }
        (&self.current, self.current.index_of(hash))
    }

    pub(crate) fn find<Q>(&self, key: &Q) -> Option<EntryId>
    where
        K: Borrow<Q>,
        Q: MapKey + ?Sized,
    {
        if self.is_empty() {
            return None;
        }
        let hash = self.hasher.hash(key);
        let (array, head) = self.read_bucket(hash);
        array
            .probe(head, Tag::for_hash(hash), Self::matches(&self.entries, key))
            .map(|(_, _, id)| id)
    }

    /// Inserts or overwrites. Returns the previous value on overwrite.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        self.prune_retired();
        let hash = self.hasher.hash(&key);
        let tag = Tag::for_hash(hash);
        if !self.current.is_allocated() {
            self.current.allocate()?;
        }
        loop {
            let head = self.current.index_of(hash);
            if self.is_growing() {
                self.grow_work(head)?;
            }
            let probe = self
                .current
                .probe_insert(head, tag, Self::matches(&self.entries, &key));
            let (slot, tail) = match probe {
                InsertProbe::Found(id) => {
                    let entry = &mut self.entries[id];
                    if K::NEEDS_KEY_UPDATE {
                        entry.key = key;
                    }
                    return Ok(Some(core::mem::replace(&mut entry.value, value)));
                }
                InsertProbe::Vacant { slot, tail } => (slot, tail),
            };

            // The search ran against the chain as it stands; a growth
            // replaces the array, so search again afterwards.
            if !self.is_growing()
                && (overloaded(self.len() + 1, self.current.log2())
                    || too_many_overflow(self.noverflow, self.current.log2()))
            {
                self.hash_grow()?;
                continue;
            }

            let (b, i) = match slot {
                Some(at) => at,
                None => (self.new_overflow(tail)?, 0),
            };
            let id = self.entries.insert(Entry { key, value });
            self.current.bucket_mut(b).fill(i, tag, id);
            return Ok(None);
        }
    }

    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Result<Option<Entry<K, V>>>
    where
        K: Borrow<Q>,
        Q: MapKey + ?Sized,
    {
        self.prune_retired();
        if self.is_empty() {
            return Ok(None);
        }
        let hash = self.hasher.hash(key);
        let head = self.current.index_of(hash);
        if self.is_growing() {
            self.grow_work(head)?;
        }
        let found = self
            .current
            .probe(head, Tag::for_hash(hash), Self::matches(&self.entries, key));
        let Some((b, i, id)) = found else {
            return Ok(None);
        };
        self.current.vacate(head, b, i);
        let entry = self.entries.remove(id);
        if self.is_empty() {
            self.reseed();
        }
        Ok(entry)
    }
}

#[cfg(test)]
impl<K: MapKey, V, S: BuildHasher> RawTable<K, V, S> {
    /// Checks the structural invariants: the live count matches occupied
    /// slots, chains obey the `EmptyRest` compaction rule, and no old
    /// bucket below the evacuation cursor is untouched.
    pub(crate) fn check_invariants(&self) {
        fn walk(array: &BucketArray, head: BucketIdx, skip_evacuated: bool) -> usize {
            if skip_evacuated && array.bucket(head).is_evacuated() {
                return 0;
            }
            let mut occupied = 0;
            let mut rest = false;
            let mut b = Some(head);
            while let Some(idx) = b {
                let bucket = array.bucket(idx);
                for i in 0..BUCKET_LEN {
                    let tag = bucket.tag(i);
                    if rest {
                        assert_eq!(tag, Tag::EmptyRest, "slot after EmptyRest not empty");
                    }
                    match tag {
                        Tag::EmptyRest => rest = true,
                        Tag::Occupied(_) => {
                            assert!(bucket.slot(i).is_some());
                            occupied += 1;
                        }
                        Tag::EmptyOne => {}
                        other => panic!("unexpected {other:?} in a live bucket"),
                    }
                }
                b = bucket.overflow();
            }
            occupied
        }

        if !self.current.is_allocated() {
            assert!(self.is_empty());
            return;
        }
        let mut occupied = 0;
        for head in 0..self.current.len() {
            occupied += walk(&self.current, head, false);
        }
        if let Some(old) = &self.old {
            for head in 0..old.len() {
                if head < self.evacuated {
                    assert!(old.bucket(head).is_evacuated());
                }
                occupied += walk(old, head, true);
            }
        }
        assert_eq!(occupied, self.len());
    }
}
