//! HashMap: public surface over the incremental table, with handles,
//! cursors and write-misuse detection.

use crate::bucket::EntryId;
use crate::error::Result;
use crate::iter::{Cursor, Iter, Keys, Values};
use crate::key::MapKey;
use crate::raw_table::RawTable;
use crate::write_guard::WriteFlag;
use core::borrow::Borrow;
use core::fmt;
use core::hash::BuildHasher;
use core::ops::Index;
use hashbrown::hash_map::DefaultHashBuilder;
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Stable reference to one entry, valid until that entry is removed.
///
/// Handles survive growth, evacuation and cloning of other maps; they
/// are only meaningful for the map that produced them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(EntryId);

impl Handle {
    pub(crate) fn new(id: EntryId) -> Self {
        Handle(id)
    }

    pub fn key<'a, K, V, S>(&self, map: &'a HashMap<K, V, S>) -> Option<&'a K>
    where
        K: MapKey,
        S: BuildHasher,
    {
        map.writing.check_read();
        map.raw.entries.get(self.0).map(|e| &e.key)
    }

    pub fn value<'a, K, V, S>(&self, map: &'a HashMap<K, V, S>) -> Option<&'a V>
    where
        K: MapKey,
        S: BuildHasher,
    {
        map.writing.check_read();
        map.raw.entries.get(self.0).map(|e| &e.value)
    }

    pub fn value_mut<'a, K, V, S>(&self, map: &'a mut HashMap<K, V, S>) -> Option<&'a mut V>
    where
        K: MapKey,
        S: BuildHasher,
    {
        map.writing.check_read();
        map.raw.entries.get_mut(self.0).map(|e| &mut e.value)
    }
}

/// Which kind of growth is in progress.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GrowthKind {
    /// Bucket count doubles; every old bucket splits in two.
    Doubling,
    /// Bucket count stays; chains are compacted.
    SameSize,
}

/// State of a growth in progress.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Growth {
    pub kind: GrowthKind,
    /// Buckets in the generation being evacuated.
    pub old_buckets: usize,
    /// Old buckets below this index are evacuated.
    pub evacuated: usize,
}

/// Snapshot of the table's shape, for tests and diagnostics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Stats {
    pub len: usize,
    /// `B`: the table has `2^B` primary buckets.
    pub log2_buckets: u8,
    /// Whether bucket memory has been allocated.
    pub allocated: bool,
    /// Overflow buckets linked into the current generation.
    pub overflow_buckets: usize,
    pub growth: Option<Growth>,
}

/// A hash map that grows incrementally.
///
/// Entries live in buckets of eight slots chained through overflow
/// buckets. When the table needs to grow, the bucket array is replaced
/// but entries move a bucket at a time during later inserts and
/// removes, so no single operation pays for a full rehash.
///
/// Traversal order is randomized per traversal. The map can be mutated
/// between steps of a [`Cursor`].
///
/// Keys implement [`MapKey`] rather than `Hash + Eq` so that
/// non-reflexive keys such as `f64::NAN` have defined behavior.
///
/// ```
/// use incr_hashmap::HashMap;
///
/// let mut m = HashMap::new();
/// m.insert("a", 1);
/// m.insert("b", 2);
/// assert_eq!(m.get(&"a"), Some(&1));
/// assert_eq!(m.insert("a", 3), Some(1));
/// assert_eq!(m.remove(&"b"), Some(2));
/// assert_eq!(m.len(), 1);
/// ```
pub struct HashMap<K, V, S = DefaultHashBuilder> {
    raw: RawTable<K, V, S>,
    writing: WriteFlag,
}

impl<K: MapKey, V> HashMap<K, V> {
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Map sized for `capacity` entries without growing.
    ///
    /// # Panics
    ///
    /// Panics or aborts if the buckets cannot be allocated; see
    /// [`try_with_capacity`](Self::try_with_capacity).
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }

    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        Self::try_with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }

    /// Map whose hash seeds and traversal orders derive from `seed`, for
    /// reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_parts(0, DefaultHashBuilder::default(), SmallRng::seed_from_u64(seed))
            .unwrap_or_else(|e| e.fail())
    }
}

impl<K: MapKey, V> Default for HashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MapKey, V, S: BuildHasher> HashMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self::try_with_capacity_and_hasher(capacity, hasher).unwrap_or_else(|e| e.fail())
    }

    pub fn try_with_capacity_and_hasher(capacity: usize, hasher: S) -> Result<Self> {
        Self::from_parts(capacity, hasher, SmallRng::from_rng(&mut rand::rng()))
    }

    fn from_parts(capacity: usize, hasher: S, rng: SmallRng) -> Result<Self> {
        Ok(HashMap {
            raw: RawTable::with_capacity(capacity, hasher, rng)?,
            writing: WriteFlag::new(),
        })
    }

    pub(crate) fn parts(&self) -> (&RawTable<K, V, S>, &WriteFlag) {
        (&self.raw, &self.writing)
    }

    pub fn hasher(&self) -> &S {
        &self.raw.hasher.build
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn find<Q>(&self, key: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        self.writing.check_read();
        self.raw.find(key).map(Handle::new)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// The value for `key`, or `V::default()` when absent.
    pub fn get_or_default<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
        V: Clone + Default,
    {
        self.get(key).cloned().unwrap_or_default()
    }

    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        self.writing.check_read();
        let id = self.raw.find(key)?;
        self.raw.entries.get(id).map(|e| (&e.key, &e.value))
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        self.writing.check_read();
        let id = self.raw.find(key)?;
        self.raw.entries.get_mut(id).map(|e| &mut e.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        self.find(key).is_some()
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    ///
    /// A key that is not equal to itself never replaces anything.
    ///
    /// # Panics
    ///
    /// Panics or aborts if a growth cannot allocate; see
    /// [`try_insert`](Self::try_insert).
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.try_insert(key, value).unwrap_or_else(|e| e.fail())
    }

    /// Like [`insert`](Self::insert), but reports allocation failure.
    /// On error `key` and `value` are dropped and the map holds what it
    /// held before the call.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        let _g = self.writing.enter();
        self.raw.insert(key, value)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + MapKey,
    {
        let _g = self.writing.enter();
        match self.raw.remove(key) {
            Ok(entry) => entry.map(|e| (e.key, e.value)),
            Err(e) => e.fail(),
        }
    }

    /// Removes every entry. Keeps the bucket allocation.
    pub fn clear(&mut self) {
        let _g = self.writing.enter();
        self.raw.clear();
    }

    /// Iterates in an order that differs between calls.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        self.writing.check_iterate();
        Iter::new(&self.raw, &self.writing)
    }

    pub fn keys(&self) -> Keys<'_, K, V, S> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V, S> {
        Values { inner: self.iter() }
    }

    /// A traversal that allows mutating the map between steps.
    pub fn cursor(&self) -> Cursor {
        self.writing.check_iterate();
        Cursor::new(&self.raw)
    }

    pub fn stats(&self) -> Stats {
        let raw = &self.raw;
        Stats {
            len: raw.len(),
            log2_buckets: raw.current.log2(),
            allocated: raw.current.is_allocated(),
            overflow_buckets: raw.current.overflow_buckets(),
            growth: raw.old.as_ref().map(|old| Growth {
                kind: if raw.same_size {
                    GrowthKind::SameSize
                } else {
                    GrowthKind::Doubling
                },
                old_buckets: old.len(),
                evacuated: raw.evacuated,
            }),
        }
    }

    /// Copy with its own storage, sized for the current entry count.
    pub fn try_clone(&self) -> Result<Self>
    where
        K: Clone,
        V: Clone,
        S: Clone,
    {
        self.writing.check_read();
        Ok(HashMap {
            raw: self.raw.try_clone()?,
            writing: WriteFlag::new(),
        })
    }
}

impl<K, V, S> Clone for HashMap<K, V, S>
where
    K: MapKey + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        self.try_clone().unwrap_or_else(|e| e.fail())
    }
}

impl<K, V, S> fmt::Debug for HashMap<K, V, S>
where
    K: MapKey + fmt::Debug,
    V: fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: MapKey, V, S: BuildHasher> Extend<(K, V)> for HashMap<K, V, S> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: MapKey, V, S: BuildHasher + Default> FromIterator<(K, V)> for HashMap<K, V, S> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut map = Self::with_capacity_and_hasher(iter.size_hint().0, S::default());
        map.extend(iter);
        map
    }
}

impl<K, V, S> PartialEq for HashMap<K, V, S>
where
    K: MapKey,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, Q, V, S> Index<&Q> for HashMap<K, V, S>
where
    K: MapKey + Borrow<Q>,
    Q: ?Sized + MapKey,
    S: BuildHasher,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if `key` is not present.
    fn index(&self, key: &Q) -> &V {
        match self.get(key) {
            Some(v) => v,
            None => panic!("key not found"),
        }
    }
}

impl<'a, K: MapKey, V, S: BuildHasher> IntoIterator for &'a HashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
