//! Randomized traversal that tolerates mutation.
//!
//! A [`Cursor`] walks one generation, the one that was current when it
//! started, beginning at a random bucket and a random slot offset. It
//! holds no borrow of the map; each step takes the map again. That is
//! what lets callers insert and remove between steps.
//!
//! Guarantees across mutations between steps:
//!
//! * an entry present for the whole traversal is produced exactly once;
//! * an entry removed before the cursor reaches it is not produced;
//! * an entry inserted after the cursor started may or may not be.
//!
//! How the walk stays correct while the table grows under it:
//!
//! * If a growth starts after the cursor started, its generation becomes
//!   the old one and is eventually retired. The cursor keeps walking it.
//!   The generation stays alive through the pin the cursor holds. For a
//!   slot tagged as evacuated, the entry's key is looked up in the live
//!   table, so the value produced is the current one and an entry
//!   removed since is skipped.
//! * If the cursor started during a growth, it walks the new generation.
//!   For a bucket whose old counterpart is not evacuated yet, it reads the
//!   old bucket instead. It keeps only the entries that will land in the
//!   bucket being visited.
//!
//! Keys that are not equal to themselves cannot be looked up. The cursor
//! produces them straight from the slot, and evacuation routes them by
//! tag bit while a cursor may be watching.

use crate::bucket::{Bucket, BucketArray, BucketIdx, EntryId};
use crate::key::{equals_itself, MapKey};
use crate::raw_table::RawTable;
use crate::tag::{Tag, BUCKET_LEN};
use crate::write_guard::WriteFlag;
use core::hash::BuildHasher;
use core::iter::FusedIterator;
use std::sync::Arc;

#[derive(Copy, Clone, Debug)]
struct Position {
    /// Reading the old counterpart of the visited bucket.
    in_old: bool,
    bucket: BucketIdx,
    slot: usize,
    /// Primary bucket being visited, when `in_old`.
    visiting: BucketIdx,
}

/// A detached traversal position.
///
/// Obtain one with [`HashMap::cursor`](crate::HashMap::cursor) and drive
/// it with [`next_entry`](Self::next_entry) or
/// [`next_handle`](Self::next_handle), passing the map each time. The
/// map may be mutated between steps.
///
/// A cursor should only be advanced with the map it came from.
///
/// ```
/// let mut m = incr_hashmap::HashMap::new();
/// for k in 0..100u32 {
///     m.insert(k, k);
/// }
/// let mut cursor = m.cursor();
/// let mut seen = 0;
/// while let Some(handle) = cursor.next_handle(&m) {
///     let k = *handle.key(&m).unwrap();
///     if k % 2 == 0 {
///         m.remove(&(k + 1));
///     }
///     seen += 1;
/// }
/// assert!(seen >= 50);
/// ```
#[derive(Clone, Debug)]
pub struct Cursor {
    /// Generation walked; `None` once finished.
    snapshot: Option<Arc<()>>,
    /// Old generation of a growth in progress at start.
    old: Option<Arc<()>>,
    /// That growth kept the bucket count.
    same_size: bool,
    log2: u8,
    start: BucketIdx,
    offset: usize,
    next_bucket: BucketIdx,
    wrapped: bool,
    pos: Option<Position>,
}

impl Cursor {
    pub(crate) fn new<K, V, S>(raw: &RawTable<K, V, S>) -> Self {
        if raw.is_empty() || !raw.current.is_allocated() {
            return Self::finished();
        }
        let r = raw.iteration_seed();
        let log2 = raw.current.log2();
        let start = r as usize & raw.current.mask();
        let offset = r.checked_shr(u32::from(log2)).unwrap_or(0) as usize & (BUCKET_LEN - 1);
        Cursor {
            snapshot: Some(raw.current.pin()),
            old: raw.old.as_ref().map(BucketArray::pin),
            same_size: raw.same_size,
            log2,
            start,
            offset,
            next_bucket: start,
            wrapped: false,
            pos: None,
        }
    }

    fn finished() -> Self {
        Cursor {
            snapshot: None,
            old: None,
            same_size: false,
            log2: 0,
            start: 0,
            offset: 0,
            next_bucket: 0,
            wrapped: false,
            pos: None,
        }
    }

    /// Drops the pins so the table can free the generations.
    fn finish(&mut self) {
        self.snapshot = None;
        self.old = None;
        self.pos = None;
    }

    /// Whether the traversal has ended.
    pub fn is_finished(&self) -> bool {
        self.snapshot.is_none()
    }

    /// Id of the next entry, which is live in `raw`.
    pub(crate) fn advance<K: MapKey, V, S: BuildHasher>(
        &mut self,
        raw: &RawTable<K, V, S>,
    ) -> Option<EntryId> {
        let snapshot = self.snapshot.as_ref()?;
        let is_current = raw.current.is_pinned_by(snapshot);
        let Some(array) = raw.generation(snapshot) else {
            self.finish();
            return None;
        };

        loop {
            let mut pos = match self.pos.take() {
                Some(pos) => pos,
                None => {
                    if self.wrapped && self.next_bucket == self.start {
                        self.finish();
                        return None;
                    }
                    let pos = self.enter_bucket(raw, is_current);
                    self.next_bucket += 1;
                    if self.next_bucket == 1 << self.log2 {
                        self.next_bucket = 0;
                        self.wrapped = true;
                    }
                    pos
                }
            };

            let source = if pos.in_old {
                self.old.as_ref().and_then(|p| raw.generation(p))
            } else {
                Some(array)
            };
            // The chain may have been dropped by a clear.
            let Some(bucket) = source.and_then(|a| a.try_bucket(pos.bucket)) else {
                continue;
            };
            while pos.slot < BUCKET_LEN {
                let off = (pos.slot + self.offset) & (BUCKET_LEN - 1);
                pos.slot += 1;
                if let Some(id) = self.resolve(raw, bucket, off, pos) {
                    self.pos = Some(pos);
                    return Some(id);
                }
            }
            if let Some(next) = bucket.overflow() {
                self.pos = Some(Position {
                    bucket: next,
                    slot: 0,
                    ..pos
                });
            }
        }
    }

    /// Where to read primary bucket `next_bucket`: the old bucket if the
    /// table is mid-growth and it has not been evacuated yet.
    fn enter_bucket<K, V, S>(&self, raw: &RawTable<K, V, S>, is_current: bool) -> Position {
        let b = self.next_bucket;
        if is_current {
            let old = self
                .old
                .as_ref()
                .and_then(|p| raw.old.as_ref().filter(|o| o.is_pinned_by(p)));
            if let Some(old) = old {
                let oldbucket = b & old.mask();
                if !old.bucket(oldbucket).is_evacuated() {
                    return Position {
                        in_old: true,
                        bucket: oldbucket,
                        slot: 0,
                        visiting: b,
                    };
                }
            }
        }
        Position {
            in_old: false,
            bucket: b,
            slot: 0,
            visiting: b,
        }
    }

    /// The live entry behind slot `off` of `bucket`, if the cursor should
    /// produce it at this position.
    fn resolve<K: MapKey, V, S: BuildHasher>(
        &self,
        raw: &RawTable<K, V, S>,
        bucket: &Bucket,
        off: usize,
        pos: Position,
    ) -> Option<EntryId> {
        let tag = bucket.tag(off);
        if tag.is_empty() || tag == Tag::EvacuatedEmpty {
            return None;
        }
        let id = bucket.slot(off)?;
        // Removed since the slot was written.
        let entry = raw.entries.get(id)?;
        let reflexive = equals_itself(&entry.key);

        if pos.in_old && !self.same_size {
            // Old bucket shared by two new ones: keep only what lands in
            // the one being visited.
            let mask = (1usize << self.log2) - 1;
            if reflexive {
                if raw.hasher.hash(&entry.key) as usize & mask != pos.visiting {
                    return None;
                }
            } else if pos.visiting >> self.log2.saturating_sub(1) != tag.low_bit() {
                return None;
            }
        }

        if !matches!(tag, Tag::EvacuatedX | Tag::EvacuatedY) || !reflexive {
            return Some(id);
        }
        // The table grew after this cursor started; the live table has
        // the entry, or no longer has it.
        raw.find(&entry.key)
    }

    /// Next entry of the traversal.
    pub fn next_entry<'m, K: MapKey, V, S: BuildHasher>(
        &mut self,
        map: &'m crate::HashMap<K, V, S>,
    ) -> Option<(&'m K, &'m V)> {
        let (raw, flag) = map.parts();
        step(self, raw, flag)
    }

    /// Handle of the next entry, for use after mutating the map.
    pub fn next_handle<K: MapKey, V, S: BuildHasher>(
        &mut self,
        map: &crate::HashMap<K, V, S>,
    ) -> Option<crate::Handle> {
        let (raw, flag) = map.parts();
        flag.check_iterate();
        self.advance(raw).map(crate::Handle::new)
    }
}

fn step<'m, K: MapKey, V, S: BuildHasher>(
    cursor: &mut Cursor,
    raw: &'m RawTable<K, V, S>,
    flag: &WriteFlag,
) -> Option<(&'m K, &'m V)> {
    flag.check_iterate();
    loop {
        let id = cursor.advance(raw)?;
        if let Some(e) = raw.entries.get(id) {
            return Some((&e.key, &e.value));
        }
    }
}

/// Iterator over `(&K, &V)`, in an order that differs between traversals.
pub struct Iter<'a, K, V, S> {
    raw: &'a RawTable<K, V, S>,
    flag: &'a WriteFlag,
    cursor: Cursor,
    remaining: usize,
}

impl<'a, K, V, S> Iter<'a, K, V, S> {
    pub(crate) fn new(raw: &'a RawTable<K, V, S>, flag: &'a WriteFlag) -> Self {
        Iter {
            raw,
            flag,
            cursor: Cursor::new(raw),
            remaining: raw.len(),
        }
    }
}

impl<'a, K: MapKey, V, S: BuildHasher> Iterator for Iter<'a, K, V, S> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let item = step(&mut self.cursor, self.raw, self.flag);
        if item.is_some() {
            self.remaining = self.remaining.saturating_sub(1);
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: MapKey, V, S: BuildHasher> ExactSizeIterator for Iter<'_, K, V, S> {}
impl<K: MapKey, V, S: BuildHasher> FusedIterator for Iter<'_, K, V, S> {}

impl<K, V, S> Clone for Iter<'_, K, V, S> {
    fn clone(&self) -> Self {
        Iter {
            raw: self.raw,
            flag: self.flag,
            cursor: self.cursor.clone(),
            remaining: self.remaining,
        }
    }
}

impl<K: core::fmt::Debug + MapKey, V: core::fmt::Debug, S: BuildHasher> core::fmt::Debug
    for Iter<'_, K, V, S>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

/// Iterator over the keys of a map.
pub struct Keys<'a, K, V, S> {
    pub(crate) inner: Iter<'a, K, V, S>,
}

impl<'a, K: MapKey, V, S: BuildHasher> Iterator for Keys<'a, K, V, S> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K: MapKey, V, S: BuildHasher> ExactSizeIterator for Keys<'_, K, V, S> {}
impl<K: MapKey, V, S: BuildHasher> FusedIterator for Keys<'_, K, V, S> {}

/// Iterator over the values of a map.
pub struct Values<'a, K, V, S> {
    pub(crate) inner: Iter<'a, K, V, S>,
}

impl<'a, K: MapKey, V, S: BuildHasher> Iterator for Values<'a, K, V, S> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K: MapKey, V, S: BuildHasher> ExactSizeIterator for Values<'_, K, V, S> {}
impl<K: MapKey, V, S: BuildHasher> FusedIterator for Values<'_, K, V, S> {}
