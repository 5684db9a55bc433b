//! Bucket storage: fixed-size bucket records in an index-addressed arena.
//!
//! A [`BucketArray`] is one generation of the table. Its first `2^B`
//! records are the primary buckets; after them sit the pre-provisioned
//! spare overflow buckets, and after those any overflow buckets allocated
//! on demand. Overflow links are indices into the same arena, so a
//! generation is freed by dropping its `Vec`.
//!
//! Buckets do not hold keys or values. Each slot holds the [`EntryId`] of
//! an entry in the table's slab; a slot whose bucket has been evacuated
//! keeps its id so iterators can still reach the entry.

use crate::error::{MapError, Result};
use crate::tag::{Tag, BUCKET_LEN};
use slotmap::new_key_type;
use std::alloc::Layout;
use std::sync::Arc;

new_key_type! {
    /// Slab key of one stored entry. Stable for the entry's lifetime.
    pub(crate) struct EntryId;
}

#[derive(Clone, Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
}

/// Arena index of a bucket within its generation.
pub(crate) type BucketIdx = usize;

#[derive(Clone, Debug)]
pub(crate) struct Bucket {
    tags: [u8; BUCKET_LEN],
    slots: [Option<EntryId>; BUCKET_LEN],
    overflow: Option<BucketIdx>,
}

impl Default for Bucket {
    fn default() -> Self {
        Self {
            tags: [Tag::EmptyRest.encode(); BUCKET_LEN],
            slots: [None; BUCKET_LEN],
            overflow: None,
        }
    }
}

impl Bucket {
    #[inline]
    pub(crate) fn tag(&self, i: usize) -> Tag {
        Tag::decode(self.tags[i])
    }

    #[inline]
    pub(crate) fn set_tag(&mut self, i: usize, tag: Tag) {
        self.tags[i] = tag.encode();
    }

    #[inline]
    pub(crate) fn slot(&self, i: usize) -> Option<EntryId> {
        self.slots[i]
    }

    #[inline]
    pub(crate) fn overflow(&self) -> Option<BucketIdx> {
        self.overflow
    }

    #[inline]
    pub(crate) fn fill(&mut self, i: usize, tag: Tag, id: EntryId) {
        self.tags[i] = tag.encode();
        self.slots[i] = Some(id);
    }

    /// A bucket is evacuated once its first tag carries an evacuation
    /// sentinel; evacuation marks every slot, so the first one suffices.
    #[inline]
    pub(crate) fn is_evacuated(&self) -> bool {
        self.tag(0).is_evacuated()
    }

    fn reset(&mut self) {
        *self = Bucket::default();
    }
}

/// Result of scanning a chain for an insert.
pub(crate) enum InsertProbe {
    Found(EntryId),
    Vacant {
        /// First empty slot seen, if any.
        slot: Option<(BucketIdx, usize)>,
        /// Last bucket of the chain, where an overflow bucket would go.
        tail: BucketIdx,
    },
}

/// One generation of buckets.
#[derive(Debug)]
pub(crate) struct BucketArray {
    log2: u8,
    buckets: Vec<Bucket>,
    next_spare: BucketIdx,
    spare_end: BucketIdx,
    overflow: usize,
    // Held by cursors that still walk this generation.
    pin: Arc<()>,
}

impl BucketArray {
    /// A generation of `2^log2` buckets whose memory is not allocated yet.
    pub(crate) fn unallocated(log2: u8) -> Self {
        Self {
            log2,
            buckets: Vec::new(),
            next_spare: 0,
            spare_end: 0,
            overflow: 0,
            pin: Arc::new(()),
        }
    }

    /// Allocates `2^log2` primary buckets plus the spare overflow pool.
    pub(crate) fn try_new(log2: u8) -> Result<Self> {
        let mut array = Self::unallocated(log2);
        array.allocate()?;
        Ok(array)
    }

    /// Allocates the bucket memory of an unallocated generation.
    pub(crate) fn allocate(&mut self) -> Result<()> {
        debug_assert!(!self.is_allocated());
        let primaries = bucket_shift(self.log2).ok_or(MapError::CapacityOverflow)?;
        let spares = if self.log2 >= 4 {
            primaries >> 4
        } else {
            0
        };
        let total = primaries
            .checked_add(spares)
            .ok_or(MapError::CapacityOverflow)?;
        let layout = Layout::array::<Bucket>(total).map_err(|_| MapError::CapacityOverflow)?;
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(total)
            .map_err(|_| MapError::AllocError { layout })?;
        buckets.resize_with(total, Bucket::default);
        self.buckets = buckets;
        self.next_spare = primaries;
        self.spare_end = total;
        Ok(())
    }

    #[inline]
    pub(crate) fn is_allocated(&self) -> bool {
        !self.buckets.is_empty()
    }

    #[inline]
    pub(crate) fn log2(&self) -> u8 {
        self.log2
    }

    /// Number of primary buckets.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        1 << self.log2
    }

    #[inline]
    pub(crate) fn mask(&self) -> usize {
        self.len() - 1
    }

    #[inline]
    pub(crate) fn index_of(&self, hash: u64) -> BucketIdx {
        hash as usize & self.mask()
    }

    /// Overflow buckets currently linked into chains.
    #[inline]
    pub(crate) fn overflow_buckets(&self) -> usize {
        self.overflow
    }

    #[inline]
    pub(crate) fn bucket(&self, idx: BucketIdx) -> &Bucket {
        &self.buckets[idx]
    }

    #[inline]
    pub(crate) fn bucket_mut(&mut self, idx: BucketIdx) -> &mut Bucket {
        &mut self.buckets[idx]
    }

    /// Like [`bucket`](Self::bucket), for positions held across mutations:
    /// a reset may have dropped the on-demand overflow buckets.
    #[inline]
    pub(crate) fn try_bucket(&self, idx: BucketIdx) -> Option<&Bucket> {
        self.buckets.get(idx)
    }

    /// Makes room for `additional` on-demand overflow buckets, so that the
    /// next `additional` calls to [`new_overflow`](Self::new_overflow)
    /// cannot fail.
    pub(crate) fn reserve_overflow(&mut self, additional: usize) -> Result<()> {
        let spare = self.spare_end - self.next_spare;
        let needed = additional.saturating_sub(spare);
        if needed == 0 {
            return Ok(());
        }
        let layout = Layout::array::<Bucket>(needed).map_err(|_| MapError::CapacityOverflow)?;
        self.buckets
            .try_reserve(needed)
            .map_err(|_| MapError::AllocError { layout })
    }

    pub(crate) fn pin(&self) -> Arc<()> {
        Arc::clone(&self.pin)
    }

    #[inline]
    pub(crate) fn is_pinned_by(&self, pin: &Arc<()>) -> bool {
        Arc::ptr_eq(&self.pin, pin)
    }

    /// Whether any cursor still walks this generation.
    #[inline]
    pub(crate) fn is_pinned(&self) -> bool {
        Arc::strong_count(&self.pin) > 1
    }

    /// Chains a fresh overflow bucket after `tail` and returns its index.
    ///
    /// Spares are handed out first; after that the arena grows.
    pub(crate) fn new_overflow(&mut self, tail: BucketIdx) -> Result<BucketIdx> {
        let idx = if self.next_spare < self.spare_end {
            let idx = self.next_spare;
            self.next_spare += 1;
            idx
        } else {
            let layout = Layout::new::<Bucket>();
            self.buckets
                .try_reserve(1)
                .map_err(|_| MapError::AllocError { layout })?;
            self.buckets.push(Bucket::default());
            log::trace!(
                "spare overflow pool exhausted (B={}), allocated bucket {}",
                self.log2,
                self.buckets.len() - 1
            );
            self.buckets.len() - 1
        };
        debug_assert!(self.buckets[tail].overflow.is_none());
        self.buckets[tail].overflow = Some(idx);
        self.overflow += 1;
        Ok(idx)
    }

    /// Last bucket of the chain starting at `head`.
    pub(crate) fn chain_tail(&self, head: BucketIdx) -> BucketIdx {
        let mut b = head;
        while let Some(next) = self.buckets[b].overflow {
            b = next;
        }
        b
    }

    /// Walks the chain at `head` for a slot tagged `tag` whose entry
    /// satisfies `matches`. Returns the bucket, slot and entry id.
    pub(crate) fn probe(
        &self,
        head: BucketIdx,
        tag: Tag,
        mut matches: impl FnMut(EntryId) -> bool,
    ) -> Option<(BucketIdx, usize, EntryId)> {
        let mut b = Some(head);
        while let Some(idx) = b {
            let bucket = &self.buckets[idx];
            for i in 0..BUCKET_LEN {
                let t = bucket.tag(i);
                if t != tag {
                    if t == Tag::EmptyRest {
                        return None;
                    }
                    continue;
                }
                if let Some(id) = bucket.slot(i) {
                    if matches(id) {
                        return Some((idx, i, id));
                    }
                }
            }
            b = bucket.overflow;
        }
        None
    }

    /// Like [`probe`](Self::probe), but also records the first empty slot
    /// and keeps scanning past it: tags are not unique, so only
    /// `EmptyRest` proves the key is absent.
    pub(crate) fn probe_insert(
        &self,
        head: BucketIdx,
        tag: Tag,
        mut matches: impl FnMut(EntryId) -> bool,
    ) -> InsertProbe {
        let mut slot = None;
        let mut idx = head;
        loop {
            let bucket = &self.buckets[idx];
            for i in 0..BUCKET_LEN {
                let t = bucket.tag(i);
                if t != tag {
                    if t.is_empty() && slot.is_none() {
                        slot = Some((idx, i));
                    }
                    if t == Tag::EmptyRest {
                        return InsertProbe::Vacant { slot, tail: idx };
                    }
                    continue;
                }
                if let Some(id) = bucket.slot(i) {
                    if matches(id) {
                        return InsertProbe::Found(id);
                    }
                }
            }
            match bucket.overflow {
                Some(next) => idx = next,
                None => return InsertProbe::Vacant { slot, tail: idx },
            }
        }
    }

    /// Empties slot `i` of bucket `b` in the chain headed by `head`.
    ///
    /// If the slot ends the chain's occupied prefix, the trailing run of
    /// `EmptyOne` tags is rewritten to `EmptyRest`, walking back across
    /// overflow boundaries.
    pub(crate) fn vacate(&mut self, head: BucketIdx, b: BucketIdx, i: usize) {
        self.buckets[b].slots[i] = None;
        self.buckets[b].set_tag(i, Tag::EmptyOne);

        let rest_follows = if i == BUCKET_LEN - 1 {
            match self.buckets[b].overflow {
                Some(next) => self.buckets[next].tag(0) == Tag::EmptyRest,
                None => true,
            }
        } else {
            self.buckets[b].tag(i + 1) == Tag::EmptyRest
        };
        if !rest_follows {
            return;
        }

        let (mut b, mut i) = (b, i);
        loop {
            self.buckets[b].set_tag(i, Tag::EmptyRest);
            if i == 0 {
                if b == head {
                    break;
                }
                b = self.predecessor(head, b);
                i = BUCKET_LEN - 1;
            } else {
                i -= 1;
            }
            if self.buckets[b].tag(i) != Tag::EmptyOne {
                break;
            }
        }
    }

    fn predecessor(&self, head: BucketIdx, of: BucketIdx) -> BucketIdx {
        let mut b = head;
        while let Some(next) = self.buckets[b].overflow {
            if next == of {
                return b;
            }
            b = next;
        }
        unreachable!("bucket {of} is not in the chain at {head}")
    }

    /// Empties every bucket and returns the arena to its freshly
    /// allocated shape, keeping the primary and spare memory.
    pub(crate) fn reset(&mut self) {
        if !self.is_allocated() {
            return;
        }
        self.buckets.truncate(self.spare_end);
        for bucket in &mut self.buckets {
            bucket.reset();
        }
        self.next_spare = self.len();
        self.overflow = 0;
    }

    /// Marks every slot of every chain `EmptyRest`, for iterators still
    /// walking a generation the table is discarding.
    pub(crate) fn mark_empty(&mut self) {
        for bucket in &mut self.buckets {
            bucket.tags = [Tag::EmptyRest.encode(); BUCKET_LEN];
        }
    }

    /// Copies the chain at `src_head` of `src` into this array, appending
    /// after slot `pos` of bucket `dst`. Entry ids are produced by
    /// `copy_entry`; tags are kept as they are. Returns the new write
    /// position.
    pub(crate) fn append_chain(
        &mut self,
        mut dst: BucketIdx,
        mut pos: usize,
        src: &BucketArray,
        src_head: BucketIdx,
        mut copy_entry: impl FnMut(EntryId) -> EntryId,
        mut on_overflow: impl FnMut(),
    ) -> Result<(BucketIdx, usize)> {
        let mut s = Some(src_head);
        while let Some(sidx) = s {
            let sb = &src.buckets[sidx];
            for i in 0..BUCKET_LEN {
                let tag = sb.tag(i);
                let Some(id) = sb.slot(i).filter(|_| !tag.is_empty()) else {
                    continue;
                };
                while pos < BUCKET_LEN && !self.buckets[dst].tag(pos).is_empty() {
                    pos += 1;
                }
                if pos == BUCKET_LEN {
                    dst = self.new_overflow(dst)?;
                    on_overflow();
                    pos = 0;
                }
                self.buckets[dst].fill(pos, tag, copy_entry(id));
                pos += 1;
            }
            s = sb.overflow;
        }
        Ok((dst, pos))
    }
}

/// `2^log2`, or `None` when it does not fit in `usize`.
#[inline]
pub(crate) fn bucket_shift(log2: u8) -> Option<usize> {
    1usize.checked_shl(u32::from(log2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(n: usize) -> (SlotMap<EntryId, ()>, Vec<EntryId>) {
        let mut slab = SlotMap::with_key();
        let ids = (0..n).map(|_| slab.insert(())).collect();
        (slab, ids)
    }

    fn tags(array: &BucketArray, b: BucketIdx) -> Vec<Tag> {
        (0..BUCKET_LEN).map(|i| array.bucket(b).tag(i)).collect()
    }

    #[test]
    fn spare_pool_sized_from_log2() {
        assert_eq!(BucketArray::try_new(3).unwrap().buckets.len(), 8);
        let a = BucketArray::try_new(4).unwrap();
        assert_eq!(a.buckets.len(), 17);
        assert_eq!(a.next_spare, 16);
        let a = BucketArray::try_new(6).unwrap();
        assert_eq!(a.buckets.len(), 64 + 4);
    }

    #[test]
    fn overflow_uses_spares_before_growing_the_arena() {
        let mut a = BucketArray::try_new(4).unwrap();
        let first = a.new_overflow(0).unwrap();
        assert_eq!(first, 16);
        assert_eq!(a.buckets.len(), 17);
        let second = a.new_overflow(first).unwrap();
        assert_eq!(second, 17);
        assert_eq!(a.buckets.len(), 18);
        assert_eq!(a.overflow_buckets(), 2);
        assert_eq!(a.chain_tail(0), second);
    }

    #[test]
    fn capacity_overflow_is_reported() {
        assert_eq!(
            BucketArray::try_new(u8::MAX).unwrap_err(),
            MapError::CapacityOverflow
        );
    }

    #[test]
    fn probe_stops_at_empty_rest() {
        let (_slab, ids) = ids(2);
        let mut a = BucketArray::try_new(0).unwrap();
        let tag = Tag::Occupied(42);
        a.bucket_mut(0).fill(0, tag, ids[0]);
        // A matching tag behind EmptyRest must never be reached.
        a.bucket_mut(0).fill(2, tag, ids[1]);
        let mut seen = Vec::new();
        let found = a.probe(0, tag, |id| {
            seen.push(id);
            id == ids[1]
        });
        assert!(found.is_none());
        assert_eq!(seen, vec![ids[0]]);
    }

    #[test]
    fn probe_insert_prefers_first_hole_but_scans_for_match() {
        let (_slab, ids) = ids(3);
        let mut a = BucketArray::try_new(0).unwrap();
        let tag = Tag::Occupied(9);
        for (i, id) in ids.iter().enumerate() {
            a.bucket_mut(0).fill(i, tag, *id);
        }
        a.vacate(0, 0, 0);
        match a.probe_insert(0, tag, |id| id == ids[2]) {
            InsertProbe::Found(id) => assert_eq!(id, ids[2]),
            InsertProbe::Vacant { .. } => panic!("existing entry missed"),
        }
        match a.probe_insert(0, tag, |_| false) {
            InsertProbe::Vacant { slot, tail } => {
                assert_eq!(slot, Some((0, 0)));
                assert_eq!(tail, 0);
            }
            InsertProbe::Found(_) => panic!("unexpected match"),
        }
    }

    #[test]
    fn vacate_compacts_trailing_run_across_overflow() {
        let (_slab, ids) = ids(10);
        let mut a = BucketArray::try_new(0).unwrap();
        let tag = Tag::Occupied(7);
        for i in 0..BUCKET_LEN {
            a.bucket_mut(0).fill(i, tag, ids[i]);
        }
        let ovf = a.new_overflow(0).unwrap();
        a.bucket_mut(ovf).fill(0, tag, ids[8]);
        a.bucket_mut(ovf).fill(1, tag, ids[9]);

        // Hole in the middle stays EmptyOne.
        a.vacate(0, 0, 6);
        assert_eq!(a.bucket(0).tag(6), Tag::EmptyOne);
        a.vacate(0, 0, 7);
        assert_eq!(a.bucket(0).tag(7), Tag::EmptyOne);

        // Removing the last occupied slots rewrites the whole tail.
        a.vacate(0, ovf, 1);
        assert_eq!(a.bucket(ovf).tag(1), Tag::EmptyRest);
        a.vacate(0, ovf, 0);
        assert!(tags(&a, ovf).iter().all(|t| *t == Tag::EmptyRest));
        assert_eq!(a.bucket(0).tag(7), Tag::EmptyRest);
        assert_eq!(a.bucket(0).tag(6), Tag::EmptyRest);
        assert_eq!(a.bucket(0).tag(5), tag);
    }

    #[test]
    fn reset_restores_spares() {
        let (_slab, ids) = ids(1);
        let mut a = BucketArray::try_new(4).unwrap();
        let o1 = a.new_overflow(3).unwrap();
        let o2 = a.new_overflow(o1).unwrap();
        a.bucket_mut(o2).fill(0, Tag::Occupied(99), ids[0]);
        a.reset();
        assert_eq!(a.buckets.len(), 17);
        assert_eq!(a.overflow_buckets(), 0);
        assert!(a.bucket(3).overflow().is_none());
        assert_eq!(a.new_overflow(3).unwrap(), 16);
    }
}
