//! Cloning without rehashing.
//!
//! The clone is sized for the source's live entries rather than its
//! bucket count, but never larger than the source. Chains of the current
//! generation are copied tag by tag into the bucket they land in under
//! the smaller mask; a growth in progress is folded in by copying the
//! not-yet-evacuated old chains too, so the clone starts out not growing.

use crate::bucket::{BucketArray, BucketIdx, Entry, EntryId};
use crate::error::Result;
use crate::key::MapKey;
use crate::raw_table::{count_overflow, log2_for, RawTable};
use crate::tag::BUCKET_LEN;
use core::hash::BuildHasher;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use slotmap::SlotMap;

impl<K, V, S> RawTable<K, V, S>
where
    K: MapKey + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    pub(crate) fn try_clone(&self) -> Result<Self> {
        let rng = SmallRng::seed_from_u64(self.iteration_seed());
        let mut dst = Self::with_capacity(0, self.hasher.build.clone(), rng)?;
        if self.is_empty() {
            return Ok(dst);
        }
        // Tags are copied, not recomputed, so the seed must match.
        dst.hasher.seed = self.hasher.seed;
        dst.current = BucketArray::try_new(log2_for(self.len()).min(self.current.log2()))?;
        dst.entries.reserve(self.len());

        let dst_len = dst.current.len();
        for i in 0..dst_len {
            let mut at = (i, 0);
            for j in (0..self.current.len()).step_by(dst_len) {
                at = dst.copy_chain(at, &self.current, i + j, &self.entries)?;
            }
        }

        if let Some(old) = &self.old {
            for i in 0..old.len() {
                if old.bucket(i).is_evacuated() {
                    continue;
                }
                if old.log2() >= dst.current.log2() && !dst.is_growing() {
                    // Every key of old chain `i` lands in dst bucket
                    // `i & mask`; append to its tail.
                    let head = i & dst.current.mask();
                    let tail = dst.current.chain_tail(head);
                    dst.copy_chain((tail, 0), old, i, &self.entries)?;
                } else {
                    dst.reinsert_chain(old, i, &self.entries)?;
                }
            }
        }
        Ok(dst)
    }

    /// Appends chain `head` of `src` at `at`, cloning each entry into
    /// this table's slab.
    fn copy_chain(
        &mut self,
        at: (BucketIdx, usize),
        src: &BucketArray,
        head: BucketIdx,
        src_entries: &SlotMap<EntryId, Entry<K, V>>,
    ) -> Result<(BucketIdx, usize)> {
        let Self {
            entries,
            current,
            noverflow,
            rng,
            ..
        } = self;
        let log2 = current.log2();
        current.append_chain(
            at.0,
            at.1,
            src,
            head,
            |id| entries.insert(src_entries[id].clone()),
            || count_overflow(noverflow, log2, rng),
        )
    }

    fn reinsert_chain(
        &mut self,
        src: &BucketArray,
        head: BucketIdx,
        src_entries: &SlotMap<EntryId, Entry<K, V>>,
    ) -> Result<()> {
        let mut b = Some(head);
        while let Some(idx) = b {
            let bucket = src.bucket(idx);
            for i in 0..BUCKET_LEN {
                if bucket.tag(i).is_empty() {
                    continue;
                }
                if let Some(e) = bucket.slot(i).and_then(|id| src_entries.get(id)) {
                    self.insert(e.key.clone(), e.value.clone())?;
                }
            }
            b = bucket.overflow();
        }
        Ok(())
    }
}
