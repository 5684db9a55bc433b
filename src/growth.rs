//! Incremental growth.
//!
//! A growth allocates the next generation and keeps the previous one as
//! `old`. No entry moves at that point: every later insert or remove
//! evacuates the old bucket it is about to touch plus one more at the
//! evacuation cursor, so the cost of a resize is spread over the
//! mutations that follow it and no single call pays for all of it.
//!
//! A doubling growth splits each old bucket `i` between new buckets `i`
//! (X) and `i + 2^B` (Y) by the hash bit `2^B`. A same-size growth
//! (triggered by too many overflow buckets after deletes) rewrites each
//! chain into a fresh, compact one at the same index.

use crate::bucket::{BucketArray, BucketIdx};
use crate::error::{MapError, Result};
use crate::key::{equals_itself, MapKey};
use crate::raw_table::{count_overflow, overloaded, RawTable};
use crate::tag::{Tag, BUCKET_LEN};
use core::hash::BuildHasher;

/// Upper bound on already-evacuated buckets skipped per cursor advance.
const EVACUATION_SCAN_LIMIT: usize = 1024;

/// Write position in one evacuation destination chain.
#[derive(Copy, Clone)]
struct Destination {
    bucket: BucketIdx,
    pos: usize,
}

impl<K: MapKey, V, S: BuildHasher> RawTable<K, V, S> {
    /// Starts a growth: doubling when one more entry would overload the
    /// table, same-size otherwise. The table is unchanged if the new
    /// generation cannot be allocated.
    pub(crate) fn hash_grow(&mut self) -> Result<()> {
        debug_assert!(!self.is_growing());
        let log2 = self.current.log2();
        let doubling = overloaded(self.len() + 1, log2);
        let new_log2 = if doubling {
            log2.checked_add(1).ok_or(MapError::CapacityOverflow)?
        } else {
            log2
        };
        let fresh = BucketArray::try_new(new_log2)?;

        let old = core::mem::replace(&mut self.current, fresh);
        log::debug!(
            "{} growth started: B {} -> {}, {} entries, {} overflow buckets",
            if doubling { "doubling" } else { "same-size" },
            log2,
            new_log2,
            self.len(),
            old.overflow_buckets()
        );
        self.old = Some(old);
        self.same_size = !doubling;
        self.evacuated = 0;
        self.noverflow = 0;
        Ok(())
    }

    /// Evacuation work owed by a mutation of current bucket `bucket`.
    pub(crate) fn grow_work(&mut self, bucket: BucketIdx) -> Result<()> {
        let Some(old) = &self.old else {
            return Ok(());
        };
        let oldbucket = bucket & old.mask();
        self.evacuate(oldbucket)?;
        if self.is_growing() {
            self.evacuate(self.evacuated)?;
        }
        Ok(())
    }

    /// Moves every entry of old chain `oldbucket` into the current
    /// generation and tags its slots with where they went.
    fn evacuate(&mut self, oldbucket: BucketIdx) -> Result<()> {
        // Non-reflexive keys are routed by their old tag only while a
        // cursor that started during this growth may still walk them.
        let iterating = self.current.is_pinned();
        let Self {
            entries,
            current,
            old,
            hasher,
            rng,
            noverflow,
            same_size,
            ..
        } = self;
        let Some(old) = old.as_mut() else {
            return Ok(());
        };
        let newbit = old.len();

        if !old.bucket(oldbucket).is_evacuated() {
            // Reserve every overflow bucket this chain can need up front,
            // so a failed allocation leaves the bucket untouched.
            let mut chain = 1;
            let mut b = oldbucket;
            while let Some(next) = old.bucket(b).overflow() {
                chain += 1;
                b = next;
            }
            current.reserve_overflow(2 * chain)?;

            let mut dst = [
                Destination { bucket: oldbucket, pos: 0 },
                Destination { bucket: oldbucket + newbit, pos: 0 },
            ];
            let mut b = Some(oldbucket);
            while let Some(idx) = b {
                for i in 0..BUCKET_LEN {
                    let tag = old.bucket(idx).tag(i);
                    let top = match tag {
                        Tag::EmptyRest | Tag::EmptyOne => {
                            old.bucket_mut(idx).set_tag(i, Tag::EvacuatedEmpty);
                            continue;
                        }
                        Tag::Occupied(top) => top,
                        other => panic!("bad map state: {other:?} in an unevacuated bucket"),
                    };
                    let Some(id) = old.bucket(idx).slot(i) else {
                        panic!("bad map state: occupied slot without an entry");
                    };

                    let mut moved = Tag::Occupied(top);
                    let mut half = 0;
                    if !*same_size {
                        let Some(entry) = entries.get(id) else {
                            panic!("bad map state: occupied slot refers to a removed entry");
                        };
                        let hash = hasher.hash(&entry.key);
                        if iterating && !equals_itself(&entry.key) {
                            // The hash of such a key is not reproducible;
                            // the tag bit keeps the choice stable for the
                            // iterator, and a fresh tag lets the next
                            // growth spread these keys again.
                            half = tag.low_bit();
                            moved = Tag::for_hash(hash);
                        } else if hash as usize & newbit != 0 {
                            half = 1;
                        }
                    }

                    let mark = if half == 0 { Tag::EvacuatedX } else { Tag::EvacuatedY };
                    old.bucket_mut(idx).set_tag(i, mark);
                    let d = &mut dst[half];
                    if d.pos == BUCKET_LEN {
                        d.bucket = current.new_overflow(d.bucket)?;
                        count_overflow(noverflow, current.log2(), rng);
                        d.pos = 0;
                    }
                    current.bucket_mut(d.bucket).fill(d.pos, moved, id);
                    d.pos += 1;
                }
                b = old.bucket(idx).overflow();
            }
        }

        if oldbucket == self.evacuated {
            self.advance_evacuation_mark(newbit);
        }
        Ok(())
    }

    fn advance_evacuation_mark(&mut self, newbit: usize) {
        self.evacuated += 1;
        let stop = self.evacuated.saturating_add(EVACUATION_SCAN_LIMIT).min(newbit);
        if let Some(old) = &self.old {
            while self.evacuated != stop && old.bucket(self.evacuated).is_evacuated() {
                self.evacuated += 1;
            }
        }
        if self.evacuated == newbit {
            if let Some(old) = self.old.take() {
                log::debug!(
                    "growth complete: B={}, {} entries",
                    self.current.log2(),
                    self.len()
                );
                self.retire(old);
            }
            self.same_size = false;
        }
    }
}
