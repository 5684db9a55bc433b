//! Per-slot tags: the high hash byte of an occupied slot, or a sentinel.
//!
//! Buckets store tags as raw bytes; this module is the only place that
//! knows the encoding. Sentinels occupy `0..MIN_TOP_HASH` and occupied
//! tags are biased into `MIN_TOP_HASH..=255`, so every byte decodes.

/// Number of slots in a bucket.
pub(crate) const BUCKET_LEN: usize = 8;

const EMPTY_REST: u8 = 0;
const EMPTY_ONE: u8 = 1;
const EVACUATED_X: u8 = 2;
const EVACUATED_Y: u8 = 3;
const EVACUATED_EMPTY: u8 = 4;

/// Smallest tag value of an occupied slot.
pub(crate) const MIN_TOP_HASH: u8 = 5;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Tag {
    /// This slot, every later slot of the bucket, and the rest of the
    /// overflow chain are empty.
    EmptyRest,
    /// This slot alone is empty.
    EmptyOne,
    /// Entry moved to the first half of the grown array.
    EvacuatedX,
    /// Entry moved to the second half of the grown array.
    EvacuatedY,
    /// Slot was empty when its bucket was evacuated.
    EvacuatedEmpty,
    /// Occupied; holds the biased top byte of the key hash.
    Occupied(u8),
}

impl Tag {
    /// Tag for a key with the given hash.
    #[inline]
    pub(crate) fn for_hash(hash: u64) -> Tag {
        let top = (hash >> (u64::BITS - 8)) as u8;
        if top < MIN_TOP_HASH {
            Tag::Occupied(top + MIN_TOP_HASH)
        } else {
            Tag::Occupied(top)
        }
    }

    #[inline]
    pub(crate) fn decode(byte: u8) -> Tag {
        match byte {
            EMPTY_REST => Tag::EmptyRest,
            EMPTY_ONE => Tag::EmptyOne,
            EVACUATED_X => Tag::EvacuatedX,
            EVACUATED_Y => Tag::EvacuatedY,
            EVACUATED_EMPTY => Tag::EvacuatedEmpty,
            top => Tag::Occupied(top),
        }
    }

    #[inline]
    pub(crate) fn encode(self) -> u8 {
        match self {
            Tag::EmptyRest => EMPTY_REST,
            Tag::EmptyOne => EMPTY_ONE,
            Tag::EvacuatedX => EVACUATED_X,
            Tag::EvacuatedY => EVACUATED_Y,
            Tag::EvacuatedEmpty => EVACUATED_EMPTY,
            Tag::Occupied(top) => {
                debug_assert!(top >= MIN_TOP_HASH, "occupied tag in sentinel range");
                top
            }
        }
    }

    /// Empty in a live (not evacuated) bucket.
    #[inline]
    pub(crate) fn is_empty(self) -> bool {
        matches!(self, Tag::EmptyRest | Tag::EmptyOne)
    }

    #[inline]
    pub(crate) fn is_evacuated(self) -> bool {
        matches!(self, Tag::EvacuatedX | Tag::EvacuatedY | Tag::EvacuatedEmpty)
    }

    /// Low bit of the encoded tag. For occupied slots this is a hash bit;
    /// for evacuated slots it is 0 for X and 1 for Y.
    #[inline]
    pub(crate) fn low_bit(self) -> usize {
        (self.encode() & 1) as usize
    }
}
