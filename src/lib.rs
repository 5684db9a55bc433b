//! incr-hashmap: a bucketed hash map that grows incrementally and keeps
//! traversal correct while the table is being resized under it.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: amortize resizing. A growth allocates the next bucket array
//!   but moves no entries; each later insert or remove evacuates the old
//!   bucket it touches plus one more, so resize cost is spread over the
//!   mutations that follow.
//! - Layers:
//!   - `tag`: one byte per slot, either the top byte of the key hash or
//!     a sentinel (empty, empty-to-end-of-chain, evacuated to X/Y).
//!   - `bucket`: 8-slot buckets with overflow chains, stored in an
//!     index-addressed arena per generation (`BucketArray`).
//!   - `raw_table` + `growth` + `clone`: the engine. Lookup, insert,
//!     delete, clear, incremental evacuation and clone.
//!   - `iter`: detached cursors that walk one generation and consult the
//!     live table for entries that have moved.
//!   - `hash_map`: public `HashMap` with handles, iterators and the write
//!     flag.
//!
//! Storage
//! - Keys and values live in a `slotmap` slab; buckets hold the slab key
//!   (`EntryId`) next to the tag. Moving an entry between generations
//!   copies an id, never the key or value, and `K` needs no `Clone`.
//! - Generational ids make stale slots harmless: an evacuated slot of an
//!   old generation may refer to an entry removed since, and the slab
//!   reports it gone.
//!
//! Growth
//! - Triggered on insert of a new key when not already growing, if the
//!   average load would exceed 6.5 entries per bucket (doubling), or
//!   when overflow buckets are about as many as primaries (same-size,
//!   which compacts chains fragmented by deletes).
//! - A doubling splits old bucket `i` into new buckets `i` and
//!   `i + 2^B` by hash bit `2^B`; old slots are tagged with the half
//!   they went to.
//! - The old generation is dropped once the evacuation cursor reaches
//!   the end, unless a cursor still walks it; then it is retired and
//!   freed on a later mutation once the last cursor lets go.
//!
//! Keys
//! - `MapKey` replaces `Hash + Eq` and states whether equality is
//!   reflexive. Non-reflexive keys (NaN) are insertable and iterable but
//!   never found; evacuation routes them by tag bit while a cursor could
//!   observe the choice.
//! - Hashes mix a per-table seed, re-drawn whenever the table empties
//!   or is cleared.
//!
//! Concurrency
//! - No locking. A write-in-progress flag detects overlapping use and
//!   panics (`"concurrent map writes"` and friends); it is a diagnostic,
//!   not synchronization. The map is `Send + Sync` when its parts are.
//!
//! Failure
//! - `try_insert`, `try_with_capacity` and `try_clone` surface
//!   [`MapError`]; the infallible forms panic or abort like std
//!   collections. A growth that cannot allocate leaves the table as it
//!   was.

mod bucket;
mod clone;
mod error;
mod growth;
mod hash_map;
mod hash_map_proptest;
mod iter;
mod key;
mod raw_table;
mod tag;
mod write_guard;

// Public surface
pub use error::{MapError, Result};
pub use hash_map::{Growth, GrowthKind, Handle, HashMap, Stats};
pub use iter::{Cursor, Iter, Keys, Values};
pub use key::MapKey;
