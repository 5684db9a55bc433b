//! Write-in-progress detector.
//!
//! The map performs no locking. Instead every mutating entry point holds
//! a [`WriteGuard`] for its duration and every read checks the flag, so
//! that overlapping use (through aliasing, or from a `MapKey` impl calling
//! back into the map) fails loudly instead of observing a half-updated
//! table. Detection is best effort: it catches the misuse when it
//! happens to overlap, it does not synchronize anything.

use core::sync::atomic::{AtomicBool, Ordering};

/// Per-map write flag. Embed it next to the table and guard mutating
/// entry points with `let _g = self.writing.enter();`.
#[derive(Debug, Default)]
pub(crate) struct WriteFlag {
    writing: AtomicBool,
}

impl WriteFlag {
    pub(crate) const fn new() -> Self {
        Self {
            writing: AtomicBool::new(false),
        }
    }

    /// Marks a write in progress. Panics if one already is.
    #[inline]
    pub(crate) fn enter(&self) -> WriteGuard<'_> {
        if self.writing.swap(true, Ordering::Relaxed) {
            panic!("concurrent map writes");
        }
        WriteGuard { owner: self }
    }

    /// Panics if a write is in progress.
    #[inline]
    pub(crate) fn check_read(&self) {
        if self.writing.load(Ordering::Relaxed) {
            panic!("concurrent map read and map write");
        }
    }

    #[inline]
    pub(crate) fn check_iterate(&self) {
        if self.writing.load(Ordering::Relaxed) {
            panic!("concurrent map iteration and map write");
        }
    }
}

/// RAII guard returned by [`WriteFlag::enter`]; clears the flag on every
/// exit path.
pub(crate) struct WriteGuard<'a> {
    owner: &'a WriteFlag,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let was_writing = self.owner.writing.swap(false, Ordering::Relaxed);
        // Someone else cleared our flag: another writer ran in between.
        if !was_writing && !std::thread::panicking() {
            panic!("concurrent map writes");
        }
    }
}
