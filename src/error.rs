//! Errors surfaced by the fallible allocation paths.

use std::alloc::Layout;
use thiserror::Error;

/// Failure to allocate bucket storage.
///
/// Returned by `try_*` methods. The map is left exactly as it was before
/// the call when a growth allocation fails.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum MapError {
    /// The requested bucket count does not fit in the address space.
    #[error("capacity overflow")]
    CapacityOverflow,

    /// The allocator refused a bucket array or overflow bucket.
    #[error("memory allocation of {} bytes failed", .layout.size())]
    AllocError {
        /// Layout of the refused allocation.
        layout: Layout,
    },
}

pub type Result<T> = std::result::Result<T, MapError>;

impl MapError {
    /// Turns the error into the same failure std collections produce.
    pub(crate) fn fail(self) -> ! {
        match self {
            MapError::CapacityOverflow => panic!("capacity overflow"),
            MapError::AllocError { layout } => std::alloc::handle_alloc_error(layout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(MapError::CapacityOverflow.to_string(), "capacity overflow");
        let layout = Layout::from_size_align(64, 8).unwrap();
        assert_eq!(
            MapError::AllocError { layout }.to_string(),
            "memory allocation of 64 bytes failed"
        );
    }
}
