//! # Memory Error Types
//!
//! Every capacity or precondition failure of the allocators. Capacities are
//! fixed at init, so each of these indicates a sizing or usage defect.

use thiserror::Error;

/// Errors raised by [`Arena`](crate::Arena) and [`Pool`](crate::Pool).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// A push would run past the end of the arena.
    #[error("arena overflow: {requested} bytes requested at offset {offset}, capacity {capacity}")]
    ArenaOverflow {
        /// Bytes requested by the push.
        requested: usize,
        /// Arena offset before the push.
        offset: usize,
        /// Arena capacity.
        capacity: usize,
    },

    /// Zero-byte pushes are not allowed.
    #[error("zero-sized arena allocation")]
    ZeroSizedAllocation,

    /// `push_copy` was given more source bytes than it allocates.
    #[error("copy source of {src_len} bytes does not fit in {size} bytes")]
    CopyTooLarge {
        /// Bytes allocated.
        size: usize,
        /// Bytes in the source.
        src_len: usize,
    },

    /// A rollback target above the current top.
    #[error("cannot roll arena back to {offset}: current offset is {current}")]
    InvalidRollback {
        /// Requested offset.
        offset: usize,
        /// Offset at the time of the call.
        current: usize,
    },

    /// Every slot of the pool is in use.
    #[error("pool exhausted: capacity {capacity}")]
    PoolExhausted {
        /// Fixed pool capacity.
        capacity: usize,
    },

    /// The handle does not name a live slot (freed, or never allocated).
    #[error("stale pool handle: slot {index}, generation {generation}")]
    StaleHandle {
        /// Slot index carried by the handle.
        index: u32,
        /// Generation carried by the handle.
        generation: u32,
    },
}

/// Result type for allocator operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
