//! # Arena Allocator
//!
//! A linear bump allocator over one reserved region. Allocation is a pointer
//! bump; there is no per-allocation free. Memory comes back all at once via
//! [`Arena::clear`], or as a stack-ordered suffix via [`Arena::fallback`].

use crate::error::{MemoryError, MemoryResult};

/// A region handed out by an [`Arena`].
///
/// Regions are plain offsets into the arena's storage. They are resolved to
/// bytes through [`Arena::bytes`] / [`Arena::bytes_mut`], which refuse regions
/// that lie above the current top (rolled back or cleared).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArenaRegion {
    offset: usize,
    len: usize,
}

impl ArenaRegion {
    /// Byte offset of the region from the arena base.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the region in bytes. Never zero.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always `false`; zero-sized pushes are rejected.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte of the region.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Returns `true` if the two regions share at least one byte.
    #[inline]
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// A remembered arena top, restored with [`Arena::rollback`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArenaCheckpoint(usize);

impl ArenaCheckpoint {
    /// The offset this checkpoint rolls back to.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }
}

/// A bump-pointer arena allocator.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. It belongs to exactly one subsystem on the
/// render thread.
///
/// # Example
///
/// ```rust
/// use lumen_core::Arena;
///
/// let mut arena = Arena::new(1024);
/// let scratch = arena.checkpoint();
/// let a = arena.push(128).unwrap();
/// let b = arena.push_zero(64).unwrap();
/// assert!(!a.overlaps(&b));
///
/// arena.rollback(scratch).unwrap();
/// assert_eq!(arena.used(), 0);
/// ```
pub struct Arena {
    /// The reserved region.
    storage: Box<[u8]>,
    /// Current top of the arena.
    offset: usize,
    /// Total capacity in bytes.
    capacity: usize,
}

impl Arena {
    /// Creates a new arena with the specified capacity in bytes.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Total size in bytes, reserved up front
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            offset: 0,
            capacity,
        }
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current offset, i.e. bytes consumed so far.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.offset
    }

    /// Returns the remaining free space in bytes.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.capacity - self.offset
    }

    /// Absolute address of the current top.
    #[inline]
    #[must_use]
    pub fn get_top(&self) -> usize {
        self.base_address() + self.offset
    }

    /// Absolute address of the first byte of the arena.
    #[inline]
    #[must_use]
    pub fn base_address(&self) -> usize {
        self.storage.as_ptr() as usize
    }

    /// Records the current top so that later pushes can be undone together.
    #[inline]
    #[must_use]
    pub const fn checkpoint(&self) -> ArenaCheckpoint {
        ArenaCheckpoint(self.offset)
    }

    /// Allocates `size` bytes at the current top.
    ///
    /// # Errors
    ///
    /// [`MemoryError::ZeroSizedAllocation`] for `size == 0`,
    /// [`MemoryError::ArenaOverflow`] if the allocation would run past the
    /// capacity. The arena is untouched on failure.
    pub fn push(&mut self, size: usize) -> MemoryResult<ArenaRegion> {
        self.bump(self.offset, size)
    }

    /// Allocates `size` bytes whose absolute address is a multiple of
    /// `alignment`.
    ///
    /// The top is first rounded up to the alignment; the padding is consumed
    /// even though it is never handed out.
    ///
    /// # Arguments
    ///
    /// * `size` - Bytes to allocate, non-zero
    /// * `alignment` - Power of two
    ///
    /// # Errors
    ///
    /// Same as [`Arena::push`], measured after padding.
    pub fn push_aligned(&mut self, size: usize, alignment: usize) -> MemoryResult<ArenaRegion> {
        debug_assert!(alignment.is_power_of_two(), "alignment must be a power of two");

        let top = self.get_top();
        let aligned_top = (top + alignment - 1) & !(alignment - 1);
        self.bump(self.offset + (aligned_top - top), size)
    }

    /// Like [`Arena::push`], then zero-fills the region.
    ///
    /// # Errors
    ///
    /// Same as [`Arena::push`].
    pub fn push_zero(&mut self, size: usize) -> MemoryResult<ArenaRegion> {
        let region = self.push(size)?;
        self.storage[region.offset..region.end()].fill(0);
        Ok(region)
    }

    /// Like [`Arena::push_aligned`], then zero-fills the region.
    ///
    /// # Errors
    ///
    /// Same as [`Arena::push_aligned`].
    pub fn push_zero_aligned(&mut self, size: usize, alignment: usize) -> MemoryResult<ArenaRegion> {
        let region = self.push_aligned(size, alignment)?;
        self.storage[region.offset..region.end()].fill(0);
        Ok(region)
    }

    /// Allocates `size` bytes and copies `src` into the front of the region.
    ///
    /// `None` performs the allocation only; the caller fills the region later
    /// (for example from a decoder writing in place).
    ///
    /// # Errors
    ///
    /// [`MemoryError::CopyTooLarge`] if `src` does not fit in `size` bytes,
    /// otherwise the same as [`Arena::push`].
    pub fn push_copy(&mut self, size: usize, src: Option<&[u8]>) -> MemoryResult<ArenaRegion> {
        if let Some(src) = src {
            if src.len() > size {
                return Err(MemoryError::CopyTooLarge { size, src_len: src.len() });
            }
        }

        let region = self.push(size)?;
        if let Some(src) = src {
            self.storage[region.offset..region.offset + src.len()].copy_from_slice(src);
        }
        Ok(region)
    }

    /// Copies a plain-old-data value into a correctly aligned region.
    ///
    /// # Errors
    ///
    /// Same as [`Arena::push_aligned`].
    pub fn push_pod<T: bytemuck::Pod>(&mut self, value: &T) -> MemoryResult<ArenaRegion> {
        let bytes = bytemuck::bytes_of(value);
        let region = self.push_aligned(bytes.len(), std::mem::align_of::<T>())?;
        self.storage[region.offset..region.end()].copy_from_slice(bytes);
        Ok(region)
    }

    /// Resolves a region to its bytes.
    ///
    /// Returns `None` if the region lies above the current top.
    #[must_use]
    pub fn bytes(&self, region: ArenaRegion) -> Option<&[u8]> {
        if region.end() > self.offset {
            return None;
        }
        self.storage.get(region.offset..region.end())
    }

    /// Resolves a region to its bytes, mutably.
    ///
    /// Returns `None` if the region lies above the current top.
    #[must_use]
    pub fn bytes_mut(&mut self, region: ArenaRegion) -> Option<&mut [u8]> {
        if region.end() > self.offset {
            return None;
        }
        self.storage.get_mut(region.offset..region.end())
    }

    /// Reads back a value stored with [`Arena::push_pod`].
    #[must_use]
    pub fn pod<T: bytemuck::Pod>(&self, region: ArenaRegion) -> Option<&T> {
        self.bytes(region)
            .and_then(|bytes| bytemuck::try_from_bytes(bytes).ok())
    }

    /// Resets the top to zero.
    ///
    /// Every region handed out so far is logically dead after this call.
    #[inline]
    pub fn clear(&mut self) {
        self.offset = 0;
    }

    /// Rolls the top back to an earlier offset, freeing the suffix above it.
    ///
    /// # Errors
    ///
    /// [`MemoryError::InvalidRollback`] if `offset` is above the current top.
    pub fn fallback(&mut self, offset: usize) -> MemoryResult<()> {
        if offset > self.offset {
            return Err(MemoryError::InvalidRollback {
                offset,
                current: self.offset,
            });
        }
        self.offset = offset;
        Ok(())
    }

    /// Rolls back to a checkpoint taken with [`Arena::checkpoint`].
    ///
    /// # Errors
    ///
    /// Same as [`Arena::fallback`].
    #[inline]
    pub fn rollback(&mut self, checkpoint: ArenaCheckpoint) -> MemoryResult<()> {
        self.fallback(checkpoint.0)
    }

    /// Releases the reserved region. Capacity and offset drop to zero and any
    /// later push fails with [`MemoryError::ArenaOverflow`].
    pub fn destroy(&mut self) {
        self.storage = Vec::new().into_boxed_slice();
        self.offset = 0;
        self.capacity = 0;
    }

    fn bump(&mut self, start: usize, size: usize) -> MemoryResult<ArenaRegion> {
        if size == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }

        let end = start
            .checked_add(size)
            .filter(|end| *end <= self.capacity)
            .ok_or(MemoryError::ArenaOverflow {
                requested: size,
                offset: self.offset,
                capacity: self.capacity,
            })?;

        self.offset = end;
        Ok(ArenaRegion { offset: start, len: size })
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("offset", &self.offset)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_arena_scenario_three_pushes() {
        let mut arena = Arena::new(1024);
        let a = arena.push(128).unwrap();
        let b = arena.push(128).unwrap();
        let c = arena.push(128).unwrap();

        assert!(!a.overlaps(&b) && !b.overlaps(&c) && !a.overlaps(&c));
        assert!(arena.used() <= 1024);
        assert_eq!(arena.used(), 384);

        arena.destroy();
        assert_eq!(arena.capacity(), 0);
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn test_arena_overflow_leaves_state_intact() {
        let mut arena = Arena::new(256);
        let first = arena.push_copy(16, Some(&[7u8; 16])).unwrap();

        let err = arena.push(241).unwrap_err();
        assert_eq!(
            err,
            MemoryError::ArenaOverflow { requested: 241, offset: 16, capacity: 256 }
        );
        assert_eq!(arena.used(), 16);
        assert_eq!(arena.bytes(first).unwrap(), &[7u8; 16]);
    }

    #[test]
    fn test_arena_aligned_push_aligns_absolute_address() {
        let mut arena = Arena::new(512);
        arena.push(3).unwrap();

        let region = arena.push_aligned(32, 64).unwrap();
        assert_eq!((arena.base_address() + region.offset()) % 64, 0);
        assert!(region.offset() >= 3);
    }

    #[test]
    fn test_arena_push_zero_clears_reused_bytes() {
        let mut arena = Arena::new(64);
        let mark = arena.checkpoint();
        arena.push_copy(8, Some(&[0xAB; 8])).unwrap();
        arena.rollback(mark).unwrap();

        let region = arena.push_zero(8).unwrap();
        assert_eq!(arena.bytes(region).unwrap(), &[0u8; 8]);
    }

    #[test]
    fn test_arena_push_copy_without_source_only_reserves() {
        let mut arena = Arena::new(64);
        let region = arena.push_copy(32, None).unwrap();
        assert_eq!(region.len(), 32);
        assert_eq!(arena.used(), 32);

        arena.bytes_mut(region).unwrap()[..4].copy_from_slice(b"lumn");
        assert_eq!(&arena.bytes(region).unwrap()[..4], b"lumn");
    }

    #[test]
    fn test_arena_push_copy_rejects_oversized_source() {
        let mut arena = Arena::new(64);
        let err = arena.push_copy(4, Some(&[1u8; 8])).unwrap_err();
        assert_eq!(err, MemoryError::CopyTooLarge { size: 4, src_len: 8 });
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn test_arena_fallback_cannot_grow() {
        let mut arena = Arena::new(64);
        arena.push(10).unwrap();
        assert_eq!(
            arena.fallback(20),
            Err(MemoryError::InvalidRollback { offset: 20, current: 10 })
        );
        assert_eq!(arena.used(), 10);
    }

    #[test]
    fn test_arena_rolled_back_region_is_unreadable() {
        let mut arena = Arena::new(64);
        let region = arena.push(16).unwrap();
        arena.clear();
        assert!(arena.bytes(region).is_none());
    }

    #[test]
    fn test_arena_pod_round_trip() {
        let mut arena = Arena::new(64);
        arena.push(1).unwrap();
        let region = arena.push_pod(&0xDEAD_BEEF_u32).unwrap();
        assert_eq!(arena.pod::<u32>(region), Some(&0xDEAD_BEEF));
    }

    #[test]
    fn test_arena_zero_sized_push_rejected() {
        let mut arena = Arena::new(8);
        assert_eq!(arena.push(0), Err(MemoryError::ZeroSizedAllocation));
    }

    proptest! {
        #[test]
        fn prop_pushes_are_disjoint_and_increasing(
            sizes in prop::collection::vec(1usize..96, 1..48),
        ) {
            let mut arena = Arena::new(2048);
            let mut last: Option<ArenaRegion> = None;

            for size in sizes {
                match arena.push(size) {
                    Ok(region) => {
                        if let Some(prev) = last {
                            prop_assert!(region.offset() >= prev.end());
                        }
                        last = Some(region);
                    }
                    Err(_) => {
                        let before = arena.used();
                        prop_assert!(before + size > arena.capacity());
                    }
                }
                prop_assert!(arena.used() <= arena.capacity());
            }
        }

        #[test]
        fn prop_rollback_restores_checkpoint(
            prefix in 0usize..256,
            sizes in prop::collection::vec(1usize..64, 0..32),
        ) {
            let mut arena = Arena::new(4096);
            if prefix > 0 {
                arena.push(prefix).unwrap();
            }
            let mark = arena.checkpoint();

            for size in sizes {
                let _ = arena.push(size);
            }

            arena.rollback(mark).unwrap();
            prop_assert_eq!(arena.used(), mark.offset());
        }
    }
}
