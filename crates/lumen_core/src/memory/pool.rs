//! # Pool Allocator
//!
//! Fixed-capacity slot allocator for objects of one type. Unused slots are
//! threaded into an intrusive free list; each slot carries a generation that
//! is bumped on free, so a handle that outlived its slot is detected instead
//! of silently aliasing the next occupant.

use crate::error::{MemoryError, MemoryResult};

/// Handle to an object living in a [`Pool`].
///
/// A handle is an index plus the generation of the slot at allocation time.
/// Two live handles from one pool never compare equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolHandle {
    index: u32,
    generation: u32,
}

impl PoolHandle {
    /// Slot index. Stable for the lifetime of the allocation.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation at allocation time.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

enum Slot<T> {
    Occupied(T),
    Vacant { next_free: Option<u32> },
}

struct Entry<T> {
    generation: u32,
    slot: Slot<T>,
}

/// A pool allocator with a hard capacity.
///
/// Capacity is fixed at construction and never grows; exhaustion is reported
/// as [`MemoryError::PoolExhausted`]. Freed slots are reused LIFO.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. It is owned by the renderer and mutated on
/// the render thread only.
///
/// # Example
///
/// ```rust
/// use lumen_core::Pool;
///
/// let mut pool: Pool<&str> = Pool::new(2);
/// let a = pool.alloc("vertex buffer").unwrap();
/// assert_eq!(pool.free(a).unwrap(), "vertex buffer");
///
/// // Same slot, new generation: the old handle is dead.
/// let b = pool.alloc("index buffer").unwrap();
/// assert_eq!(a.index(), b.index());
/// assert!(pool.get(a).is_err());
/// ```
pub struct Pool<T> {
    /// Slot storage, allocated once.
    entries: Box<[Entry<T>]>,
    /// Head of the free list.
    free_head: Option<u32>,
    /// Number of occupied slots.
    allocated_count: usize,
}

impl<T> Pool<T> {
    /// Creates a pool with `capacity` free slots.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of live objects
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        let entries: Vec<Entry<T>> = (0..capacity)
            .map(|i| Entry {
                generation: 0,
                slot: Slot::Vacant {
                    next_free: (i + 1 < capacity).then_some(i + 1),
                },
            })
            .collect();

        Self {
            entries: entries.into_boxed_slice(),
            free_head: (capacity > 0).then_some(0),
            allocated_count: 0,
        }
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of live objects.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.capacity() - self.allocated_count
    }

    /// Places `value` in the slot at the head of the free list.
    ///
    /// # Errors
    ///
    /// [`MemoryError::PoolExhausted`] when every slot is in use.
    pub fn alloc(&mut self, value: T) -> MemoryResult<PoolHandle> {
        let index = self.free_head.ok_or(MemoryError::PoolExhausted {
            capacity: self.capacity(),
        })?;

        let entry = &mut self.entries[index as usize];
        let Slot::Vacant { next_free } = entry.slot else {
            unreachable!("free list points at an occupied slot");
        };

        self.free_head = next_free;
        entry.slot = Slot::Occupied(value);
        self.allocated_count += 1;

        Ok(PoolHandle {
            index,
            generation: entry.generation,
        })
    }

    /// Returns the slot behind `handle` to the head of the free list.
    ///
    /// # Errors
    ///
    /// [`MemoryError::StaleHandle`] if the handle does not name a live slot
    /// (double free, or a handle from an earlier generation).
    pub fn free(&mut self, handle: PoolHandle) -> MemoryResult<T> {
        self.check(handle)?;

        let entry = &mut self.entries[handle.index as usize];
        let previous = std::mem::replace(
            &mut entry.slot,
            Slot::Vacant {
                next_free: self.free_head,
            },
        );
        entry.generation = entry.generation.wrapping_add(1);
        self.free_head = Some(handle.index);
        self.allocated_count -= 1;

        match previous {
            Slot::Occupied(value) => Ok(value),
            Slot::Vacant { .. } => unreachable!("checked handle named a vacant slot"),
        }
    }

    /// Gets a reference to a live object.
    ///
    /// # Errors
    ///
    /// [`MemoryError::StaleHandle`] for a dead handle.
    pub fn get(&self, handle: PoolHandle) -> MemoryResult<&T> {
        match self.entries.get(handle.index as usize) {
            Some(Entry {
                generation,
                slot: Slot::Occupied(value),
            }) if *generation == handle.generation => Ok(value),
            _ => Err(stale(handle)),
        }
    }

    /// Gets a mutable reference to a live object.
    ///
    /// # Errors
    ///
    /// [`MemoryError::StaleHandle`] for a dead handle.
    pub fn get_mut(&mut self, handle: PoolHandle) -> MemoryResult<&mut T> {
        match self.entries.get_mut(handle.index as usize) {
            Some(Entry {
                generation,
                slot: Slot::Occupied(value),
            }) if *generation == handle.generation => Ok(value),
            _ => Err(stale(handle)),
        }
    }

    /// Returns `true` if `handle` names a live object.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: PoolHandle) -> bool {
        self.get(handle).is_ok()
    }

    /// Iterates over live objects and their handles, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, entry)| match &entry.slot {
            Slot::Occupied(value) => Some((
                PoolHandle {
                    index: u32::try_from(i).ok()?,
                    generation: entry.generation,
                },
                value,
            )),
            Slot::Vacant { .. } => None,
        })
    }

    /// Frees every live object, invalidating all outstanding handles.
    pub fn clear(&mut self) {
        let capacity = self.entries.len();
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if matches!(entry.slot, Slot::Occupied(_)) {
                entry.generation = entry.generation.wrapping_add(1);
            }
            let next = i + 1;
            entry.slot = Slot::Vacant {
                next_free: if next < capacity { u32::try_from(next).ok() } else { None },
            };
        }
        self.free_head = (capacity > 0).then_some(0);
        self.allocated_count = 0;
    }

    fn check(&self, handle: PoolHandle) -> MemoryResult<()> {
        self.get(handle).map(|_| ())
    }
}

fn stale(handle: PoolHandle) -> MemoryError {
    MemoryError::StaleHandle {
        index: handle.index,
        generation: handle.generation,
    }
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.capacity())
            .field("allocated", &self.allocated_count)
            .finish_non_exhaustive()
    }
}
