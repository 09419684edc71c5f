//! Integration tests for the arena and pool as the renderer drives them.

use lumen_core::{Arena, MemoryError, Pool};

#[test]
fn test_arena_sequential_pushes_then_destroy() {
    let mut arena = Arena::new(1024);

    let regions: Vec<_> = (0..3).map(|_| arena.push(128).unwrap()).collect();
    let offsets: Vec<usize> = regions.iter().map(|r| r.offset()).collect();
    assert_eq!(offsets, vec![0, 128, 256]);
    assert_eq!(arena.used(), 384);
    assert_eq!(arena.remaining(), 640);
    assert!(!regions[0].overlaps(&regions[1]));

    arena.destroy();
    assert_eq!(arena.capacity(), 0);
    assert_eq!(arena.used(), 0);
    assert!(matches!(arena.push(1), Err(MemoryError::ArenaOverflow { .. })));
}

#[test]
fn test_arena_frame_reuse() {
    let mut arena = Arena::new(4096);

    for frame in 0u32..8 {
        arena.clear();
        let constants = arena.push_pod(&[frame; 4]).unwrap();
        let scratch = arena.push_zero_aligned(256, 64).unwrap();
        assert_eq!(arena.pod::<[u32; 4]>(constants), Some(&[frame; 4]));
        assert_eq!(arena.bytes(scratch).unwrap(), &[0u8; 256][..]);
    }
}

#[test]
fn test_pool_reuses_freed_slot() {
    let mut pool: Pool<&str> = Pool::new(4);

    let handles: Vec<_> = ["a", "b", "c", "d"].into_iter().map(|v| pool.alloc(v).unwrap()).collect();
    assert_eq!(pool.alloc("e"), Err(MemoryError::PoolExhausted { capacity: 4 }));

    assert_eq!(pool.free(handles[2]), Ok("c"));
    let again = pool.alloc("e").unwrap();
    assert_eq!(again.index(), handles[2].index());
    assert_ne!(again.generation(), handles[2].generation());

    // The old handle names a slot that has moved on.
    assert!(pool.get(handles[2]).is_err());
    assert_eq!(pool.get(again), Ok(&"e"));
    assert_eq!(pool.free_count(), 0);
}

#[test]
fn test_pool_double_free_is_reported() {
    let mut pool: Pool<u64> = Pool::new(2);
    let handle = pool.alloc(9).unwrap();
    pool.free(handle).unwrap();

    assert_eq!(
        pool.free(handle),
        Err(MemoryError::StaleHandle { index: handle.index(), generation: handle.generation() })
    );
    assert_eq!(pool.allocated_count(), 0);
}
