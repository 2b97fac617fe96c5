use segalloc::{
  Arena, BlockPtr, FreePolicy, Heap, HeapConfig, HeapError, InvalidReason, MIN_BLOCK_SIZE, MemoryArena,
  class,
};

fn heap() -> Heap<MemoryArena> {
  let _ = env_logger::try_init();
  Heap::new(MemoryArena::with_capacity(1 << 20), HeapConfig::default()).unwrap()
}

fn block_size(
  heap: &Heap<MemoryArena>,
  ptr: BlockPtr,
) -> usize {
  heap
    .blocks()
    .find(|info| info.ptr == ptr)
    .map(|info| info.size)
    .unwrap()
}

#[test]
fn test_small_allocation_gets_minimum_block() {
  let mut heap = heap();

  let p = heap.allocate(16).unwrap();

  assert_eq!(block_size(&heap, p), MIN_BLOCK_SIZE);
  assert!(heap.check());
}

#[test]
fn test_freed_block_lands_in_its_class() {
  let mut heap = heap();

  let p1 = heap.allocate(16).unwrap();
  let p2 = heap.allocate(100).unwrap();
  assert_eq!(block_size(&heap, p2), 112);

  heap.free(p1).unwrap();

  assert!(heap.check());
  assert!(heap.free_blocks(class::classify(24)).any(|p| p == p1));
}

#[test]
fn test_adjacent_frees_merge() {
  let mut heap = heap();

  let p1 = heap.allocate(40).unwrap();
  let p2 = heap.allocate(40).unwrap();
  let s1 = block_size(&heap, p1);
  let s2 = block_size(&heap, p2);
  assert_eq!(p1.offset() + s1, p2.offset());

  heap.free(p1).unwrap();
  heap.free(p2).unwrap();

  assert!(heap.check());
  let free: Vec<_> = heap.blocks().filter(|info| !info.allocated).collect();
  assert_eq!(free.len(), 1);
  assert_eq!(free[0].ptr, p1);
  assert!(free[0].size >= s1 + s2);
  assert_eq!(heap.stats().free_blocks, 1);
}

#[test]
fn test_shrink_keeps_address_and_content() {
  let mut heap = heap();

  let p = heap.allocate(200).unwrap();
  for (i, byte) in heap.payload_mut(p).unwrap().iter_mut().enumerate() {
    *byte = i as u8;
  }

  let p2 = heap.resize(Some(p), 50).unwrap();

  assert_eq!(p2, p);
  let expected: Vec<u8> = (0..50).collect();
  assert_eq!(&heap.payload(p2).unwrap()[..50], &expected[..]);
  assert!(heap.check());
}

#[test]
fn test_foreign_pointers_do_not_corrupt() {
  let mut heap = heap();
  let p = heap.allocate(64).unwrap();
  heap.payload_mut(p).unwrap().fill(0);

  heap.free(BlockPtr::from_offset(12_345_678)).unwrap();
  heap.free(BlockPtr::from_offset(p.offset() + 8)).unwrap();
  heap.free(BlockPtr::from_offset(p.offset() + 1)).unwrap();
  heap.free(BlockPtr::from_offset(0)).unwrap();

  assert!(heap.check());
  assert_eq!(heap.usable_size(p), Ok(64));
}

#[test]
fn test_tags_forged_inside_a_payload_are_ignored() {
  let mut heap = heap();
  let p = heap.allocate(64).unwrap();
  let _guard = heap.allocate(16).unwrap();
  let allocated = (24u32 | 1).to_ne_bytes();

  for prev_footer in [0xFFFF_FFF0u32.to_ne_bytes(), allocated] {
    let payload = heap.payload_mut(p).unwrap();
    payload[0..4].copy_from_slice(&prev_footer);
    payload[4..8].copy_from_slice(&allocated);
    payload[24..28].copy_from_slice(&allocated);
    let snapshot = payload.to_vec();

    heap.free(BlockPtr::from_offset(p.offset() + 8)).unwrap();

    assert!(heap.check());
    assert_eq!(heap.payload(p).unwrap(), &snapshot[..]);
    assert_eq!(heap.stats().free_blocks, 1);
  }
}

#[test]
fn test_strict_policy_surfaces_bad_frees() {
  let _ = env_logger::try_init();
  let config = HeapConfig::default().with_free_policy(FreePolicy::Strict);
  let mut heap = Heap::new(MemoryArena::with_capacity(1 << 16), config).unwrap();

  let err = heap.free(BlockPtr::from_offset(12_345_678)).unwrap_err();
  assert_eq!(
    err,
    HeapError::InvalidPointer { offset: 12_345_678, reason: InvalidReason::OutOfBounds }
  );
  assert!(heap.check());
}

#[test]
fn test_allocation_fails_cleanly_when_arena_is_full() {
  let _ = env_logger::try_init();
  let mut heap = Heap::new(MemoryArena::with_capacity(4096), HeapConfig::default()).unwrap();

  let mut live = Vec::new();
  while let Some(p) = heap.allocate(100) {
    live.push(p);
  }

  assert!(!live.is_empty());
  assert!(heap.check());
  assert!(heap.arena().len() <= 4096);

  for p in live.drain(..) {
    heap.free(p).unwrap();
  }
  assert!(heap.check());
  assert_eq!(heap.stats().free_blocks, 1);
}

#[test]
fn test_larger_chunk_size_reduces_growth() {
  let _ = env_logger::try_init();
  let config = HeapConfig::default().with_chunk_size(4096);
  let mut heap = Heap::new(MemoryArena::with_capacity(1 << 16), config).unwrap();
  let len = heap.arena().len();

  for _ in 0..10 {
    heap.allocate(100).unwrap();
  }

  assert_eq!(heap.arena().len(), len);
  assert!(heap.check());
}

#[test]
fn test_large_blocks_use_catch_all_class() {
  let mut heap = Heap::new(MemoryArena::with_capacity(8 << 20), HeapConfig::default()).unwrap();

  let big = heap.allocate(3 << 20).unwrap();
  let _guard = heap.allocate(16).unwrap();
  heap.free(big).unwrap();

  assert!(heap.free_blocks(class::CLASS_COUNT - 1).any(|p| p == big));
  assert_eq!(heap.allocate((2 << 20) + 1), Some(big));
  assert!(heap.check());
}

#[test]
fn test_resize_that_cannot_grow_leaves_block_untouched() {
  let _ = env_logger::try_init();
  let mut heap = Heap::new(MemoryArena::with_capacity(1024), HeapConfig::default()).unwrap();

  let p = heap.allocate(100).unwrap();
  let _guard = heap.allocate(16).unwrap();
  let content: Vec<u8> = (0..100).collect();
  heap.payload_mut(p).unwrap()[..100].copy_from_slice(&content);
  let len = heap.arena().len();
  let size = block_size(&heap, p);

  assert_eq!(
    heap.try_resize(Some(p), 2000),
    Err(HeapError::ArenaExhausted { requested: 2008 })
  );
  assert_eq!(heap.resize(Some(p), 2000), None);

  assert_eq!(heap.arena().len(), len);
  assert_eq!(block_size(&heap, p), size);
  assert!(heap.blocks().any(|info| info.ptr == p && info.allocated));
  assert_eq!(&heap.payload(p).unwrap()[..100], &content[..]);
  assert_eq!(heap.validate(), Ok(()));
}
