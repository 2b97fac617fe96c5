use std::collections::HashMap;

use proptest::prelude::*;
use segalloc::{Arena, BlockPtr, Heap, HeapConfig, MemoryArena};

#[derive(Debug, Clone)]
enum Op {
  Allocate(usize),
  Free(usize),
  Resize(usize, usize),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
  let op = prop_oneof![
    4 => (1usize..2048).prop_map(Op::Allocate),
    3 => any::<usize>().prop_map(Op::Free),
    2 => (any::<usize>(), 0usize..4096).prop_map(|(id, size)| Op::Resize(id, size)),
  ];
  prop::collection::vec(op, 1..200)
}

/// Live allocation: handle, requested length and fill byte.
#[derive(Debug, Clone, Copy)]
struct Live {
  ptr: BlockPtr,
  len: usize,
  fill: u8,
}

fn assert_block_in_bounds(
  heap: &Heap<MemoryArena>,
  live: &Live,
) {
  let info = heap
    .blocks()
    .find(|info| info.ptr == live.ptr)
    .expect("live block should be reachable by a heap walk");

  assert!(info.allocated);
  assert_eq!(info.size % 8, 0);
  assert_eq!(live.ptr.offset() % 8, 0);
  assert!(info.size >= live.len + 8);
  assert!(live.ptr.offset() + info.size <= heap.arena().len());
}

fn assert_content(
  heap: &Heap<MemoryArena>,
  live: &Live,
  len: usize,
) {
  let payload = heap.payload(live.ptr).unwrap();
  assert!(payload[..len].iter().all(|&b| b == live.fill), "content of {:?} changed", live.ptr);
}

proptest! {
  #[test]
  fn heap_invariants_hold_under_random_traffic(ops in ops()) {
    let _ = env_logger::try_init();

    let mut heap = Heap::new(MemoryArena::with_capacity(4 << 20), HeapConfig::default()).unwrap();
    let mut live: HashMap<usize, Live> = HashMap::new();
    let mut next_id = 0usize;

    for op in ops {
      match op {
        Op::Allocate(len) => {
          let Some(ptr) = heap.allocate(len) else { continue };
          let fill = (next_id % 251) as u8;
          heap.payload_mut(ptr).unwrap()[..len].fill(fill);

          let entry = Live { ptr, len, fill };
          assert_block_in_bounds(&heap, &entry);
          live.insert(next_id, entry);
          next_id += 1;
        }
        Op::Free(pick) => {
          if live.is_empty() {
            continue;
          }
          let id = *live.keys().nth(pick % live.len()).unwrap();
          let entry = live.remove(&id).unwrap();
          heap.free(entry.ptr).unwrap();
        }
        Op::Resize(pick, size) => {
          if live.is_empty() {
            continue;
          }
          let id = *live.keys().nth(pick % live.len()).unwrap();
          let entry = live.remove(&id).unwrap();

          match heap.try_resize(Some(entry.ptr), size).unwrap() {
            None => prop_assert_eq!(size, 0),
            Some(ptr) => {
              let kept = entry.len.min(size);
              let moved = Live { ptr, len: kept, fill: entry.fill };
              assert_content(&heap, &moved, kept);

              let grown = Live { ptr, len: size, fill: entry.fill };
              heap.payload_mut(ptr).unwrap()[..size].fill(entry.fill);
              assert_block_in_bounds(&heap, &grown);
              live.insert(id, grown);
            }
          }
        }
      }

      prop_assert_eq!(heap.validate(), Ok(()));
    }

    for entry in live.values() {
      assert_content(&heap, entry, entry.len);
    }

    for entry in live.into_values() {
      heap.free(entry.ptr).unwrap();
    }
    prop_assert_eq!(heap.validate(), Ok(()));
    prop_assert_eq!(heap.stats().free_blocks, 1);
  }

  #[test]
  fn round_trip_of_written_bytes(data in prop::collection::vec(any::<u8>(), 1..1024)) {
    let mut heap = Heap::new(MemoryArena::with_capacity(1 << 16), HeapConfig::default()).unwrap();

    let ptr = heap.allocate(data.len()).unwrap();
    let _neighbour = heap.allocate(32).unwrap();
    heap.payload_mut(ptr).unwrap()[..data.len()].copy_from_slice(&data);

    prop_assert_eq!(&heap.payload(ptr).unwrap()[..data.len()], &data[..]);

    let resized = heap.resize(Some(ptr), data.len() * 3).unwrap();
    prop_assert_eq!(&heap.payload(resized).unwrap()[..data.len()], &data[..]);
    prop_assert!(heap.check());
  }
}
