//! Heap consistency checker and read-only views of the heap.
//!
//! Nothing here is called by the engine itself.

use std::collections::HashSet;

use crate::{
  arena::Arena,
  block::{self, Block, LINK, MIN_BLOCK_SIZE, Tag, WORD},
  class::{self, CLASS_COUNT, FreeList},
  error::Violation,
  heap::{BlockPtr, FIRST_BLOCK, Heap},
};

/// One block as seen by a heap walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub ptr: BlockPtr,
  /// Total block size including both tags.
  pub size: usize,
  pub allocated: bool,
}

/// Totals over every block in the arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub arena_bytes: usize,
  pub allocated_blocks: usize,
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

/// Iterator over the blocks between the prologue and the epilogue.
pub struct Blocks<'a> {
  mem: &'a [u8],
  cursor: usize,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let bp = self.cursor;
    if bp >= self.mem.len() {
      return None;
    }

    let Tag { size, allocated } = block::read_header(self.mem, bp);
    if size == 0 || bp + size > self.mem.len() {
      return None;
    }

    self.cursor = bp + size;
    Some(BlockInfo { ptr: BlockPtr::from_offset(bp), size, allocated })
  }
}

impl<A: Arena> Heap<A> {
  /// Returns `true` when every heap invariant holds.
  pub fn check(&self) -> bool {
    match self.validate() {
      Ok(()) => true,
      Err(violation) => {
        log::debug!("heap check failed: {violation}");
        false
      }
    }
  }

  /// Walks the arena and every class list, reporting the first broken
  /// invariant.
  pub fn validate(&self) -> Result<(), Violation> {
    let mem = self.arena.bytes();
    let free = Self::validate_blocks(mem)?;
    Self::validate_lists(mem, &free)
  }

  /// Returns the offsets of all free blocks in the arena.
  fn validate_blocks(mem: &[u8]) -> Result<HashSet<usize>, Violation> {
    let len = mem.len();
    let mut free = HashSet::new();
    let mut prev_free = None;
    let mut bp = FIRST_BLOCK;

    loop {
      let header = block::read_word(mem, block::header_offset(bp));
      let tag = Tag::decode(header);

      if bp == len {
        if tag == Tag::new(0, true) {
          return Ok(free);
        }
        return Err(Violation::PastEpilogue { offset: bp, size: tag.size, end: len - WORD });
      }
      if header & 0x6 != 0 {
        return Err(Violation::ReservedBits { offset: bp, header });
      }
      if tag.size < MIN_BLOCK_SIZE {
        return Err(Violation::BlockTooSmall { offset: bp, size: tag.size, min: MIN_BLOCK_SIZE });
      }
      if bp + tag.size > len {
        return Err(Violation::PastEpilogue { offset: bp, size: tag.size, end: len - WORD });
      }

      let footer = block::read_word(mem, block::footer_offset(bp, tag.size));
      if footer != header {
        return Err(Violation::TagMismatch { offset: bp, header, footer });
      }

      if tag.allocated {
        prev_free = None;
      } else {
        if let Some(prev) = prev_free {
          return Err(Violation::AdjacentFree { offset: prev, next: bp });
        }
        prev_free = Some(bp);
        free.insert(bp);
      }

      bp += tag.size;
    }
  }

  fn validate_lists(
    mem: &[u8],
    free: &HashSet<usize>,
  ) -> Result<(), Violation> {
    let max_nodes = free.len();
    let mut listed = 0;

    for class in 0..CLASS_COUNT {
      let mut expected_parent = class::slot_offset(class);
      let mut cursor = class::head(mem, class);
      let mut seen = 0;

      while let Some(bp) = cursor {
        seen += 1;
        if seen > max_nodes + 1 {
          return Err(Violation::Cycle { class });
        }

        if bp < FIRST_BLOCK || bp + 2 * LINK > mem.len() {
          return Err(Violation::StrayLink { class, offset: bp });
        }

        match Block::view(mem, bp) {
          Block::Allocated { size } => {
            return Err(Violation::AllocatedInFreeList { class, offset: bp, size });
          }
          Block::Free { size, next, parent } => {
            if !free.contains(&bp) {
              return Err(Violation::StrayLink { class, offset: bp });
            }
            if !class::class_contains(class, size) {
              return Err(Violation::Misclassified { class, offset: bp, size });
            }
            if parent != expected_parent {
              return Err(Violation::BrokenParent {
                class,
                offset: bp,
                expected: expected_parent,
                actual: parent,
              });
            }

            expected_parent = bp;
            cursor = next;
          }
        }
      }

      listed += seen;
    }

    if listed != free.len() {
      return Err(Violation::FreeCountMismatch { in_arena: free.len(), in_lists: listed });
    }

    Ok(())
  }

  /// Every block from the first usable one up to the epilogue, in address
  /// order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks { mem: self.arena.bytes(), cursor: FIRST_BLOCK }
  }

  /// Free blocks on the list of `class`, most recently freed first.
  pub fn free_blocks(
    &self,
    class: usize,
  ) -> impl Iterator<Item = BlockPtr> + '_ {
    let mem = self.arena.bytes();
    (class < CLASS_COUNT)
      .then(|| FreeList::new(mem, class))
      .into_iter()
      .flatten()
      .map(BlockPtr::from_offset)
  }

  pub fn stats(&self) -> HeapStats {
    self.blocks().fold(
      HeapStats { arena_bytes: self.arena.len(), ..HeapStats::default() },
      |mut stats, info| {
        if info.allocated {
          stats.allocated_blocks += 1;
          stats.allocated_bytes += info.size;
        } else {
          stats.free_blocks += 1;
          stats.free_bytes += info.size;
          stats.largest_free = stats.largest_free.max(info.size);
        }
        stats
      },
    )
  }

  /// Logs every block and every class list at debug level.
  pub fn dump(&self) {
    if !log::log_enabled!(log::Level::Debug) {
      return;
    }

    log::debug!("heap {:#x}..={:#x}", self.arena.low(), self.arena.high());
    for info in self.blocks() {
      log::debug!(
        "  {:#08x} | size {:>8} | {}",
        info.ptr.offset(),
        info.size,
        if info.allocated { "allocated" } else { "free" }
      );
    }

    for class in 0..CLASS_COUNT {
      let members: Vec<_> = self.free_blocks(class).map(|p| p.offset()).collect();
      if members.is_empty() {
        continue;
      }
      let (low, high) = class::class_range(class);
      match high {
        Some(high) => log::debug!("  class {class} [{low}, {high}]: {members:#x?}"),
        None => log::debug!("  class {class} [{low}, ..): {members:#x?}"),
      }
    }
  }
}
