//! Segregated free-list index.
//!
//! The class table lives at the very start of the arena: one 8-byte slot per
//! class holding the payload offset of the list head (0 when empty). Each
//! free block stores `next` and `parent` links in its payload. `parent` is
//! the offset of whichever word holds the forward link to the block, so a
//! class slot and a predecessor's `next` field are handled the same way and
//! unlinking never needs to know which list the block is on.

use crate::block::{self, LINK, MIN_BLOCK_SIZE};

/// Number of fixed small classes: 24, 32, 40, 48 and 56 bytes.
pub const SMALL_CLASSES: usize = 5;

/// First power-of-two class exponent (`2^6 = 64`).
const MIN_POW: u32 = 6;

/// Last power-of-two class exponent; anything larger goes to the catch-all.
const MAX_POW: u32 = 20;

/// Total number of class slots.
pub const CLASS_COUNT: usize = SMALL_CLASSES + (MAX_POW - MIN_POW + 1) as usize + 1;

/// Bytes taken by the class table at the start of the arena.
pub(crate) const TABLE_SIZE: usize = CLASS_COUNT * LINK;

/// Upper bound of the last small class.
const SMALL_LIMIT: usize = MIN_BLOCK_SIZE + (SMALL_CLASSES - 1) * 8;

/// Maps a block size to the index of the class whose range contains it.
pub fn classify(size: usize) -> usize {
  if size <= SMALL_LIMIT {
    return size.saturating_sub(MIN_BLOCK_SIZE).div_ceil(8);
  }

  if size <= 1 << MAX_POW {
    let pow = size.next_power_of_two().trailing_zeros().max(MIN_POW);
    return SMALL_CLASSES + (pow - MIN_POW) as usize;
  }

  CLASS_COUNT - 1
}

/// Inclusive size range of a class. The catch-all class has no upper bound.
pub fn class_range(class: usize) -> (usize, Option<usize>) {
  match class {
    c if c < SMALL_CLASSES => {
      let size = MIN_BLOCK_SIZE + c * 8;
      let low = if c == 0 { 0 } else { size - 7 };
      (low, Some(size))
    }
    c if c < CLASS_COUNT - 1 => {
      let pow = MIN_POW + (c - SMALL_CLASSES) as u32;
      let low = if pow == MIN_POW { SMALL_LIMIT + 1 } else { (1 << (pow - 1)) + 1 };
      (low, Some(1 << pow))
    }
    _ => ((1 << MAX_POW) + 1, None),
  }
}

/// Whether `size` falls inside the range of `class`.
pub fn class_contains(
  class: usize,
  size: usize,
) -> bool {
  let (low, high) = class_range(class);
  size >= low && high.is_none_or(|high| size <= high)
}

#[inline]
pub(crate) const fn slot_offset(class: usize) -> usize {
  class * LINK
}

/// Head of the list for `class`.
pub(crate) fn head(
  mem: &[u8],
  class: usize,
) -> Option<usize> {
  match block::read_link(mem, slot_offset(class)) {
    0 => None,
    bp => Some(bp),
  }
}

/// Pushes the free block at `bp` onto the front of its class list.
pub(crate) fn insert(
  mem: &mut [u8],
  bp: usize,
  size: usize,
) {
  let class = classify(size);
  let slot = slot_offset(class);
  let first = head(mem, class);

  block::set_next_link(mem, bp, first);
  block::set_parent_link(mem, bp, slot);
  if let Some(first) = first {
    block::set_parent_link(mem, first, bp);
  }
  block::write_link(mem, slot, bp);
}

/// Unlinks the free block at `bp` from whatever list holds it.
pub(crate) fn remove(
  mem: &mut [u8],
  bp: usize,
) {
  let next = block::next_link(mem, bp);
  let parent = block::parent_link(mem, bp);

  block::write_link(mem, parent, next.unwrap_or(0));
  if let Some(next) = next {
    block::set_parent_link(mem, next, parent);
  }
}

/// Walks one class list from its head.
pub(crate) struct FreeList<'a> {
  mem: &'a [u8],
  cursor: Option<usize>,
}

impl<'a> FreeList<'a> {
  pub fn new(
    mem: &'a [u8],
    class: usize,
  ) -> Self {
    Self { mem, cursor: head(mem, class) }
  }
}

impl Iterator for FreeList<'_> {
  type Item = usize;

  fn next(&mut self) -> Option<usize> {
    let bp = self.cursor?;
    self.cursor = block::next_link(self.mem, bp);
    Some(bp)
  }
}
