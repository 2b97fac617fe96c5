//! The allocator engine.
//!
//! Arena layout after initialization:
//!
//! ```text
//!   0              168   172   176   180   184
//!   ┌───────────────┬─────┬─────┬─────┬─────┬──────────────────┬─────┐
//!   │ class table   │ pad │ PH  │ PF  │ hdr │  first block ... │ EH  │
//!   │ 21 × 8 bytes  │     │ 8|1 │ 8|1 │     │                  │ 0|1 │
//!   └───────────────┴─────┴─────┴─────┴─────┴──────────────────┴─────┘
//!                         prologue    ▲ first payload (8-aligned)  ▲ epilogue
//! ```
//!
//! Blocks are addressed by the offset of their payload inside the arena.

use crate::{
  align::ALIGNMENT,
  arena::Arena,
  block::{self, DWORD, LINK, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, Tag, WORD},
  class::{self, CLASS_COUNT, FreeList, TABLE_SIZE},
  config::{FreePolicy, HeapConfig},
  error::{HeapError, InvalidReason},
};

/// Payload offset of the prologue block.
const PROLOGUE: usize = TABLE_SIZE + DWORD;

/// Payload offset of the first real block.
pub(crate) const FIRST_BLOCK: usize = PROLOGUE + DWORD;

/// Bytes taken by the table, padding, prologue and epilogue.
const INIT_SIZE: usize = TABLE_SIZE + 4 * WORD;

/// Handle to an allocated block: the payload offset from the arena base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockPtr(usize);

impl BlockPtr {
  /// Wraps a raw arena offset. Nothing is validated until the handle is used.
  pub const fn from_offset(offset: usize) -> Self {
    Self(offset)
  }

  pub const fn offset(self) -> usize {
    self.0
  }
}

/// Rounds a request up to a block size: payload aligned to 8 plus both tags,
/// never below the minimum block.
pub(crate) fn block_size(requested: usize) -> Result<usize, HeapError> {
  if requested <= 2 * DWORD {
    return Ok(MIN_BLOCK_SIZE);
  }

  requested
    .checked_add(DWORD + ALIGNMENT - 1)
    .map(|size| size & !(ALIGNMENT - 1))
    .filter(|&size| size <= MAX_BLOCK_SIZE)
    .ok_or(HeapError::SizeOverflow { requested })
}

/// A segregated-fit heap over a single arena.
///
/// All operations run to completion on `&mut self`; the type is not meant to
/// be shared between threads.
pub struct Heap<A: Arena> {
  pub(crate) arena: A,
  config: HeapConfig,
}

impl<A: Arena> Heap<A> {
  /// Lays out the class table and sentinels in an empty arena and seeds it
  /// with one chunk of free space.
  pub fn new(
    mut arena: A,
    config: HeapConfig,
  ) -> Result<Self, HeapError> {
    if !arena.is_empty() {
      return Err(HeapError::ArenaInUse { len: arena.len() });
    }

    let start = arena
      .grow(INIT_SIZE)
      .ok_or(HeapError::ArenaExhausted { requested: INIT_SIZE })?;
    debug_assert_eq!(start, 0);

    let mem = arena.bytes_mut();
    mem[..TABLE_SIZE].fill(0);
    block::write_word(mem, TABLE_SIZE, 0);
    block::write_tags(mem, PROLOGUE, Tag::new(DWORD, true));
    block::write_word(mem, block::header_offset(FIRST_BLOCK), Tag::new(0, true).encode());

    let mut heap = Self { arena, config };
    let chunk = heap.config.chunk_size();
    heap
      .extend(chunk)
      .ok_or(HeapError::ArenaExhausted { requested: chunk })?;

    log::debug!(
      "heap initialized: {} bytes at {:#x}, chunk size {}",
      heap.arena.len(),
      heap.arena.low(),
      chunk
    );

    Ok(heap)
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn arena(&self) -> &A {
    &self.arena
  }

  pub fn into_arena(self) -> A {
    self.arena
  }

  /// Grows the arena by at least `bytes`, turns the new space into a free
  /// block and merges it with a free block ending at the old break.
  fn extend(
    &mut self,
    bytes: usize,
  ) -> Option<usize> {
    let size = crate::align!(bytes.max(MIN_BLOCK_SIZE));
    if self.arena.len().checked_add(size)? > MAX_BLOCK_SIZE {
      log::debug!("refusing to grow arena past {MAX_BLOCK_SIZE} bytes");
      return None;
    }

    // The old epilogue header becomes the new block's header.
    let bp = self.arena.grow(size)?;
    log::debug!("arena grew by {size} bytes to {}", self.arena.len());

    let mem = self.arena.bytes_mut();
    block::write_tags(mem, bp, Tag::new(size, false));
    block::write_word(mem, block::header_offset(bp + size), Tag::new(0, true).encode());

    Some(self.coalesce(bp))
  }

  /// Allocates a block with at least `size` usable bytes.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<BlockPtr, HeapError> {
    if size == 0 {
      return Err(HeapError::ZeroSize);
    }

    let asize = block_size(size)?;
    let bp = match self.find_fit(asize) {
      Some(bp) => bp,
      None => {
        let grow = asize.max(self.config.chunk_size());
        self
          .extend(grow)
          .ok_or(HeapError::ArenaExhausted { requested: grow })?
      }
    };

    self.place(bp, asize);
    log::trace!("allocate({size}) -> {bp:#x} [{asize} bytes]");

    Ok(BlockPtr(bp))
  }

  /// Like [`try_allocate`](Self::try_allocate), but returns `None` for zero
  /// sized requests and when the arena is exhausted.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<BlockPtr> {
    self.try_allocate(size).ok()
  }

  /// First fit within the starting class, then ascending classes.
  fn find_fit(
    &self,
    asize: usize,
  ) -> Option<usize> {
    let mem = self.arena.bytes();

    (class::classify(asize)..CLASS_COUNT).find_map(|class| {
      FreeList::new(mem, class).find(|&bp| block::read_header(mem, bp).size >= asize)
    })
  }

  /// Marks the free block at `bp` allocated, splitting off the tail when it
  /// can stand on its own as a free block.
  fn place(
    &mut self,
    bp: usize,
    asize: usize,
  ) {
    let mem = self.arena.bytes_mut();
    let csize = block::read_header(mem, bp).size;

    class::remove(mem, bp);

    if csize - asize >= MIN_BLOCK_SIZE {
      block::write_tags(mem, bp, Tag::new(asize, true));

      let rest = bp + asize;
      block::write_tags(mem, rest, Tag::new(csize - asize, false));
      class::insert(mem, rest, csize - asize);
    } else {
      block::write_tags(mem, bp, Tag::new(csize, true));
    }
  }

  /// Releases the block behind `ptr`.
  ///
  /// Pointers that do not name an allocated block are ignored under
  /// [`FreePolicy::Permissive`] and returned as errors under
  /// [`FreePolicy::Strict`]. The heap is never modified for them.
  pub fn free(
    &mut self,
    ptr: BlockPtr,
  ) -> Result<(), HeapError> {
    let size = match self.checked_block(ptr) {
      Ok(size) => size,
      Err(err) => return self.reject(err),
    };

    let bp = ptr.0;
    block::write_tags(self.arena.bytes_mut(), bp, Tag::new(size, false));
    let merged = self.coalesce(bp);
    log::trace!("free({bp:#x}) [{size} bytes] -> free block {merged:#x}");

    Ok(())
  }

  fn reject(
    &self,
    err: HeapError,
  ) -> Result<(), HeapError> {
    match self.config.free_policy() {
      FreePolicy::Permissive => {
        log::debug!("ignoring free: {err}");
        Ok(())
      }
      FreePolicy::Strict => {
        log::warn!("rejecting free: {err}");
        Err(err)
      }
    }
  }

  /// Merges the free block at `bp` with free neighbours and files the result
  /// on its class list. Returns the payload offset of the merged block.
  fn coalesce(
    &mut self,
    bp: usize,
  ) -> usize {
    let mem = self.arena.bytes_mut();

    let prev = block::prev_block(mem, bp)
      .map(|prev| (prev, block::read_header(mem, prev)))
      .filter(|(_, tag)| !tag.allocated);
    let next = block::next_block(mem, bp);
    let next_tag = block::read_header(mem, next);
    let size = block::read_header(mem, bp).size;

    let (bp, size) = match (prev, next_tag.allocated) {
      (None, true) => (bp, size),
      (None, false) => {
        class::remove(mem, next);
        (bp, size + next_tag.size)
      }
      (Some((prev, prev_tag)), true) => {
        class::remove(mem, prev);
        (prev, size + prev_tag.size)
      }
      (Some((prev, prev_tag)), false) => {
        class::remove(mem, prev);
        class::remove(mem, next);
        (prev, size + prev_tag.size + next_tag.size)
      }
    };

    block::write_tags(mem, bp, Tag::new(size, false));
    class::insert(mem, bp, size);

    bp
  }

  /// Resizes the block behind `ptr`, preserving the first
  /// `min(old, new)` payload bytes.
  ///
  /// `size == 0` frees the block and yields `Ok(None)`; `ptr == None`
  /// allocates. Growth first tries to absorb a free successor; otherwise the
  /// content moves to a fresh block. Shrinking always stays in place.
  pub fn try_resize(
    &mut self,
    ptr: Option<BlockPtr>,
    size: usize,
  ) -> Result<Option<BlockPtr>, HeapError> {
    if size == 0 {
      if let Some(ptr) = ptr {
        self.free(ptr)?;
      }
      return Ok(None);
    }

    let Some(ptr) = ptr else {
      return self.try_allocate(size).map(Some);
    };

    let old = self.checked_block(ptr)?;
    let asize = block_size(size)?;
    let bp = ptr.0;

    if asize <= old {
      self.shrink_in_place(bp, old, asize);
      log::trace!("resize({bp:#x}, {size}) shrank in place");
      return Ok(Some(ptr));
    }

    if self.grow_in_place(bp, old, asize) {
      log::trace!("resize({bp:#x}, {size}) grew in place");
      return Ok(Some(ptr));
    }

    let moved = self.try_allocate(size)?;
    let count = (old - DWORD).min(size);
    self
      .arena
      .bytes_mut()
      .copy_within(bp..bp + count, moved.0);
    self.free(ptr)?;
    log::trace!("resize({bp:#x}, {size}) moved to {:#x}", moved.0);

    Ok(Some(moved))
  }

  /// Like [`try_resize`](Self::try_resize), collapsing every failure and the
  /// freeing case to `None`.
  pub fn resize(
    &mut self,
    ptr: Option<BlockPtr>,
    size: usize,
  ) -> Option<BlockPtr> {
    self.try_resize(ptr, size).ok().flatten()
  }

  fn shrink_in_place(
    &mut self,
    bp: usize,
    old: usize,
    asize: usize,
  ) {
    let rest = old - asize;
    if rest < MIN_BLOCK_SIZE {
      return;
    }

    let mem = self.arena.bytes_mut();
    block::write_tags(mem, bp, Tag::new(asize, true));
    block::write_tags(mem, bp + asize, Tag::new(rest, false));
    self.coalesce(bp + asize);
  }

  fn grow_in_place(
    &mut self,
    bp: usize,
    old: usize,
    asize: usize,
  ) -> bool {
    let mem = self.arena.bytes_mut();
    let next = bp + old;
    let next_tag = block::read_header(mem, next);

    if next_tag.allocated || old + next_tag.size < asize {
      return false;
    }

    class::remove(mem, next);
    let total = old + next_tag.size;

    if total - asize >= MIN_BLOCK_SIZE {
      block::write_tags(mem, bp, Tag::new(asize, true));

      let rest = bp + asize;
      block::write_tags(mem, rest, Tag::new(total - asize, false));
      class::insert(mem, rest, total - asize);
    } else {
      block::write_tags(mem, bp, Tag::new(total, true));
    }

    true
  }

  /// Validates that `ptr` names an allocated block and returns its size.
  fn checked_block(
    &self,
    ptr: BlockPtr,
  ) -> Result<usize, HeapError> {
    self
      .block_at(ptr.0)
      .map_err(|reason| HeapError::InvalidPointer { offset: ptr.0, reason })
  }

  fn block_at(
    &self,
    bp: usize,
  ) -> Result<usize, InvalidReason> {
    let mem = self.arena.bytes();

    if bp < FIRST_BLOCK || bp >= mem.len() {
      return Err(InvalidReason::OutOfBounds);
    }
    if bp % ALIGNMENT != 0 {
      return Err(InvalidReason::Misaligned);
    }

    let header = block::read_word(mem, block::header_offset(bp));
    let tag = Tag::decode(header);
    if !tag.allocated {
      return Err(InvalidReason::NotAllocated);
    }
    let fits = bp.checked_add(tag.size).is_some_and(|end| end <= mem.len());
    if tag.size < MIN_BLOCK_SIZE || !fits {
      return Err(InvalidReason::CorruptTags);
    }
    if block::read_word(mem, block::footer_offset(bp, tag.size)) != header {
      return Err(InvalidReason::CorruptTags);
    }
    if !Self::sound_prev(mem, bp) || !Self::sound_next(mem, bp + tag.size) {
      return Err(InvalidReason::BrokenChain);
    }

    Ok(tag.size)
  }

  /// The footer before `bp` must name a block that starts at or after the
  /// prologue, carries a matching header and ends exactly at `bp`.
  fn sound_prev(
    mem: &[u8],
    bp: usize,
  ) -> bool {
    let footer = block::read_word(mem, bp - DWORD);
    let tag = Tag::decode(footer);
    let Some(prev) = block::prev_block(mem, bp) else {
      return false;
    };

    if prev < PROLOGUE || (prev != PROLOGUE && tag.size < MIN_BLOCK_SIZE) {
      return false;
    }
    if block::read_word(mem, block::header_offset(prev)) != footer {
      return false;
    }

    tag.allocated || Self::sound_links(mem, prev)
  }

  /// The block at `next` must be the epilogue or a whole block inside the
  /// arena with matching tags.
  fn sound_next(
    mem: &[u8],
    next: usize,
  ) -> bool {
    let header = block::read_word(mem, block::header_offset(next));
    let tag = Tag::decode(header);

    if next == mem.len() {
      return tag == Tag::new(0, true);
    }
    let fits = next.checked_add(tag.size).is_some_and(|end| end <= mem.len());
    if tag.size < MIN_BLOCK_SIZE || !fits {
      return false;
    }
    if block::read_word(mem, block::footer_offset(next, tag.size)) != header {
      return false;
    }

    tag.allocated || Self::sound_links(mem, next)
  }

  /// A free neighbour is about to be unlinked: its parent word must point
  /// back at it and its successor must be writable.
  fn sound_links(
    mem: &[u8],
    bp: usize,
  ) -> bool {
    let parent = block::parent_link(mem, bp);
    let parent_ok = (parent < TABLE_SIZE || parent >= FIRST_BLOCK)
      && parent % ALIGNMENT == 0
      && parent.checked_add(LINK).is_some_and(|end| end <= mem.len())
      && block::read_link(mem, parent) == bp;

    let next_ok = match block::next_link(mem, bp) {
      None => true,
      Some(next) => {
        next >= FIRST_BLOCK && next.checked_add(2 * LINK).is_some_and(|end| end <= mem.len())
      }
    };

    parent_ok && next_ok
  }

  /// Usable payload bytes of an allocated block.
  pub fn usable_size(
    &self,
    ptr: BlockPtr,
  ) -> Result<usize, HeapError> {
    Ok(self.checked_block(ptr)? - DWORD)
  }

  pub fn payload(
    &self,
    ptr: BlockPtr,
  ) -> Result<&[u8], HeapError> {
    let size = self.checked_block(ptr)?;
    Ok(&self.arena.bytes()[ptr.0..ptr.0 + size - DWORD])
  }

  pub fn payload_mut(
    &mut self,
    ptr: BlockPtr,
  ) -> Result<&mut [u8], HeapError> {
    let size = self.checked_block(ptr)?;
    Ok(&mut self.arena.bytes_mut()[ptr.0..ptr.0 + size - DWORD])
  }

  /// Raw address of an allocated block's payload.
  pub fn as_mut_ptr(
    &mut self,
    ptr: BlockPtr,
  ) -> Result<*mut u8, HeapError> {
    self.checked_block(ptr)?;
    Ok(unsafe { self.arena.as_mut_ptr().add(ptr.0) })
  }
}
