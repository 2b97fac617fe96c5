//! Host memory-region service.
//!
//! The engine never talks to a system allocator for its traffic; all space
//! comes from an [`Arena`], a single contiguous region that only grows.
//!
//! ```text
//!   low()                                   high()
//!   ┌────────────────────────────────────────┐......................
//!   │             managed bytes              │  grow(n) appends here
//!   └────────────────────────────────────────┘......................
//!   0                                       len()
//! ```

use std::{alloc, ptr, slice};

use crate::{align, block::MAX_BLOCK_SIZE};

/// A contiguous, grow-only memory region.
///
/// # Safety
///
/// Implementors must guarantee that `as_ptr()..as_ptr() + len()` is valid for
/// reads and writes, is 8-byte aligned, stays at the same address for the
/// lifetime of the arena, and that bytes already handed out are preserved by
/// `grow`.
pub unsafe trait Arena {
  /// Extends the region by `increment` bytes and returns the offset of the
  /// first new byte, or `None` if the region cannot grow.
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<usize>;

  /// Number of bytes currently in the region.
  fn len(&self) -> usize;

  fn as_ptr(&self) -> *const u8;

  fn as_mut_ptr(&mut self) -> *mut u8;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Address of the first byte of the region.
  fn low(&self) -> usize {
    self.as_ptr() as usize
  }

  /// Address of the last byte of the region.
  fn high(&self) -> usize {
    self.low() + self.len().saturating_sub(1)
  }

  fn bytes(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.as_ptr(), self.len()) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    let len = self.len();
    unsafe { slice::from_raw_parts_mut(self.as_mut_ptr(), len) }
  }
}

/// Default reservation of a [`MemoryArena`].
pub const DEFAULT_CAPACITY: usize = 20 * (1 << 20);

const ARENA_ALIGN: usize = 16;

/// An arena carved from one up-front reservation.
///
/// The whole capacity is reserved (zero-filled) on construction; `grow` only
/// moves the break and fails once the reservation is used up.
pub struct MemoryArena {
  base: *mut u8,
  capacity: usize,
  brk: usize,
}

impl MemoryArena {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  /// Reserves `capacity` bytes, rounded up to 8. Requests beyond what a heap
  /// can address are cut down to that limit.
  pub fn with_capacity(capacity: usize) -> Self {
    let capacity = Self::rounded_capacity(capacity);
    let layout = Self::layout(capacity);

    let base = unsafe { alloc::alloc_zeroed(layout) };
    if base.is_null() {
      alloc::handle_alloc_error(layout);
    }

    Self { base, capacity, brk: 0 }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  fn rounded_capacity(capacity: usize) -> usize {
    align!(capacity.min(MAX_BLOCK_SIZE)).max(ARENA_ALIGN)
  }

  fn layout(capacity: usize) -> alloc::Layout {
    match alloc::Layout::from_size_align(capacity, ARENA_ALIGN) {
      Ok(layout) => layout,
      Err(_) => panic!("arena capacity {capacity} overflows a layout"),
    }
  }
}

impl Default for MemoryArena {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for MemoryArena {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base, Self::layout(self.capacity)) };
  }
}

unsafe impl Arena for MemoryArena {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<usize> {
    let end = self.brk.checked_add(increment)?;
    if end > self.capacity {
      log::debug!("memory arena exhausted: {} + {} > {}", self.brk, increment, self.capacity);
      return None;
    }

    let old = self.brk;
    self.brk = end;
    Some(old)
  }

  fn len(&self) -> usize {
    self.brk
  }

  fn as_ptr(&self) -> *const u8 {
    self.base
  }

  fn as_mut_ptr(&mut self) -> *mut u8 {
    self.base
  }
}

/// An arena that grows the process data segment with `sbrk(2)`.
///
/// Growth fails if anything else moved the program break since the last
/// call, since the region would no longer be contiguous.
#[cfg(unix)]
pub struct SbrkArena {
  base: *mut u8,
  len: usize,
}

#[cfg(unix)]
impl SbrkArena {
  /// Anchors a new arena at the current program break, padded to 8 bytes.
  pub fn new() -> Option<Self> {
    use libc::{c_void, intptr_t, sbrk};

    let current = unsafe { sbrk(0) };
    if current == usize::MAX as *mut c_void {
      return None;
    }

    let pad = align!(current as usize) - current as usize;
    if pad > 0 && unsafe { sbrk(pad as intptr_t) } == usize::MAX as *mut c_void {
      return None;
    }

    Some(Self {
      base: (current as usize + pad) as *mut u8,
      len: 0,
    })
  }

  /// The current program break.
  pub fn program_break() -> *mut u8 {
    unsafe { libc::sbrk(0) as *mut u8 }
  }
}

#[cfg(unix)]
unsafe impl Arena for SbrkArena {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<usize> {
    use libc::{c_void, intptr_t, sbrk};

    let increment = intptr_t::try_from(increment).ok()?;
    let expected = unsafe { self.base.add(self.len) };

    let address = unsafe { sbrk(increment) };
    if address == usize::MAX as *mut c_void {
      log::debug!("sbrk({increment}) failed");
      return None;
    }

    if address as *mut u8 != expected {
      log::debug!("program break moved externally: expected {expected:?}, got {address:?}");
      unsafe { sbrk(-increment) };
      return None;
    }

    let old = self.len;
    self.len += increment as usize;
    Some(old)
  }

  fn len(&self) -> usize {
    self.len
  }

  fn as_ptr(&self) -> *const u8 {
    self.base
  }

  fn as_mut_ptr(&mut self) -> *mut u8 {
    self.base
  }
}

impl std::fmt::Debug for MemoryArena {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_struct("MemoryArena")
      .field("base", &self.base)
      .field("len", &self.brk)
      .field("capacity", &self.capacity)
      .finish()
  }
}
