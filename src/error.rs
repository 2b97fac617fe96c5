use thiserror::Error;

/// Errors reported by [`Heap`](crate::Heap) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
  #[error("zero-sized request")]
  ZeroSize,
  #[error("request of {requested} bytes exceeds the largest encodable block")]
  SizeOverflow { requested: usize },
  #[error("arena cannot grow by {requested} bytes")]
  ArenaExhausted { requested: usize },
  #[error("arena already holds {len} bytes; a heap needs an empty arena")]
  ArenaInUse { len: usize },
  #[error("invalid block pointer {offset:#x}: {reason}")]
  InvalidPointer { offset: usize, reason: InvalidReason },
}

/// Why a pointer handed to `free`, `resize` or a payload accessor was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidReason {
  #[error("outside the arena")]
  OutOfBounds,
  #[error("not 8-byte aligned")]
  Misaligned,
  #[error("block is not allocated")]
  NotAllocated,
  #[error("corrupt boundary tags")]
  CorruptTags,
  #[error("neighbouring blocks do not line up with it")]
  BrokenChain,
}

/// An unrecognised [`FreePolicy`](crate::FreePolicy) name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown free policy {value:?}, expected \"permissive\" or \"strict\"")]
pub struct ParseFreePolicyError {
  pub value: String,
}

/// A broken heap invariant found by the consistency checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("block {offset:#x} has size {size}, below the minimum of {min}")]
  BlockTooSmall { offset: usize, size: usize, min: usize },
  #[error("block {offset:#x} header {header:#x} has reserved bits set")]
  ReservedBits { offset: usize, header: u32 },
  #[error("block {offset:#x} header {header:#x} differs from footer {footer:#x}")]
  TagMismatch { offset: usize, header: u32, footer: u32 },
  #[error("block {offset:#x} of size {size} runs past the epilogue at {end:#x}")]
  PastEpilogue { offset: usize, size: usize, end: usize },
  #[error("free blocks {offset:#x} and {next:#x} are adjacent")]
  AdjacentFree { offset: usize, next: usize },
  #[error("class {class} lists allocated block {offset:#x} of size {size}")]
  AllocatedInFreeList { class: usize, offset: usize, size: usize },
  #[error("class {class} lists block {offset:#x} of size {size} outside its range")]
  Misclassified { class: usize, offset: usize, size: usize },
  #[error("class {class} block {offset:#x} has parent {actual:#x}, expected {expected:#x}")]
  BrokenParent { class: usize, offset: usize, expected: usize, actual: usize },
  #[error("class {class} lists {offset:#x}, which is not a block in the arena")]
  StrayLink { class: usize, offset: usize },
  #[error("class {class} list does not terminate")]
  Cycle { class: usize },
  #[error("{in_arena} free blocks in the arena but {in_lists} on the free lists")]
  FreeCountMismatch { in_arena: usize, in_lists: usize },
}
