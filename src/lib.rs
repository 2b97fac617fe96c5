//! # segalloc - A Segregated Free-List Allocator
//!
//! This crate provides a general-purpose **segregated-fit allocator** that
//! manages a single contiguous, grow-only arena. Blocks carry boundary tags,
//! free blocks are filed on size-class lists, and neighbours are coalesced
//! eagerly on every free.
//!
//! ## Overview
//!
//! ```text
//!   Segregated Free Lists:
//!
//!   class table (inside the arena)
//!   ┌──────┐
//!   │  24  │──► [24] ──► [24]
//!   │  32  │──► [32]
//!   │  ..  │
//!   │ 2^7  │──► [72] ──► [128] ──► [96]
//!   │  ..  │
//!   │ >2^20│──► [3 MiB]
//!   └──────┘
//!
//!   Allocation looks at the class of the request first, takes the first
//!   block that fits, and moves on to larger classes when the list is dry.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── arena      - Arena trait, MemoryArena, SbrkArena
//!   ├── block      - Boundary-tag codec (internal)
//!   ├── check      - Consistency checker, heap walks and stats
//!   ├── class      - Size classes and free-list index
//!   ├── config     - HeapConfig and FreePolicy
//!   ├── error      - HeapError and Violation
//!   └── heap       - Heap: allocate, free, resize
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::{Heap, HeapConfig, MemoryArena};
//!
//! let mut heap = Heap::new(MemoryArena::new(), HeapConfig::default()).unwrap();
//!
//! let ptr = heap.allocate(100).unwrap();
//! heap.payload_mut(ptr).unwrap()[..5].copy_from_slice(b"hello");
//!
//! let ptr = heap.resize(Some(ptr), 400).unwrap();
//! assert_eq!(&heap.payload(ptr).unwrap()[..5], b"hello");
//!
//! heap.free(ptr).unwrap();
//! assert!(heap.check());
//! ```
//!
//! ## How It Works
//!
//! Every block is framed by a 4-byte header and footer holding
//! `size | allocated`:
//!
//! ```text
//!   Allocated Block:
//!   ┌────────┬────────────────────────────────┬────────┐
//!   │ size|1 │         User Data              │ size|1 │
//!   └────────┴────────────────────────────────┴────────┘
//!            ▲
//!            └── BlockPtr handed to the caller (8-byte aligned)
//!
//!   Free Block:
//!   ┌────────┬──────────┬──────────┬──────────┬────────┐
//!   │ size|0 │   next   │  parent  │  unused  │ size|0 │
//!   └────────┴──────────┴──────────┴──────────┴────────┘
//! ```
//!
//! The footer lets a block find its left neighbour in O(1), so freeing can
//! merge with both neighbours without any side table:
//!
//! ```text
//!   before free(B):   [ A free ][ B alloc ][ C free ]
//!   after  free(B):   [          A+B+C free          ]
//! ```
//!
//! ## Features
//!
//! - **Segregated fits**: 5 exact small classes, power-of-two classes up to
//!   1 MiB, one catch-all
//! - **Immediate coalescing**: no two free blocks are ever adjacent
//! - **In-place resize**: shrinks split in place, growth absorbs a free
//!   successor before falling back to a move
//! - **Pluggable arenas**: a fixed reservation or the real program break
//! - **Consistency checker**: precise diagnostics for every invariant
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Heap` has no synchronization
//! - **Grow-only arena**: memory is never returned to the host
//! - **No tail growth**: resizing the last block does not extend the arena
//!   in place; it moves
//! - **4 GiB ceiling**: tags are 32 bits wide
//!
//! ## Safety
//!
//! Blocks are addressed by arena offsets and all tag and link accesses are
//! bounds checked. Raw pointers only appear at the [`Arena`] boundary and in
//! [`Heap::as_mut_ptr`].

pub mod align;
pub mod arena;
mod block;
mod check;
pub mod class;
pub mod config;
pub mod error;
mod heap;

pub use arena::{Arena, MemoryArena};
#[cfg(unix)]
pub use arena::SbrkArena;
pub use block::MIN_BLOCK_SIZE;
pub use check::{BlockInfo, Blocks, HeapStats};
pub use config::{FreePolicy, HeapConfig};
pub use error::{HeapError, InvalidReason, ParseFreePolicyError, Violation};
pub use heap::{BlockPtr, Heap};
