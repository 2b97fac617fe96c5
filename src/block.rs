//! Boundary-tag codec.
//!
//! Every block carries a 4-byte tag at both ends. The payload offset (`bp`) is
//! what callers hold; the header sits one tag before it:
//!
//! ```text
//!   allocated:  | hdr | payload ...                       | ftr |
//!   free:       | hdr | next (8) | parent (8) | unused... | ftr |
//!                     ^ bp
//! ```
//!
//! A tag packs `size | allocated`; sizes are multiples of 8 so the low three
//! bits are free for flags and only bit 0 is used.

/// Size of one boundary tag.
pub(crate) const WORD: usize = 4;

/// Header plus footer.
pub(crate) const DWORD: usize = 2 * WORD;

/// Size of a free-list link field.
pub(crate) const LINK: usize = 8;

/// Smallest block able to hold both tags and both free-list links.
pub const MIN_BLOCK_SIZE: usize = DWORD + 2 * LINK;

/// Largest size a tag can encode.
pub(crate) const MAX_BLOCK_SIZE: usize = (u32::MAX & !0x7) as usize;

const ALLOCATED_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// Decoded boundary tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tag {
  pub size: usize,
  pub allocated: bool,
}

impl Tag {
  pub const fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    Self { size, allocated }
  }

  pub const fn encode(self) -> u32 {
    debug_assert!(self.size <= MAX_BLOCK_SIZE);
    (self.size as u32 & SIZE_MASK) | if self.allocated { ALLOCATED_BIT } else { 0 }
  }

  pub const fn decode(word: u32) -> Self {
    Self {
      size: (word & SIZE_MASK) as usize,
      allocated: word & ALLOCATED_BIT != 0,
    }
  }
}

/// A block seen through its tag. Link fields are only readable on the
/// `Free` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Block {
  Allocated { size: usize },
  Free { size: usize, next: Option<usize>, parent: usize },
}

impl Block {
  pub fn view(
    mem: &[u8],
    bp: usize,
  ) -> Self {
    let tag = read_header(mem, bp);
    if tag.allocated {
      Self::Allocated { size: tag.size }
    } else {
      Self::Free {
        size: tag.size,
        next: next_link(mem, bp),
        parent: parent_link(mem, bp),
      }
    }
  }
}

#[inline]
pub(crate) const fn header_offset(bp: usize) -> usize {
  bp - WORD
}

#[inline]
pub(crate) const fn footer_offset(
  bp: usize,
  size: usize,
) -> usize {
  bp + size - DWORD
}

#[inline]
pub(crate) fn read_word(
  mem: &[u8],
  offset: usize,
) -> u32 {
  let mut raw = [0u8; WORD];
  raw.copy_from_slice(&mem[offset..offset + WORD]);
  u32::from_ne_bytes(raw)
}

#[inline]
pub(crate) fn write_word(
  mem: &mut [u8],
  offset: usize,
  word: u32,
) {
  mem[offset..offset + WORD].copy_from_slice(&word.to_ne_bytes());
}

#[inline]
pub(crate) fn read_tag(
  mem: &[u8],
  offset: usize,
) -> Tag {
  Tag::decode(read_word(mem, offset))
}

#[inline]
pub(crate) fn read_header(
  mem: &[u8],
  bp: usize,
) -> Tag {
  read_tag(mem, header_offset(bp))
}

/// Writes identical header and footer tags for the block at `bp`.
pub(crate) fn write_tags(
  mem: &mut [u8],
  bp: usize,
  tag: Tag,
) {
  let word = tag.encode();
  write_word(mem, header_offset(bp), word);
  write_word(mem, footer_offset(bp, tag.size), word);
}

#[inline]
pub(crate) fn next_block(
  mem: &[u8],
  bp: usize,
) -> usize {
  bp + read_header(mem, bp).size
}

/// Payload offset of the block before `bp`, found through its footer.
/// `None` when the footer names a block starting before the arena.
#[inline]
pub(crate) fn prev_block(
  mem: &[u8],
  bp: usize,
) -> Option<usize> {
  let footer = bp.checked_sub(DWORD)?;
  bp.checked_sub(read_tag(mem, footer).size).filter(|&prev| prev >= WORD)
}

#[inline]
pub(crate) fn read_link(
  mem: &[u8],
  offset: usize,
) -> usize {
  let mut raw = [0u8; LINK];
  raw.copy_from_slice(&mem[offset..offset + LINK]);
  u64::from_ne_bytes(raw) as usize
}

#[inline]
pub(crate) fn write_link(
  mem: &mut [u8],
  offset: usize,
  value: usize,
) {
  mem[offset..offset + LINK].copy_from_slice(&(value as u64).to_ne_bytes());
}

/// Next free block in the same class, `None` at the end of the list.
#[inline]
pub(crate) fn next_link(
  mem: &[u8],
  bp: usize,
) -> Option<usize> {
  match read_link(mem, bp) {
    0 => None,
    next => Some(next),
  }
}

/// Offset of the word holding the forward link to `bp`: either a class slot
/// or the `next` field of the preceding free block.
#[inline]
pub(crate) fn parent_link(
  mem: &[u8],
  bp: usize,
) -> usize {
  read_link(mem, bp + LINK)
}

#[inline]
pub(crate) fn set_next_link(
  mem: &mut [u8],
  bp: usize,
  next: Option<usize>,
) {
  write_link(mem, bp, next.unwrap_or(0));
}

#[inline]
pub(crate) fn set_parent_link(
  mem: &mut [u8],
  bp: usize,
  parent: usize,
) {
  write_link(mem, bp + LINK, parent);
}
