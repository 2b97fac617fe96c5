//! Heap configuration.

use std::env;
use std::str::FromStr;

use crate::{align, block::MAX_BLOCK_SIZE, error::ParseFreePolicyError};

/// Default arena growth, in bytes, when no free block fits.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 6;

/// What `free` does with a pointer it does not recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreePolicy {
  /// Ignore the call and report success.
  #[default]
  Permissive,
  /// Leave the heap untouched and return the error.
  Strict,
}

impl FromStr for FreePolicy {
  type Err = ParseFreePolicyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "strict" => Ok(Self::Strict),
      "permissive" => Ok(Self::Permissive),
      _ => Err(ParseFreePolicyError { value: s.to_owned() }),
    }
  }
}

/// Configuration for a [`Heap`](crate::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  /// Minimum number of bytes requested from the arena on each extension.
  chunk_size: usize,
  /// Handling of invalid pointers passed to `free`.
  free_policy: FreePolicy,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      chunk_size: DEFAULT_CHUNK_SIZE,
      free_policy: FreePolicy::default(),
    }
  }
}

impl HeapConfig {
  /// Create configuration from environment variables.
  ///
  /// Environment variables:
  /// - `SEGALLOC_CHUNK_SIZE`: arena growth step in bytes
  /// - `SEGALLOC_FREE_POLICY`: "permissive" or "strict"
  pub fn from_env() -> Self {
    let mut config = Self::default();

    if let Ok(chunk) = env::var("SEGALLOC_CHUNK_SIZE") {
      match chunk.trim().parse() {
        Ok(chunk) => config = config.with_chunk_size(chunk),
        Err(err) => log::warn!("ignoring SEGALLOC_CHUNK_SIZE={chunk:?}: {err}"),
      }
    }

    if let Ok(policy) = env::var("SEGALLOC_FREE_POLICY") {
      match policy.parse() {
        Ok(policy) => config = config.with_free_policy(policy),
        Err(err) => log::warn!("ignoring SEGALLOC_FREE_POLICY: {err}"),
      }
    }

    config
  }

  /// Set the arena growth step. Rounded up to 8 bytes and kept between the
  /// minimum and the largest encodable block size.
  pub fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = align!(chunk_size.clamp(crate::MIN_BLOCK_SIZE, MAX_BLOCK_SIZE));
    self
  }

  pub fn with_free_policy(
    mut self,
    free_policy: FreePolicy,
  ) -> Self {
    self.free_policy = free_policy;
    self
  }

  /// Shorthand for `with_free_policy(FreePolicy::Strict)`.
  pub fn strict(self) -> Self {
    self.with_free_policy(FreePolicy::Strict)
  }

  pub fn chunk_size(&self) -> usize {
    self.chunk_size
  }

  pub fn free_policy(&self) -> FreePolicy {
    self.free_policy
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = HeapConfig::default();
    assert_eq!(config.chunk_size(), 64);
    assert_eq!(config.free_policy(), FreePolicy::Permissive);
  }

  #[test]
  fn test_chunk_size_is_normalised() {
    assert_eq!(HeapConfig::default().with_chunk_size(0).chunk_size(), 24);
    assert_eq!(HeapConfig::default().with_chunk_size(100).chunk_size(), 104);
    assert_eq!(HeapConfig::default().with_chunk_size(4096).chunk_size(), 4096);
  }

  #[test]
  fn test_huge_chunk_size_is_clamped() {
    let config = HeapConfig::default().with_chunk_size(usize::MAX);
    assert_eq!(config.chunk_size(), MAX_BLOCK_SIZE);
    assert_eq!(config.chunk_size() % 8, 0);

    let config = HeapConfig::default().with_chunk_size(MAX_BLOCK_SIZE + 1);
    assert_eq!(config.chunk_size(), MAX_BLOCK_SIZE);
  }

  #[test]
  fn test_free_policy_parsing() {
    assert_eq!("strict".parse::<FreePolicy>(), Ok(FreePolicy::Strict));
    assert_eq!(" Strict ".parse::<FreePolicy>(), Ok(FreePolicy::Strict));
    assert_eq!("permissive".parse::<FreePolicy>(), Ok(FreePolicy::Permissive));
    assert_eq!(
      "strcit".parse::<FreePolicy>(),
      Err(ParseFreePolicyError { value: "strcit".to_owned() })
    );
    assert!("".parse::<FreePolicy>().is_err());
  }
}
